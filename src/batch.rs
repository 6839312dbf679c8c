//! Batch runner: enriches many contacts, preserving input order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::enrichment::Waterfall;
use crate::models::{Contact, EnrichmentOutcome, FailureReason};
use crate::pacing::PacingController;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub enriched: usize,
    pub failed: usize,
    pub success_rate: f64,
    /// Confirmed emails per source (`original` or a finder id).
    pub by_source: BTreeMap<String, usize>,
    pub failure_reasons: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[EnrichmentOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Default::default()
        };

        for outcome in outcomes {
            if outcome.is_enriched() {
                summary.enriched += 1;
                let source = outcome
                    .email_source
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                *summary.by_source.entry(source).or_insert(0) += 1;
            } else {
                summary.failed += 1;
                let reason = outcome
                    .failure
                    .as_ref()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                *summary.failure_reasons.entry(reason).or_insert(0) += 1;
            }
        }

        summary.success_rate = if summary.total == 0 {
            0.0
        } else {
            summary.enriched as f64 / summary.total as f64
        };
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: BatchSummary,
    /// One outcome per input contact, in input order.
    pub outcomes: Vec<EnrichmentOutcome>,
}

pub struct BatchRunner {
    waterfall: Arc<Waterfall>,
    pacer: Arc<PacingController>,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(waterfall: Arc<Waterfall>, contact_delay: Duration, concurrency: usize) -> Self {
        Self {
            waterfall,
            pacer: Arc::new(PacingController::new("batch", contact_delay, Duration::ZERO)),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, contacts: Vec<Contact>) -> BatchReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            "Batch {} started: {} contact(s), concurrency {}",
            run_id,
            contacts.len(),
            self.concurrency
        );

        let outcomes = if self.concurrency == 1 {
            self.run_sequential(&contacts).await
        } else {
            self.run_pooled(contacts).await
        };

        let summary = BatchSummary::from_outcomes(&outcomes);
        let finished_at = Utc::now();
        tracing::info!(
            "Batch {} finished: {}/{} enriched ({:.1}%) in {}s",
            run_id,
            summary.enriched,
            summary.total,
            summary.success_rate * 100.0,
            (finished_at - started_at).num_seconds()
        );

        BatchReport {
            run_id,
            started_at,
            finished_at,
            summary,
            outcomes,
        }
    }

    async fn run_sequential(&self, contacts: &[Contact]) -> Vec<EnrichmentOutcome> {
        let mut outcomes = Vec::with_capacity(contacts.len());
        for (idx, contact) in contacts.iter().enumerate() {
            self.pacer.wait_turn().await;
            tracing::debug!("[{}/{}] {}", idx + 1, contacts.len(), contact.full_name);
            outcomes.push(self.waterfall.enrich(contact).await);
        }
        outcomes
    }

    /// Bounded worker pool. Handles are awaited in spawn order, so outcomes
    /// come back in input order whatever order the workers finish in.
    async fn run_pooled(&self, contacts: Vec<Contact>) -> Vec<EnrichmentOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(contacts.len());

        for contact in contacts {
            let semaphore = semaphore.clone();
            let pacer = self.pacer.clone();
            let waterfall = self.waterfall.clone();
            let fallback = EnrichmentOutcome::for_contact(&contact);

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                pacer.wait_turn().await;
                waterfall.enrich(&contact).await
            });
            handles.push((handle, fallback));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, mut fallback) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!("Worker for {} died: {}", fallback.full_name, e);
                    fallback.failure = Some(FailureReason::Internal(e.to_string()));
                    outcomes.push(fallback);
                }
            }
        }
        outcomes
    }
}
