use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::batch::{BatchReport, BatchRunner};
use crate::config::Config;
use crate::enrichment::Waterfall;
use crate::errors::AppError;
use crate::models::{Contact, ContactRequest, EnrichmentOutcome};

/// Largest batch accepted by `POST /api/v1/enrich/batch`.
pub const MAX_BATCH_SIZE: usize = 500;

/// Application state shared across all request handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Single-contact waterfall backed by the provider registry.
    pub waterfall: Arc<Waterfall>,
    /// Batch runner sharing the same waterfall (and so the same per-provider pacing).
    pub batch: BatchRunner,
}

impl AppState {
    pub fn new(config: Config, waterfall: Arc<Waterfall>) -> Self {
        let batch = BatchRunner::new(waterfall.clone(), config.contact_delay, config.concurrency);
        Self {
            config,
            waterfall,
            batch,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub contacts: Vec<ContactRequest>,
}

fn validate(request: ContactRequest, position: Option<usize>) -> Result<Contact, AppError> {
    let at = position
        .map(|i| format!("contacts[{}]: ", i))
        .unwrap_or_default();
    if request.full_name.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{}full_name is required", at)));
    }
    if request.domain.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{}domain is required", at)));
    }
    Ok(request.into_contact())
}

/// Limits a client needs to size its requests and expect latency.
fn limits(config: &Config) -> serde_json::Value {
    json!({
        "max_batch_size": MAX_BATCH_SIZE,
        "concurrency": config.concurrency,
        "contact_delay_ms": config.contact_delay.as_millis() as u64,
        "request_timeout_secs": config.request_timeout.as_secs(),
    })
}

/// Health check endpoint.
///
/// Lists the finders in cascade order so a misconfigured deployment is
/// visible without reading logs.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let registry = state.waterfall.registry();
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "email-waterfall",
            "version": env!("CARGO_PKG_VERSION"),
            "finders": registry.finder_ids(),
            "validator": registry.validator_id(),
            "risk_validator": registry.risk_validator_id(),
            "deliverability": registry.deliverability_id(),
            "esp_resolver": registry.esp_resolver_id(),
            "limits": limits(&state.config),
        })),
    )
}

/// POST /api/v1/enrich
///
/// Runs the waterfall for one contact and returns its outcome. A contact
/// that ends FAILED is still a 200; only malformed input is rejected.
pub async fn enrich_contact(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContactRequest>,
) -> Result<Json<EnrichmentOutcome>, AppError> {
    let contact = validate(request, None)?;
    tracing::info!("POST /enrich - {} @ {}", contact.full_name, contact.domain);

    let outcome = state.waterfall.enrich(&contact).await;
    Ok(Json(outcome))
}

/// POST /api/v1/enrich/batch
///
/// Enriches up to [`MAX_BATCH_SIZE`] contacts; outcomes keep request order.
pub async fn enrich_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchReport>, AppError> {
    if request.contacts.len() > MAX_BATCH_SIZE {
        return Err(AppError::BadRequest(format!(
            "batch of {} contacts exceeds the limit of {}",
            request.contacts.len(),
            MAX_BATCH_SIZE
        )));
    }

    let contacts = request
        .contacts
        .into_iter()
        .enumerate()
        .map(|(i, c)| validate(c, Some(i)))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!("POST /enrich/batch - {} contact(s)", contacts.len());
    let report = state.batch.run(contacts).await;
    Ok(Json(report))
}
