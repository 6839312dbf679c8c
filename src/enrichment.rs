//! Waterfall orchestration for a single contact.
//!
//! Drives the state machine in [`crate::waterfall`]:
//! 1. Dispatch the provider call that belongs to the current stage
//! 2. Feed the verdict back into `advance`
//! 3. Apply the emitted patches to the outcome
//! 4. Repeat until DONE or FAILED

use std::sync::Arc;

use crate::config::OriginalFallback;
use crate::models::{Contact, EnrichmentOutcome, ProviderVerdict};
use crate::registry::ProviderRegistry;
use crate::waterfall::{self, Stage, TransitionContext};

pub struct Waterfall {
    registry: Arc<ProviderRegistry>,
    ctx: TransitionContext,
}

impl Waterfall {
    pub fn new(registry: Arc<ProviderRegistry>, original_fallback: OriginalFallback) -> Self {
        let ctx = TransitionContext {
            finders: registry.finder_ids(),
            original_fallback,
        };
        Self { registry, ctx }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Runs the full waterfall for `contact`. Never fails: provider problems
    /// end up as a FAILED outcome with a reason.
    pub async fn enrich(&self, contact: &Contact) -> EnrichmentOutcome {
        let mut outcome = EnrichmentOutcome::for_contact(contact);

        tracing::info!("Processing: {} @ {}", contact.full_name, contact.domain);

        let first = waterfall::start(contact, &self.ctx);
        outcome.apply_all(first.patches);
        let mut stage = first.next;

        while !stage.is_terminal() {
            let verdict = self.dispatch(&stage, contact).await;
            if let ProviderVerdict::Failure(failure) = &verdict {
                tracing::warn!(
                    kind = failure.kind(),
                    "{}: provider contributed nothing ({})",
                    stage.name(),
                    failure
                );
            }

            let transition = waterfall::advance(stage, verdict, &self.ctx);
            outcome.apply_all(transition.patches);
            stage = transition.next;
        }

        match &stage {
            Stage::Failed(reason) => {
                tracing::info!("No valid email for {}: {}", contact.full_name, reason)
            }
            _ => tracing::info!(
                "Valid email for {} (source: {}, esp: {})",
                contact.full_name,
                outcome
                    .email_source
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                outcome.esp_host.as_deref().unwrap_or("unknown")
            ),
        }

        outcome
    }

    async fn dispatch(&self, stage: &Stage, contact: &Contact) -> ProviderVerdict {
        match stage {
            Stage::ValidateOriginal { email } | Stage::ValidateFound { email } => {
                self.registry.check_quality(email).await
            }
            Stage::FindEmail { next_finder, .. } => match self.ctx.finders.get(*next_finder) {
                Some(finder) => {
                    self.registry
                        .find_email(*finder, &contact.full_name, &contact.domain)
                        .await
                }
                None => ProviderVerdict::no_match(),
            },
            Stage::RiskCheck { email } => self.registry.check_validity(email).await,
            Stage::SecondaryValidation { email } => {
                self.registry.check_deliverability(email).await
            }
            Stage::ResolveEsp { email } => self.registry.resolve_host(email).await,
            Stage::Done | Stage::Failed(_) => ProviderVerdict::no_match(),
        }
    }
}
