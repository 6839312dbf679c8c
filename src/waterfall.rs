//! Per-contact waterfall state machine.
//!
//! Pure: [`start`] picks the first stage for a contact and [`advance`] maps
//! `(stage, verdict)` to the next stage plus the outcome fields to record.
//! No I/O happens here; [`crate::enrichment::Waterfall`] performs the calls.
//!
//! ```text
//! START ─► VALIDATE_ORIGINAL ─good──────────────────────────────► RESOLVE_ESP ─► DONE
//!   │            │ bad / inconclusive                                 ▲
//!   └────────────┴─► FIND_EMAIL ─hit─► VALIDATE_FOUND ─good───────────┤
//!                       │ exhausted        │ risky                    │
//!                       ▼                  ▼                          │
//!                    FAILED ◄──────── RISK_CHECK ─valid───────────────┤
//!                       ▲                  │ invalid / unknown        │
//!                       └──────── SECONDARY_VALIDATION ─deliverable───┘
//! ```

use crate::config::OriginalFallback;
use crate::models::{
    Contact, Deliverability, EmailSource, FailureReason, OutcomePatch, ProviderId,
    ProviderVerdict, Quality,
};

/// Original email kept as a last-resort candidate under [`OriginalFallback::Retain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub email: String,
    /// Quality reported for it, if the validator answered at all.
    pub quality: Option<Quality>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    ValidateOriginal { email: String },
    /// `next_finder` indexes [`TransitionContext::finders`].
    FindEmail {
        next_finder: usize,
        fallback: Option<Fallback>,
    },
    ValidateFound { email: String },
    RiskCheck { email: String },
    SecondaryValidation { email: String },
    ResolveEsp { email: String },
    Done,
    Failed(FailureReason),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::ValidateOriginal { .. } => "validate_original",
            Stage::FindEmail { .. } => "find_email",
            Stage::ValidateFound { .. } => "validate_found",
            Stage::RiskCheck { .. } => "risk_check",
            Stage::SecondaryValidation { .. } => "secondary_validation",
            Stage::ResolveEsp { .. } => "resolve_esp",
            Stage::Done => "done",
            Stage::Failed(_) => "failed",
        }
    }
}

/// What the machine needs to know about the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionContext {
    pub finders: Vec<ProviderId>,
    pub original_fallback: OriginalFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: Stage,
    pub patches: Vec<OutcomePatch>,
}

impl Transition {
    fn to(next: Stage) -> Self {
        Self {
            next,
            patches: Vec::new(),
        }
    }

    fn with(next: Stage, patches: Vec<OutcomePatch>) -> Self {
        Self { next, patches }
    }

    fn fail(reason: FailureReason, mut patches: Vec<OutcomePatch>) -> Self {
        patches.push(OutcomePatch::Failed(reason.clone()));
        Self {
            next: Stage::Failed(reason),
            patches,
        }
    }
}

pub fn start(contact: &Contact, ctx: &TransitionContext) -> Transition {
    match &contact.existing_email {
        Some(email) => Transition::to(Stage::ValidateOriginal {
            email: email.clone(),
        }),
        None => enter_find(0, None, ctx),
    }
}

/// Applies the verdict of the call made for `stage`.
///
/// Terminal stages ignore the verdict and stay where they are.
pub fn advance(stage: Stage, verdict: ProviderVerdict, ctx: &TransitionContext) -> Transition {
    match stage {
        Stage::ValidateOriginal { email } => validate_original(email, verdict, ctx),
        Stage::FindEmail {
            next_finder,
            fallback,
        } => match verdict {
            ProviderVerdict::Email(found) if !found.is_empty() => {
                let mut patches = vec![OutcomePatch::FoundEmail(found.clone())];
                if let Some(id) = ctx.finders.get(next_finder) {
                    patches.push(OutcomePatch::Source(EmailSource::Provider(*id)));
                }
                Transition::with(Stage::ValidateFound { email: found }, patches)
            }
            _ => enter_find(next_finder + 1, fallback, ctx),
        },
        Stage::ValidateFound { email } => match verdict {
            ProviderVerdict::Quality(Quality::Good) => confirm(
                &email,
                vec![OutcomePatch::Quality(Quality::Good)],
            ),
            ProviderVerdict::Quality(Quality::Risky) => Transition::with(
                Stage::RiskCheck { email },
                vec![OutcomePatch::Quality(Quality::Risky)],
            ),
            ProviderVerdict::Quality(quality) => Transition::fail(
                FailureReason::FoundEmailFailedValidation,
                vec![OutcomePatch::Quality(quality)],
            ),
            _ => Transition::fail(FailureReason::FoundEmailFailedValidation, Vec::new()),
        },
        Stage::RiskCheck { email } => match verdict {
            ProviderVerdict::Validity(validity) if validity.is_confirmed() => {
                confirm(&email, vec![OutcomePatch::Validity(validity)])
            }
            ProviderVerdict::Validity(validity) => Transition::with(
                Stage::SecondaryValidation { email },
                vec![OutcomePatch::Validity(validity)],
            ),
            _ => Transition::to(Stage::SecondaryValidation { email }),
        },
        Stage::SecondaryValidation { email } => match verdict {
            ProviderVerdict::Deliverability(Deliverability::Deliverable) => confirm(
                &email,
                vec![OutcomePatch::Deliverability(Deliverability::Deliverable)],
            ),
            ProviderVerdict::Deliverability(other) => Transition::fail(
                FailureReason::RiskyEmailUnresolved,
                vec![OutcomePatch::Deliverability(other)],
            ),
            _ => Transition::fail(FailureReason::RiskyEmailUnresolved, Vec::new()),
        },
        Stage::ResolveEsp { .. } => match verdict {
            ProviderVerdict::Host(host) if !host.is_empty() => {
                Transition::with(Stage::Done, vec![OutcomePatch::EspHost(host)])
            }
            _ => Transition::to(Stage::Done),
        },
        terminal @ (Stage::Done | Stage::Failed(_)) => Transition::to(terminal),
    }
}

fn validate_original(email: String, verdict: ProviderVerdict, ctx: &TransitionContext) -> Transition {
    let quality = match verdict {
        ProviderVerdict::Quality(quality) => Some(quality),
        _ => None,
    };

    if quality == Some(Quality::Good) {
        return confirm(
            &email,
            vec![
                OutcomePatch::OriginalQuality(Quality::Good),
                OutcomePatch::Source(EmailSource::Original),
                OutcomePatch::Quality(Quality::Good),
            ],
        );
    }

    let fallback = match (quality, ctx.original_fallback) {
        (Some(Quality::Bad), _) | (_, OriginalFallback::Discard) => None,
        (_, OriginalFallback::Retain) => Some(Fallback { email, quality }),
    };

    let mut transition = enter_find(0, fallback, ctx);
    if let Some(quality) = quality {
        transition
            .patches
            .insert(0, OutcomePatch::OriginalQuality(quality));
    }
    transition
}

fn enter_find(next_finder: usize, fallback: Option<Fallback>, ctx: &TransitionContext) -> Transition {
    if next_finder < ctx.finders.len() {
        return Transition::to(Stage::FindEmail {
            next_finder,
            fallback,
        });
    }

    match fallback {
        None => Transition::fail(FailureReason::NoEmailFound, Vec::new()),
        Some(Fallback {
            email,
            quality: Some(Quality::Risky),
        }) => Transition::with(
            Stage::RiskCheck { email },
            vec![
                OutcomePatch::Source(EmailSource::Original),
                OutcomePatch::Quality(Quality::Risky),
            ],
        ),
        Some(Fallback { email, .. }) => Transition::with(
            Stage::ValidateFound { email },
            vec![OutcomePatch::Source(EmailSource::Original)],
        ),
    }
}

fn confirm(email: &str, mut patches: Vec<OutcomePatch>) -> Transition {
    let confirmed = email.to_lowercase();
    patches.push(OutcomePatch::Confirmed(confirmed.clone()));
    Transition::with(Stage::ResolveEsp { email: confirmed }, patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderFailure;
    use crate::models::Validity;

    fn ctx(fallback: OriginalFallback) -> TransitionContext {
        TransitionContext {
            finders: vec![ProviderId::TryKit, ProviderId::LeadMagic],
            original_fallback: fallback,
        }
    }

    fn failure() -> ProviderVerdict {
        ProviderVerdict::Failure(ProviderFailure::Transport("timeout".into()))
    }

    #[test]
    fn test_start_with_and_without_email() {
        let ctx = ctx(OriginalFallback::Discard);
        let with = Contact::new("Jane Doe", "acme.com", "Acme").with_email("Jane@Acme.com");
        assert_eq!(
            start(&with, &ctx).next,
            Stage::ValidateOriginal {
                email: "Jane@Acme.com".into()
            }
        );

        let without = Contact::new("Jane Doe", "acme.com", "Acme");
        assert_eq!(
            start(&without, &ctx).next,
            Stage::FindEmail {
                next_finder: 0,
                fallback: None
            }
        );
    }

    #[test]
    fn test_good_original_is_confirmed_lowercased() {
        let t = advance(
            Stage::ValidateOriginal {
                email: "Jane@Acme.com".into(),
            },
            ProviderVerdict::Quality(Quality::Good),
            &ctx(OriginalFallback::Discard),
        );
        assert_eq!(
            t.next,
            Stage::ResolveEsp {
                email: "jane@acme.com".into()
            }
        );
        assert!(t.patches.contains(&OutcomePatch::Source(EmailSource::Original)));
        assert!(t.patches.contains(&OutcomePatch::Confirmed("jane@acme.com".into())));
    }

    #[test]
    fn test_bad_original_is_never_retained() {
        let t = advance(
            Stage::ValidateOriginal {
                email: "jane@acme.com".into(),
            },
            ProviderVerdict::Quality(Quality::Bad),
            &ctx(OriginalFallback::Retain),
        );
        assert_eq!(
            t.next,
            Stage::FindEmail {
                next_finder: 0,
                fallback: None
            }
        );
        assert_eq!(t.patches, vec![OutcomePatch::OriginalQuality(Quality::Bad)]);
    }

    #[test]
    fn test_inconclusive_original_retained_only_when_configured() {
        let stage = Stage::ValidateOriginal {
            email: "jane@acme.com".into(),
        };

        let discard = advance(stage.clone(), failure(), &ctx(OriginalFallback::Discard));
        assert_eq!(
            discard.next,
            Stage::FindEmail {
                next_finder: 0,
                fallback: None
            }
        );
        assert!(discard.patches.is_empty());

        let retain = advance(
            stage,
            ProviderVerdict::Quality(Quality::Risky),
            &ctx(OriginalFallback::Retain),
        );
        assert_eq!(
            retain.next,
            Stage::FindEmail {
                next_finder: 0,
                fallback: Some(Fallback {
                    email: "jane@acme.com".into(),
                    quality: Some(Quality::Risky)
                })
            }
        );
    }

    #[test]
    fn test_finder_cascade_records_source() {
        let ctx = ctx(OriginalFallback::Discard);
        let stage = Stage::FindEmail {
            next_finder: 0,
            fallback: None,
        };

        let miss = advance(stage, ProviderVerdict::no_match(), &ctx);
        assert_eq!(
            miss.next,
            Stage::FindEmail {
                next_finder: 1,
                fallback: None
            }
        );

        let hit = advance(miss.next, ProviderVerdict::Email("j@acme.com".into()), &ctx);
        assert_eq!(
            hit.next,
            Stage::ValidateFound {
                email: "j@acme.com".into()
            }
        );
        assert_eq!(
            hit.patches,
            vec![
                OutcomePatch::FoundEmail("j@acme.com".into()),
                OutcomePatch::Source(EmailSource::Provider(ProviderId::LeadMagic)),
            ]
        );
    }

    #[test]
    fn test_exhausted_finders_fail_or_fall_back() {
        let last = Stage::FindEmail {
            next_finder: 1,
            fallback: None,
        };
        let t = advance(last, failure(), &ctx(OriginalFallback::Discard));
        assert_eq!(t.next, Stage::Failed(FailureReason::NoEmailFound));

        let risky = Stage::FindEmail {
            next_finder: 1,
            fallback: Some(Fallback {
                email: "jane@acme.com".into(),
                quality: Some(Quality::Risky),
            }),
        };
        let t = advance(risky, ProviderVerdict::no_match(), &ctx(OriginalFallback::Retain));
        assert_eq!(
            t.next,
            Stage::RiskCheck {
                email: "jane@acme.com".into()
            }
        );

        let unknown = Stage::FindEmail {
            next_finder: 1,
            fallback: Some(Fallback {
                email: "jane@acme.com".into(),
                quality: None,
            }),
        };
        let t = advance(unknown, ProviderVerdict::no_match(), &ctx(OriginalFallback::Retain));
        assert_eq!(
            t.next,
            Stage::ValidateFound {
                email: "jane@acme.com".into()
            }
        );
        assert_eq!(t.patches, vec![OutcomePatch::Source(EmailSource::Original)]);
    }

    #[test]
    fn test_no_finders_fails_immediately() {
        let ctx = TransitionContext {
            finders: Vec::new(),
            original_fallback: OriginalFallback::Discard,
        };
        let t = start(&Contact::new("Jane Doe", "acme.com", ""), &ctx);
        assert_eq!(t.next, Stage::Failed(FailureReason::NoEmailFound));
        assert_eq!(t.patches, vec![OutcomePatch::Failed(FailureReason::NoEmailFound)]);
    }

    #[test]
    fn test_found_email_validation() {
        let ctx = ctx(OriginalFallback::Discard);
        let stage = || Stage::ValidateFound {
            email: "J@Acme.com".into(),
        };

        let good = advance(stage(), ProviderVerdict::Quality(Quality::Good), &ctx);
        assert_eq!(
            good.next,
            Stage::ResolveEsp {
                email: "j@acme.com".into()
            }
        );

        let risky = advance(stage(), ProviderVerdict::Quality(Quality::Risky), &ctx);
        assert_eq!(
            risky.next,
            Stage::RiskCheck {
                email: "J@Acme.com".into()
            }
        );

        for verdict in [
            ProviderVerdict::Quality(Quality::Bad),
            ProviderVerdict::Quality(Quality::Unknown),
            failure(),
        ] {
            let t = advance(stage(), verdict, &ctx);
            assert_eq!(
                t.next,
                Stage::Failed(FailureReason::FoundEmailFailedValidation)
            );
        }
    }

    #[test]
    fn test_risk_resolution() {
        let ctx = ctx(OriginalFallback::Discard);
        let risk = || Stage::RiskCheck {
            email: "j@acme.com".into(),
        };

        let confirmed = advance(risk(), ProviderVerdict::Validity(Validity::ValidRisky), &ctx);
        assert_eq!(
            confirmed.next,
            Stage::ResolveEsp {
                email: "j@acme.com".into()
            }
        );

        for verdict in [
            ProviderVerdict::Validity(Validity::Invalid),
            ProviderVerdict::Validity(Validity::Unknown),
            failure(),
        ] {
            assert_eq!(
                advance(risk(), verdict, &ctx).next,
                Stage::SecondaryValidation {
                    email: "j@acme.com".into()
                }
            );
        }

        let secondary = || Stage::SecondaryValidation {
            email: "j@acme.com".into(),
        };
        let deliverable = advance(
            secondary(),
            ProviderVerdict::Deliverability(Deliverability::Deliverable),
            &ctx,
        );
        assert!(deliverable
            .patches
            .contains(&OutcomePatch::Confirmed("j@acme.com".into())));

        let undeliverable = advance(
            secondary(),
            ProviderVerdict::Deliverability(Deliverability::Undeliverable),
            &ctx,
        );
        assert_eq!(
            undeliverable.next,
            Stage::Failed(FailureReason::RiskyEmailUnresolved)
        );

        let absent = advance(
            secondary(),
            ProviderVerdict::Failure(ProviderFailure::NoCandidate("none".into())),
            &ctx,
        );
        assert_eq!(absent.next, Stage::Failed(FailureReason::RiskyEmailUnresolved));
    }

    #[test]
    fn test_esp_failure_still_completes() {
        let ctx = ctx(OriginalFallback::Discard);
        let stage = || Stage::ResolveEsp {
            email: "j@acme.com".into(),
        };

        let found = advance(stage(), ProviderVerdict::Host("Google".into()), &ctx);
        assert_eq!(found.next, Stage::Done);
        assert_eq!(found.patches, vec![OutcomePatch::EspHost("Google".into())]);

        let failed = advance(stage(), failure(), &ctx);
        assert_eq!(failed.next, Stage::Done);
        assert!(failed.patches.is_empty());
    }

    #[test]
    fn test_terminal_stages_are_absorbing() {
        let ctx = ctx(OriginalFallback::Discard);
        assert_eq!(advance(Stage::Done, failure(), &ctx).next, Stage::Done);
        let failed = Stage::Failed(FailureReason::NoEmailFound);
        assert!(advance(failed.clone(), failure(), &ctx).next.is_terminal());
    }
}
