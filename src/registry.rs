//! Provider capabilities and the registry that groups them.
//!
//! The waterfall only talks to the registry. A capability with no enabled
//! provider answers `Failure(NoCandidate)` so callers never branch on which
//! credentials happen to be configured.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::credentials::CredentialSet;
use crate::errors::{AppError, ProviderFailure};
use crate::models::{ProviderId, ProviderVerdict};
use crate::pacing::PacingController;
use crate::provider_client::ProviderHttp;
use crate::services::{
    BounceBanService, EmailGuardService, IcypeasService, LeadMagicService,
    MillionVerifierService, TryKitService,
};

/// Discovers a work email from a person's name and company domain.
#[async_trait]
pub trait EmailFinder: Send + Sync {
    fn id(&self) -> ProviderId;
    /// `Email("")` means the provider had no match.
    async fn find_email(&self, full_name: &str, domain: &str) -> ProviderVerdict;
}

/// Primary quality check (`good` / `bad` / `risky` / `unknown`).
#[async_trait]
pub trait EmailValidator: Send + Sync {
    fn id(&self) -> ProviderId;
    async fn check_quality(&self, email: &str) -> ProviderVerdict;
}

/// Secondary validity check for risky addresses.
#[async_trait]
pub trait RiskValidator: Send + Sync {
    fn id(&self) -> ProviderId;
    async fn check_validity(&self, email: &str) -> ProviderVerdict;
}

/// Final deliverability check, the last word on a risky address.
#[async_trait]
pub trait DeliverabilityChecker: Send + Sync {
    fn id(&self) -> ProviderId;
    async fn check_deliverability(&self, email: &str) -> ProviderVerdict;
}

/// Resolves which mail host serves an address.
#[async_trait]
pub trait EspResolver: Send + Sync {
    fn id(&self) -> ProviderId;
    async fn resolve_host(&self, email: &str) -> ProviderVerdict;
}

fn unavailable(capability: &str) -> ProviderVerdict {
    ProviderVerdict::Failure(ProviderFailure::NoCandidate(format!(
        "no {} configured",
        capability
    )))
}

/// Enabled providers grouped by capability. Read-only once built.
pub struct ProviderRegistry {
    finders: Vec<Arc<dyn EmailFinder>>,
    validator: Arc<dyn EmailValidator>,
    risk_validator: Option<Arc<dyn RiskValidator>>,
    deliverability: Option<Arc<dyn DeliverabilityChecker>>,
    esp_resolver: Option<Arc<dyn EspResolver>>,
}

impl ProviderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Wires one client per credentialed provider.
    ///
    /// Each provider gets its own pacer and circuit breaker; TryKit shares
    /// both between its finder and risk-validator roles.
    pub fn from_credentials(
        credentials: &CredentialSet,
        config: &Config,
    ) -> Result<Self, AppError> {
        let http = |id: ProviderId| -> Result<ProviderHttp, AppError> {
            let pacer = Arc::new(PacingController::new(
                id.as_str(),
                config.inter_call_delay,
                config.rate_limit_cooldown,
            ));
            ProviderHttp::new(
                id,
                config.endpoints.base_url(id),
                config.request_timeout,
                pacer,
                config.circuit_breaker_threshold,
            )
        };

        for id in ProviderId::ALL {
            match credentials.fingerprint(id) {
                Some(tag) => tracing::info!("Provider {} enabled (key {})", id, tag),
                None => tracing::warn!("Provider {} disabled: {} not set", id, id.credential_key()),
            }
        }

        let trykit = match credentials.get(ProviderId::TryKit) {
            Some(key) => Some(Arc::new(TryKitService::new(http(ProviderId::TryKit)?, key))),
            None => None,
        };

        let mut builder = Self::builder();

        for id in &config.finder_order {
            let Some(key) = credentials.get(*id) else {
                continue;
            };
            builder = match id {
                ProviderId::TryKit => match &trykit {
                    Some(service) => builder.finder(service.clone()),
                    None => builder,
                },
                ProviderId::LeadMagic => {
                    builder.finder(Arc::new(LeadMagicService::new(http(*id)?, key)))
                }
                ProviderId::Icypeas => {
                    builder.finder(Arc::new(IcypeasService::new(http(*id)?, key)))
                }
                other => {
                    return Err(AppError::ConfigError(format!(
                        "{} cannot be used as an email finder",
                        other
                    )))
                }
            };
        }

        if let Some(key) = credentials.get(ProviderId::MillionVerifier) {
            builder = builder.validator(Arc::new(MillionVerifierService::new(
                http(ProviderId::MillionVerifier)?,
                key,
            )));
        }
        if let Some(service) = trykit {
            builder = builder.risk_validator(service);
        }
        if let Some(key) = credentials.get(ProviderId::BounceBan) {
            builder = builder.deliverability(Arc::new(BounceBanService::new(
                http(ProviderId::BounceBan)?,
                key,
            )));
        }
        if let Some(key) = credentials.get(ProviderId::EmailGuard) {
            builder = builder.esp_resolver(Arc::new(EmailGuardService::new(
                http(ProviderId::EmailGuard)?,
                key,
                config.esp_cache_ttl,
            )));
        }

        builder.build()
    }

    /// Enabled finders in cascade order.
    pub fn finder_ids(&self) -> Vec<ProviderId> {
        self.finders.iter().map(|f| f.id()).collect()
    }

    pub fn validator_id(&self) -> ProviderId {
        self.validator.id()
    }

    pub fn risk_validator_id(&self) -> Option<ProviderId> {
        self.risk_validator.as_ref().map(|v| v.id())
    }

    pub fn deliverability_id(&self) -> Option<ProviderId> {
        self.deliverability.as_ref().map(|d| d.id())
    }

    pub fn esp_resolver_id(&self) -> Option<ProviderId> {
        self.esp_resolver.as_ref().map(|r| r.id())
    }

    pub async fn find_email(&self, finder: ProviderId, full_name: &str, domain: &str) -> ProviderVerdict {
        match self.finders.iter().find(|f| f.id() == finder) {
            Some(f) => f.find_email(full_name, domain).await,
            None => unavailable("email finder"),
        }
    }

    pub async fn check_quality(&self, email: &str) -> ProviderVerdict {
        self.validator.check_quality(email).await
    }

    pub async fn check_validity(&self, email: &str) -> ProviderVerdict {
        match &self.risk_validator {
            Some(v) => v.check_validity(email).await,
            None => unavailable("risk validator"),
        }
    }

    pub async fn check_deliverability(&self, email: &str) -> ProviderVerdict {
        match &self.deliverability {
            Some(d) => d.check_deliverability(email).await,
            None => unavailable("deliverability checker"),
        }
    }

    pub async fn resolve_host(&self, email: &str) -> ProviderVerdict {
        match &self.esp_resolver {
            Some(r) => r.resolve_host(email).await,
            None => unavailable("ESP resolver"),
        }
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    finders: Vec<Arc<dyn EmailFinder>>,
    validator: Option<Arc<dyn EmailValidator>>,
    risk_validator: Option<Arc<dyn RiskValidator>>,
    deliverability: Option<Arc<dyn DeliverabilityChecker>>,
    esp_resolver: Option<Arc<dyn EspResolver>>,
}

impl RegistryBuilder {
    /// Appends a finder; finders are tried in the order they were added.
    pub fn finder(mut self, finder: Arc<dyn EmailFinder>) -> Self {
        self.finders.push(finder);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn EmailValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn risk_validator(mut self, validator: Arc<dyn RiskValidator>) -> Self {
        self.risk_validator = Some(validator);
        self
    }

    pub fn deliverability(mut self, checker: Arc<dyn DeliverabilityChecker>) -> Self {
        self.deliverability = Some(checker);
        self
    }

    pub fn esp_resolver(mut self, resolver: Arc<dyn EspResolver>) -> Self {
        self.esp_resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Result<ProviderRegistry, AppError> {
        if self.finders.is_empty() {
            return Err(AppError::ConfigError(
                "no email finder enabled (set TRYKIT_API_KEY, LEADMAGIC_API_KEY or ICYPEAS_API_KEY)"
                    .to_string(),
            ));
        }

        let mut seen = Vec::with_capacity(self.finders.len());
        for finder in &self.finders {
            if seen.contains(&finder.id()) {
                return Err(AppError::ConfigError(format!(
                    "email finder {} registered twice",
                    finder.id()
                )));
            }
            seen.push(finder.id());
        }

        let validator = self.validator.ok_or_else(|| {
            AppError::ConfigError(
                "no quality validator enabled (set MILLIONVERIFIER_API_KEY)".to_string(),
            )
        })?;

        Ok(ProviderRegistry {
            finders: self.finders,
            validator,
            risk_validator: self.risk_validator,
            deliverability: self.deliverability,
            esp_resolver: self.esp_resolver,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quality;

    struct StaticFinder(ProviderId);

    #[async_trait]
    impl EmailFinder for StaticFinder {
        fn id(&self) -> ProviderId {
            self.0
        }
        async fn find_email(&self, _full_name: &str, domain: &str) -> ProviderVerdict {
            ProviderVerdict::Email(format!("hit@{}", domain))
        }
    }

    struct AlwaysGood;

    #[async_trait]
    impl EmailValidator for AlwaysGood {
        fn id(&self) -> ProviderId {
            ProviderId::MillionVerifier
        }
        async fn check_quality(&self, _email: &str) -> ProviderVerdict {
            ProviderVerdict::Quality(Quality::Good)
        }
    }

    #[test]
    fn test_build_requires_a_finder() {
        let err = ProviderRegistry::builder()
            .validator(Arc::new(AlwaysGood))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("no email finder"));
    }

    #[test]
    fn test_build_requires_a_validator() {
        let err = ProviderRegistry::builder()
            .finder(Arc::new(StaticFinder(ProviderId::TryKit)))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("no quality validator"));
    }

    #[test]
    fn test_duplicate_finder_is_rejected() {
        let result = ProviderRegistry::builder()
            .finder(Arc::new(StaticFinder(ProviderId::TryKit)))
            .finder(Arc::new(StaticFinder(ProviderId::TryKit)))
            .validator(Arc::new(AlwaysGood))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_capabilities_answer_no_candidate() {
        let registry = ProviderRegistry::builder()
            .finder(Arc::new(StaticFinder(ProviderId::LeadMagic)))
            .validator(Arc::new(AlwaysGood))
            .build()
            .unwrap();

        assert_eq!(registry.finder_ids(), vec![ProviderId::LeadMagic]);
        assert_eq!(
            registry.find_email(ProviderId::LeadMagic, "Jane Doe", "acme.com").await,
            ProviderVerdict::Email("hit@acme.com".to_string())
        );
        for verdict in [
            registry.find_email(ProviderId::Icypeas, "Jane Doe", "acme.com").await,
            registry.check_validity("a@acme.com").await,
            registry.check_deliverability("a@acme.com").await,
            registry.resolve_host("a@acme.com").await,
        ] {
            assert!(matches!(
                verdict,
                ProviderVerdict::Failure(ProviderFailure::NoCandidate(_))
            ));
        }
    }

    #[test]
    fn test_from_credentials_respects_finder_order() {
        let credentials = CredentialSet::from_pairs([
            ("TRYKIT_API_KEY", "a"),
            ("ICYPEAS_API_KEY", "b"),
            ("MILLIONVERIFIER_API_KEY", "c"),
        ]);
        let config = Config {
            finder_order: vec![ProviderId::Icypeas, ProviderId::LeadMagic, ProviderId::TryKit],
            ..Config::default()
        };

        let registry = ProviderRegistry::from_credentials(&credentials, &config).unwrap();

        assert_eq!(
            registry.finder_ids(),
            vec![ProviderId::Icypeas, ProviderId::TryKit]
        );
        assert_eq!(registry.risk_validator_id(), Some(ProviderId::TryKit));
        assert_eq!(registry.deliverability_id(), None);
        assert_eq!(registry.esp_resolver_id(), None);
    }

    #[test]
    fn test_from_credentials_without_validator_fails() {
        let credentials = CredentialSet::from_pairs([("LEADMAGIC_API_KEY", "a")]);
        let result = ProviderRegistry::from_credentials(&credentials, &Config::default());
        assert!(result.is_err());
    }
}
