//! Vendor clients.
//!
//! Each service performs its vendor's request through [`ProviderHttp`] and
//! reduces the response to a single [`ProviderVerdict`].

use async_trait::async_trait;
use moka::future::Cache;
use serde_json::{json, Value};
use std::time::Duration;

use crate::errors::ProviderFailure;
use crate::models::{Deliverability, ProviderId, ProviderVerdict, Quality, Validity};
use crate::provider_client::ProviderHttp;
use crate::registry::{
    DeliverabilityChecker, EmailFinder, EmailValidator, EspResolver, RiskValidator,
};

/// Attribution tag TryKit expects on every job.
const TRYKIT_SOURCE: &str = "BuzzLead";

/// Per-request verification timeout passed to MillionVerifier, in seconds.
const MILLIONVERIFIER_TIMEOUT: &str = "10";

fn verdict(
    result: Result<Value, ProviderFailure>,
    extract: impl FnOnce(&Value) -> ProviderVerdict,
) -> ProviderVerdict {
    match result {
        Ok(body) => extract(&body),
        Err(failure) => ProviderVerdict::Failure(failure),
    }
}

/// Reads `field` as an email; absent, null or blank means no match.
fn email_field(id: ProviderId, body: &Value, field: &str) -> ProviderVerdict {
    match body {
        Value::Null => ProviderVerdict::no_match(),
        Value::Object(map) => match map.get(field) {
            Some(Value::String(email)) => ProviderVerdict::Email(email.trim().to_string()),
            Some(Value::Null) | None => ProviderVerdict::no_match(),
            Some(other) => malformed(id, format!("'{}' is not a string: {}", field, other)),
        },
        other => malformed(id, format!("expected a JSON object, got {}", other)),
    }
}

/// Reads `field` as a label; absent or null is reported as `"unknown"`.
fn label_field(id: ProviderId, body: &Value, field: &str) -> Result<String, ProviderVerdict> {
    match body {
        Value::Null => Ok("unknown".to_string()),
        Value::Object(map) => match map.get(field) {
            Some(Value::String(label)) => Ok(label.clone()),
            Some(Value::Null) | None => Ok("unknown".to_string()),
            Some(other) => Err(malformed(
                id,
                format!("'{}' is not a string: {}", field, other),
            )),
        },
        other => Err(malformed(id, format!("expected a JSON object, got {}", other))),
    }
}

fn malformed(id: ProviderId, detail: String) -> ProviderVerdict {
    ProviderVerdict::Failure(ProviderFailure::MalformedResponse(format!(
        "{}: {}",
        id, detail
    )))
}

// ============ TryKit ============

/// TryKit: email finder and secondary (risk) validator.
pub struct TryKitService {
    http: ProviderHttp,
    api_key: String,
}

impl TryKitService {
    pub fn new(http: ProviderHttp, api_key: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl EmailFinder for TryKitService {
    fn id(&self) -> ProviderId {
        ProviderId::TryKit
    }

    async fn find_email(&self, full_name: &str, domain: &str) -> ProviderVerdict {
        tracing::debug!("TryKit: finding email at {}", domain);
        let url = self.http.url("/job/find_email");
        let body = json!({ "fullName": full_name, "domain": domain, "realtime": true });

        let result = self
            .http
            .call_json(|client| {
                client
                    .post(&url)
                    .query(&[("src", TRYKIT_SOURCE)])
                    .header("x-api-key", &self.api_key)
                    .json(&body)
            })
            .await;

        verdict(result, |body| email_field(ProviderId::TryKit, body, "email"))
    }
}

#[async_trait]
impl RiskValidator for TryKitService {
    fn id(&self) -> ProviderId {
        ProviderId::TryKit
    }

    async fn check_validity(&self, email: &str) -> ProviderVerdict {
        tracing::debug!("TryKit: re-checking risky email");
        let url = self.http.url("/job/verify_email");
        let body = json!({ "email": email, "realtime": true });

        let result = self
            .http
            .call_json(|client| {
                client
                    .post(&url)
                    .query(&[("src", TRYKIT_SOURCE)])
                    .header("x-api-key", &self.api_key)
                    .json(&body)
            })
            .await;

        verdict(result, |body| match label_field(ProviderId::TryKit, body, "validity") {
            Ok(label) => ProviderVerdict::Validity(Validity::from_label(&label)),
            Err(failure) => failure,
        })
    }
}

// ============ LeadMagic ============

pub struct LeadMagicService {
    http: ProviderHttp,
    api_key: String,
}

impl LeadMagicService {
    pub fn new(http: ProviderHttp, api_key: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl EmailFinder for LeadMagicService {
    fn id(&self) -> ProviderId {
        ProviderId::LeadMagic
    }

    async fn find_email(&self, full_name: &str, domain: &str) -> ProviderVerdict {
        tracing::debug!("LeadMagic: finding email at {}", domain);
        let url = self.http.url("/business-email");
        let body = json!({ "name": full_name, "domain": domain });

        let result = self
            .http
            .call_json(|client| {
                client
                    .post(&url)
                    .header("X-API-Key", &self.api_key)
                    .json(&body)
            })
            .await;

        verdict(result, |body| email_field(ProviderId::LeadMagic, body, "email"))
    }
}

// ============ Icypeas ============

pub struct IcypeasService {
    http: ProviderHttp,
    api_key: String,
}

impl IcypeasService {
    pub fn new(http: ProviderHttp, api_key: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl EmailFinder for IcypeasService {
    fn id(&self) -> ProviderId {
        ProviderId::Icypeas
    }

    async fn find_email(&self, full_name: &str, domain: &str) -> ProviderVerdict {
        tracing::debug!("Icypeas: finding email at {}", domain);
        let url = self.http.url("/api/email-search");
        let body = json!({ "full_name": full_name, "domain_name": domain });

        let result = self
            .http
            .call_json(|client| {
                client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            })
            .await;

        verdict(result, |body| email_field(ProviderId::Icypeas, body, "email"))
    }
}

// ============ MillionVerifier ============

/// MillionVerifier: primary quality validator. The key travels as a query param.
pub struct MillionVerifierService {
    http: ProviderHttp,
    api_key: String,
}

impl MillionVerifierService {
    pub fn new(http: ProviderHttp, api_key: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl EmailValidator for MillionVerifierService {
    fn id(&self) -> ProviderId {
        ProviderId::MillionVerifier
    }

    async fn check_quality(&self, email: &str) -> ProviderVerdict {
        tracing::debug!("MillionVerifier: validating email");
        let url = self.http.url("/api/v3/");

        let result = self
            .http
            .call_json(|client| {
                client.get(&url).query(&[
                    ("api", self.api_key.as_str()),
                    ("email", email),
                    ("timeout", MILLIONVERIFIER_TIMEOUT),
                ])
            })
            .await;

        verdict(result, |body| {
            match label_field(ProviderId::MillionVerifier, body, "quality") {
                Ok(label) => ProviderVerdict::Quality(Quality::from_label(&label)),
                Err(failure) => failure,
            }
        })
    }
}

// ============ BounceBan ============

/// BounceBan: final deliverability check. Sends the raw key as `Authorization`.
pub struct BounceBanService {
    http: ProviderHttp,
    api_key: String,
}

impl BounceBanService {
    pub fn new(http: ProviderHttp, api_key: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl DeliverabilityChecker for BounceBanService {
    fn id(&self) -> ProviderId {
        ProviderId::BounceBan
    }

    async fn check_deliverability(&self, email: &str) -> ProviderVerdict {
        tracing::debug!("BounceBan: final deliverability check");
        let url = self.http.url("/v1/verify/single");

        let result = self
            .http
            .call_json(|client| {
                client
                    .get(&url)
                    .query(&[("email", email)])
                    .header("Authorization", &self.api_key)
            })
            .await;

        verdict(result, |body| match label_field(ProviderId::BounceBan, body, "result") {
            Ok(label) => ProviderVerdict::Deliverability(Deliverability::from_label(&label)),
            Err(failure) => failure,
        })
    }
}

// ============ EmailGuard ============

/// EmailGuard: ESP host lookup, cached per email domain.
pub struct EmailGuardService {
    http: ProviderHttp,
    auth_header: String,
    cache: Cache<String, String>,
}

impl EmailGuardService {
    pub fn new(http: ProviderHttp, api_key: &str, cache_ttl: Duration) -> Self {
        let auth_header = if api_key.starts_with("Bearer ") {
            api_key.to_string()
        } else {
            format!("Bearer {}", api_key)
        };

        Self {
            http,
            auth_header,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(cache_ttl)
                .build(),
        }
    }

    async fn lookup(&self, email: &str) -> ProviderVerdict {
        let url = self.http.url("/api/v1/email-host-lookup");
        let body = json!({ "email": email });

        let result = self
            .http
            .call_json(|client| {
                client
                    .post(&url)
                    .header("Authorization", &self.auth_header)
                    .json(&body)
            })
            .await;

        verdict(result, |body| {
            match body.get("data").and_then(|data| data.get("email_host")) {
                Some(Value::String(host)) if !host.trim().is_empty() => {
                    ProviderVerdict::Host(host.trim().to_string())
                }
                _ => malformed(
                    ProviderId::EmailGuard,
                    "response has no data.email_host".to_string(),
                ),
            }
        })
    }
}

fn email_domain(email: &str) -> Option<String> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim().to_lowercase())
        .filter(|domain| !domain.is_empty())
}

#[async_trait]
impl EspResolver for EmailGuardService {
    fn id(&self) -> ProviderId {
        ProviderId::EmailGuard
    }

    async fn resolve_host(&self, email: &str) -> ProviderVerdict {
        let domain = email_domain(email);

        if let Some(domain) = &domain {
            if let Some(host) = self.cache.get(domain).await {
                tracing::debug!("ESP cache hit for {}", domain);
                return ProviderVerdict::Host(host);
            }
        }

        tracing::debug!("EmailGuard: looking up ESP");
        let verdict = self.lookup(email).await;

        if let (Some(domain), ProviderVerdict::Host(host)) = (domain, &verdict) {
            self.cache.insert(domain, host.clone()).await;
        }
        verdict
    }
}
