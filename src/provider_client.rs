//! Shared HTTP plumbing for every vendor client.
//!
//! [`ProviderHttp::call_json`] performs one paced, circuit-protected request
//! and folds transport and HTTP errors into [`ProviderFailure`].

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::circuit_breaker::{create_provider_circuit_breaker, ProviderBreaker};
use crate::errors::{AppError, ProviderFailure};
use crate::models::ProviderId;
use crate::pacing::PacingController;

pub struct ProviderHttp {
    id: ProviderId,
    base_url: String,
    client: Client,
    pacer: Arc<PacingController>,
    breaker: ProviderBreaker,
}

impl ProviderHttp {
    pub fn new(
        id: ProviderId,
        base_url: impl Into<String>,
        timeout: Duration,
        pacer: Arc<PacingController>,
        breaker_threshold: u32,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("{}: HTTP client: {}", id, e)))?;

        Ok(Self {
            id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            pacer,
            breaker: create_provider_circuit_breaker(breaker_threshold),
        })
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request produced by `build` and returns the decoded JSON body.
    ///
    /// HTTP 404 yields `Value::Null` ("nothing found"). A 429 goes through the
    /// pacer's single cooldown retry. While the breaker is open no request is
    /// made and `NoCandidate` is returned.
    pub async fn call_json<F>(&self, build: F) -> Result<Value, ProviderFailure>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        if !self.breaker.is_call_permitted() {
            tracing::warn!("{}: circuit open, skipping call", self.id);
            return Err(ProviderFailure::NoCandidate(format!(
                "{} circuit breaker is open",
                self.id
            )));
        }

        let result = self.pacer.execute(|| self.attempt(&build)).await;

        match &result {
            Ok(_) => self.breaker.on_success(),
            Err(failure) if failure.trips_breaker() => {
                tracing::warn!("{}: {}", self.id, failure);
                self.breaker.on_error();
            }
            Err(_) => {}
        }

        result
    }

    async fn attempt<F>(&self, build: &F) -> Result<Value, ProviderFailure>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = build(&self.client).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderFailure::Transport(format!("{} request timed out", self.id))
            } else {
                ProviderFailure::Transport(format!("{} request failed: {}", self.id, e))
            }
        })?;

        let status = response.status();
        tracing::debug!("{}: HTTP {}", self.id, status);

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(ProviderFailure::RateLimited(format!("{} returned 429", self.id)))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderFailure::Auth(format!(
                    "{} rejected the API key ({})",
                    self.id, status
                )))
            }
            StatusCode::NOT_FOUND => return Ok(Value::Null),
            _ => {}
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderFailure::Transport(format!(
                "{} returned {}: {}",
                self.id,
                status,
                truncate(&body, 200)
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            ProviderFailure::MalformedResponse(format!("{} sent invalid JSON: {}", self.id, e))
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 200), "short");
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let pacer = Arc::new(PacingController::new("t", Duration::ZERO, Duration::ZERO));
        let http = ProviderHttp::new(
            ProviderId::LeadMagic,
            "http://localhost:1/",
            Duration::from_secs(1),
            pacer,
            5,
        )
        .unwrap();
        assert_eq!(http.url("/business-email"), "http://localhost:1/business-email");
        assert_eq!(http.id(), ProviderId::LeadMagic);
    }
}
