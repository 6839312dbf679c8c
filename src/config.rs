use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::models::ProviderId;

/// What to do with an inconclusive original email once every finder came up empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OriginalFallback {
    /// Drop it; the contact fails with "no email found".
    #[default]
    Discard,
    /// Re-validate it as the last-resort candidate.
    Retain,
}

impl FromStr for OriginalFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(OriginalFallback::Discard),
            "retain" => Ok(OriginalFallback::Retain),
            other => Err(format!(
                "unknown original email fallback '{}' (expected 'discard' or 'retain')",
                other
            )),
        }
    }
}

/// Base URL of every vendor API, overridable per provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderEndpoints {
    urls: BTreeMap<ProviderId, String>,
}

impl ProviderEndpoints {
    pub fn default_base_url(id: ProviderId) -> &'static str {
        match id {
            ProviderId::TryKit => "https://api.trykitt.ai",
            ProviderId::LeadMagic => "https://api.leadmagic.io",
            ProviderId::Icypeas => "https://app.icypeas.com",
            ProviderId::MillionVerifier => "https://api.millionverifier.com",
            ProviderId::BounceBan => "https://api.bounceban.com",
            ProviderId::EmailGuard => "https://app.emailguard.io",
        }
    }

    /// Env var overriding a provider's base URL, e.g. `TRYKIT_BASE_URL`.
    pub fn env_key(id: ProviderId) -> String {
        format!("{}_BASE_URL", id.as_str().to_ascii_uppercase())
    }

    pub fn base_url(&self, id: ProviderId) -> &str {
        self.urls
            .get(&id)
            .map(String::as_str)
            .unwrap_or_else(|| Self::default_base_url(id))
    }

    /// Points every provider at the same host; used by mocked tests.
    pub fn all_at(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        Self {
            urls: ProviderId::ALL.iter().map(|id| (*id, base.clone())).collect(),
        }
    }

    pub fn set(&mut self, id: ProviderId, base_url: &str) -> anyhow::Result<()> {
        let base = validate_base_url(&Self::env_key(id), base_url)?;
        self.urls.insert(id, base);
        Ok(())
    }
}

fn validate_base_url(key: &str, raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        anyhow::bail!("{} cannot be empty", key);
    }
    let parsed = url::Url::parse(raw)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", key, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", key);
    }
    Ok(raw.trim_end_matches('/').to_string())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub request_timeout: Duration,
    pub inter_call_delay: Duration,
    pub contact_delay: Duration,
    pub rate_limit_cooldown: Duration,
    pub concurrency: usize,
    pub original_fallback: OriginalFallback,
    pub finder_order: Vec<ProviderId>,
    pub circuit_breaker_threshold: u32,
    pub esp_cache_ttl: Duration,
    pub endpoints: ProviderEndpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            request_timeout: Duration::from_secs(20),
            inter_call_delay: Duration::from_millis(250),
            contact_delay: Duration::from_millis(500),
            rate_limit_cooldown: crate::pacing::DEFAULT_RATE_LIMIT_COOLDOWN,
            concurrency: 1,
            original_fallback: OriginalFallback::Discard,
            finder_order: ProviderId::DEFAULT_FINDER_ORDER.to_vec(),
            circuit_breaker_threshold: crate::circuit_breaker::DEFAULT_FAILURE_THRESHOLD,
            esp_cache_ttl: Duration::from_secs(3600),
            endpoints: ProviderEndpoints::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Finder order: {}",
            config
                .finder_order
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        tracing::debug!(
            "Timeout: {:?}, inter-call delay: {:?}, contact delay: {:?}, concurrency: {}",
            config.request_timeout,
            config.inter_call_delay,
            config.contact_delay,
            config.concurrency
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Builds a config from an arbitrary key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let number = |key: &str| -> anyhow::Result<Option<u64>> {
            get(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer", key))
                })
                .transpose()
        };

        let port = match get("PORT") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            None => defaults.port,
        };

        let request_timeout = match number("REQUEST_TIMEOUT_SECS")? {
            Some(0) => anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero"),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.request_timeout,
        };

        let concurrency = match number("CONCURRENCY")? {
            Some(0) => anyhow::bail!("CONCURRENCY must be at least 1"),
            Some(n) => n as usize,
            None => defaults.concurrency,
        };

        let original_fallback = match get("ORIGINAL_EMAIL_FALLBACK") {
            Some(v) => v
                .parse::<OriginalFallback>()
                .map_err(|e| anyhow::anyhow!(e))?,
            None => defaults.original_fallback,
        };

        let finder_order = match get("FINDER_ORDER") {
            Some(v) => parse_finder_order(&v)?,
            None => defaults.finder_order,
        };

        let circuit_breaker_threshold = match number("CIRCUIT_BREAKER_THRESHOLD")? {
            Some(0) => anyhow::bail!("CIRCUIT_BREAKER_THRESHOLD must be at least 1"),
            Some(n) => u32::try_from(n)
                .map_err(|_| anyhow::anyhow!("CIRCUIT_BREAKER_THRESHOLD is too large"))?,
            None => defaults.circuit_breaker_threshold,
        };

        let mut endpoints = ProviderEndpoints::default();
        for id in ProviderId::ALL {
            if let Some(url) = get(&ProviderEndpoints::env_key(id)) {
                endpoints.set(id, &url)?;
            }
        }

        Ok(Self {
            port,
            request_timeout,
            inter_call_delay: number("INTER_CALL_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.inter_call_delay),
            contact_delay: number("CONTACT_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.contact_delay),
            rate_limit_cooldown: number("RATE_LIMIT_COOLDOWN_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_cooldown),
            concurrency,
            original_fallback,
            finder_order,
            circuit_breaker_threshold,
            esp_cache_ttl: number("ESP_CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.esp_cache_ttl),
            endpoints,
        })
    }
}

/// Parses a comma-separated finder list such as `leadmagic,trykit`.
pub fn parse_finder_order(raw: &str) -> anyhow::Result<Vec<ProviderId>> {
    let mut order = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id: ProviderId = name.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        if !id.can_find_email() {
            anyhow::bail!("FINDER_ORDER: '{}' cannot find emails", id);
        }
        if order.contains(&id) {
            anyhow::bail!("FINDER_ORDER: '{}' listed twice", id);
        }
        order.push(id);
    }
    if order.is_empty() {
        anyhow::bail!("FINDER_ORDER cannot be empty");
    }
    Ok(order)
}
