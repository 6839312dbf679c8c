use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::ProviderFailure;

// ============ Providers ============

/// External data-providers known to the waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderId {
    TryKit,
    LeadMagic,
    Icypeas,
    MillionVerifier,
    BounceBan,
    EmailGuard,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::TryKit,
        ProviderId::LeadMagic,
        ProviderId::Icypeas,
        ProviderId::MillionVerifier,
        ProviderId::BounceBan,
        ProviderId::EmailGuard,
    ];

    /// Default finder cascade: cheapest and most accurate first.
    pub const DEFAULT_FINDER_ORDER: [ProviderId; 3] = [
        ProviderId::TryKit,
        ProviderId::LeadMagic,
        ProviderId::Icypeas,
    ];

    /// Stable identifier used in outputs, logs and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::TryKit => "trykit",
            ProviderId::LeadMagic => "leadmagic",
            ProviderId::Icypeas => "icypeas",
            ProviderId::MillionVerifier => "millionverifier",
            ProviderId::BounceBan => "bounceban",
            ProviderId::EmailGuard => "emailguard",
        }
    }

    /// Name of the credential entry holding this provider's API key.
    pub fn credential_key(&self) -> &'static str {
        match self {
            ProviderId::TryKit => "TRYKIT_API_KEY",
            ProviderId::LeadMagic => "LEADMAGIC_API_KEY",
            ProviderId::Icypeas => "ICYPEAS_API_KEY",
            ProviderId::MillionVerifier => "MILLIONVERIFIER_API_KEY",
            ProviderId::BounceBan => "BOUNCEBAN_API_KEY",
            ProviderId::EmailGuard => "EMAILGUARD_API_KEY",
        }
    }

    pub fn can_find_email(&self) -> bool {
        matches!(
            self,
            ProviderId::TryKit | ProviderId::LeadMagic | ProviderId::Icypeas
        )
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProviderId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| format!("unknown provider '{}'", s.trim()))
    }
}

impl Serialize for ProviderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============ Verdict labels ============

/// Quality classification from the primary validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    Bad,
    Risky,
    Unknown,
}

impl Quality {
    /// Parses a vendor label; anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "good" => Quality::Good,
            "bad" => Quality::Bad,
            "risky" => Quality::Risky,
            _ => Quality::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Good => "good",
            Quality::Bad => "bad",
            Quality::Risky => "risky",
            Quality::Unknown => "unknown",
        }
    }
}

/// Validity classification from the secondary (risk) validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    Valid,
    ValidRisky,
    Invalid,
    Unknown,
}

impl Validity {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "valid" => Validity::Valid,
            "valid-risky" => Validity::ValidRisky,
            "invalid" => Validity::Invalid,
            _ => Validity::Unknown,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Validity::Valid | Validity::ValidRisky)
    }
}

/// Result of the final deliverability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Deliverability {
    Deliverable,
    Undeliverable,
    Unknown,
}

impl Deliverability {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "deliverable" => Deliverability::Deliverable,
            "undeliverable" => Deliverability::Undeliverable,
            _ => Deliverability::Unknown,
        }
    }
}

/// Normalized result of exactly one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderVerdict {
    /// Discovered address; an empty string means "no match".
    Email(String),
    Quality(Quality),
    Validity(Validity),
    Deliverability(Deliverability),
    Host(String),
    Failure(ProviderFailure),
}

impl ProviderVerdict {
    pub fn no_match() -> Self {
        ProviderVerdict::Email(String::new())
    }

    #[cfg(test)]
    pub fn is_failure(&self) -> bool {
        matches!(self, ProviderVerdict::Failure(_))
    }
}

// ============ Contacts & outcomes ============

/// Identity input for one enrichment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub full_name: String,
    /// Explicit first name when the source carries one separately.
    pub first_name: Option<String>,
    pub domain: String,
    pub company_name: String,
    pub existing_email: Option<String>,
}

impl Contact {
    pub fn new(
        full_name: impl Into<String>,
        domain: impl Into<String>,
        company_name: impl Into<String>,
    ) -> Self {
        Self {
            full_name: full_name.into().trim().to_string(),
            first_name: None,
            domain: domain.into().trim().to_string(),
            company_name: company_name.into().trim().to_string(),
            existing_email: None,
        }
    }

    /// Attaches a pre-existing email; blank values are treated as absent.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        let email = email.into();
        let email = email.trim();
        self.existing_email = (!email.is_empty()).then(|| email.to_string());
        self
    }

    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        let first_name = first_name.into();
        let first_name = first_name.trim();
        self.first_name = (!first_name.is_empty()).then(|| first_name.to_string());
        self
    }

    /// Raw first-name token: explicit column first, else the first word of the full name.
    pub fn raw_first_name(&self) -> &str {
        match self.first_name.as_deref() {
            Some(first) => first,
            None => self.full_name.split_whitespace().next().unwrap_or(""),
        }
    }
}

/// Where the candidate email came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EmailSource {
    Original,
    Provider(ProviderId),
}

impl fmt::Display for EmailSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailSource::Original => f.write_str("original"),
            EmailSource::Provider(id) => f.write_str(id.as_str()),
        }
    }
}

impl Serialize for EmailSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Why a contact ended in the FAILED state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureReason {
    NoEmailFound,
    FoundEmailFailedValidation,
    RiskyEmailUnresolved,
    /// The worker enriching this contact died before producing an outcome.
    Internal(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoEmailFound => f.write_str("no email found"),
            FailureReason::FoundEmailFailedValidation => {
                f.write_str("found email failed validation")
            }
            FailureReason::RiskyEmailUnresolved => f.write_str("risky email unresolved"),
            FailureReason::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One field update emitted by the waterfall state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomePatch {
    OriginalQuality(Quality),
    FoundEmail(String),
    Source(EmailSource),
    Quality(Quality),
    Validity(Validity),
    Deliverability(Deliverability),
    Confirmed(String),
    EspHost(String),
    Failed(FailureReason),
}

/// Accumulated per-contact enrichment record.
///
/// Fields are written at most once; later patches for an already-set field
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentOutcome {
    pub full_name: String,
    pub domain: String,
    pub first_name_clean: String,
    pub company_name_clean: String,
    pub original_email: Option<String>,
    pub original_quality: Option<Quality>,
    pub found_email: Option<String>,
    pub email_source: Option<EmailSource>,
    pub quality: Option<Quality>,
    pub validity: Option<Validity>,
    pub deliverability: Option<Deliverability>,
    pub valid_email: Option<String>,
    pub esp_host: Option<String>,
    pub failure: Option<FailureReason>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &str) {
    if slot.is_some() {
        tracing::debug!("Ignoring second write to outcome field '{}'", field);
        return;
    }
    *slot = Some(value);
}

impl EnrichmentOutcome {
    /// Starts an outcome for `contact` with normalized names filled in.
    pub fn for_contact(contact: &Contact) -> Self {
        Self {
            full_name: contact.full_name.clone(),
            domain: contact.domain.clone(),
            first_name_clean: crate::normalize::clean_first_name(contact.raw_first_name()),
            company_name_clean: crate::normalize::clean_company_name(&contact.company_name),
            original_email: contact.existing_email.clone(),
            ..Default::default()
        }
    }

    pub fn apply(&mut self, patch: OutcomePatch) {
        match patch {
            OutcomePatch::OriginalQuality(q) => {
                set_once(&mut self.original_quality, q, "original_quality")
            }
            OutcomePatch::FoundEmail(email) => set_once(&mut self.found_email, email, "found_email"),
            OutcomePatch::Source(source) => set_once(&mut self.email_source, source, "email_source"),
            OutcomePatch::Quality(q) => set_once(&mut self.quality, q, "quality"),
            OutcomePatch::Validity(v) => set_once(&mut self.validity, v, "validity"),
            OutcomePatch::Deliverability(d) => {
                set_once(&mut self.deliverability, d, "deliverability")
            }
            OutcomePatch::Confirmed(email) => set_once(&mut self.valid_email, email, "valid_email"),
            OutcomePatch::EspHost(host) => set_once(&mut self.esp_host, host, "esp_host"),
            OutcomePatch::Failed(reason) => set_once(&mut self.failure, reason, "failure"),
        }
    }

    pub fn apply_all(&mut self, patches: impl IntoIterator<Item = OutcomePatch>) {
        for patch in patches {
            self.apply(patch);
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.valid_email
            .as_deref()
            .map(|e| !e.is_empty())
            .unwrap_or(false)
    }
}

// ============ HTTP payloads ============

/// Contact payload accepted by the HTTP surface.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactRequest {
    pub full_name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    pub domain: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default, alias = "existing_email")]
    pub email: Option<String>,
}

impl ContactRequest {
    pub fn into_contact(self) -> Contact {
        let mut contact = Contact::new(
            self.full_name,
            crate::records::clean_domain(&self.domain),
            self.company_name.unwrap_or_default(),
        );
        if let Some(email) = self.email {
            contact = contact.with_email(email);
        }
        if let Some(first) = self.first_name {
            contact = contact.with_first_name(first);
        }
        contact
    }
}
