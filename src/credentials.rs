//! Provider credentials.
//!
//! Loaded once at startup and read-only afterwards. A provider with no (or a
//! blank) key is simply disabled.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, ResultExt};
use crate::models::ProviderId;

#[derive(Clone, Default)]
pub struct CredentialSet {
    keys: HashMap<ProviderId, String>,
}

// Keys never reach logs through Debug.
impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.keys.keys().map(|id| id.as_str()).collect();
        providers.sort_unstable();
        f.debug_struct("CredentialSet")
            .field("providers", &providers)
            .finish()
    }
}

impl CredentialSet {
    /// Builds a set from `KEY=value` style pairs; unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut keys = HashMap::new();
        for (key, value) in pairs {
            let Some(id) = ProviderId::ALL
                .iter()
                .copied()
                .find(|id| id.credential_key() == key.as_ref().trim())
            else {
                continue;
            };
            let value = value.as_ref().trim();
            if !value.is_empty() {
                keys.insert(id, value.to_string());
            }
        }
        Self { keys }
    }

    /// Reads `<PROVIDER>_API_KEY` entries from a dotenv-style secrets file.
    pub fn from_env_file(path: &Path) -> Result<Self, AppError> {
        let path = expand_home(path);
        let entries = dotenvy::from_path_iter(&path)
            .map_err(|e| AppError::ConfigError(e.to_string()))
            .with_context(|| format!("Failed to open secrets file {}", path.display()))?;

        let pairs = entries
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::ConfigError(e.to_string()))
            .with_context(|| format!("Failed to parse secrets file {}", path.display()))?;

        let credentials = Self::from_pairs(pairs);
        tracing::info!(
            "Loaded {} provider credential(s) from {}",
            credentials.len(),
            path.display()
        );
        Ok(credentials)
    }

    /// Reads `<PROVIDER>_API_KEY` entries from the process environment.
    pub fn from_process_env() -> Self {
        Self::from_pairs(ProviderId::ALL.iter().filter_map(|id| {
            std::env::var(id.credential_key())
                .ok()
                .map(|value| (id.credential_key(), value))
        }))
    }

    pub fn get(&self, id: ProviderId) -> Option<&str> {
        self.keys.get(&id).map(String::as_str)
    }

    #[cfg(test)]
    pub fn contains(&self, id: ProviderId) -> bool {
        self.keys.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Short, non-reversible tag identifying a provider's key in logs.
    pub fn fingerprint(&self, id: ProviderId) -> Option<String> {
        self.get(id).map(fingerprint)
    }
}

/// First 8 hex chars of the SHA-256 of `secret`.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(digest)[..8].to_string()
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
