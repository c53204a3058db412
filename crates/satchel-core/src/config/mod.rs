//! Engine and remote configuration.
//!
//! `EngineConfig` tunes retry, debounce, and timeout behaviour of the sync
//! engine. `RemoteConfig` points the engine at a PostgREST-compatible backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_endpoint, non_blank};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RECONNECT_DEBOUNCE_MS: u64 = 250;
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

const ENV_REST_URL: &str = "SATCHEL_SUPABASE_URL";
const ENV_ANON_KEY: &str = "SATCHEL_SUPABASE_ANON_KEY";
const ENV_ACCESS_TOKEN: &str = "SATCHEL_ACCESS_TOKEN";
const ENV_OWNER_ID: &str = "SATCHEL_STUDENT_ID";

/// Sync engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Failed attempts after which a queue item is flagged and no longer retried automatically
    pub max_retries: u32,
    /// Reconnects arriving this soon after the previous one are coalesced
    pub reconnect_debounce_ms: u64,
    /// Upper bound for every individual remote call
    pub operation_timeout_secs: u64,
    /// Periodic background sync interval; `None` disables the timer
    pub sync_interval_secs: Option<u64>,
    /// Student whose submissions are pulled; `None` pulls nothing for submissions
    pub owner_id: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            reconnect_debounce_ms: DEFAULT_RECONNECT_DEBOUNCE_MS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            sync_interval_secs: None,
            owner_id: None,
        }
    }
}

impl EngineConfig {
    /// Set the student id used to filter pulled submissions
    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = non_blank(Some(owner_id.into()));
        self
    }

    /// Enable periodic background sync
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_secs = Some(interval.as_secs());
        self
    }

    pub const fn reconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.reconnect_debounce_ms)
    }

    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Overlay values from the environment (`SATCHEL_STUDENT_ID`)
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(owner) = non_blank(std::env::var(ENV_OWNER_ID).ok()) {
            self.owner_id = Some(owner);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".into()));
        }
        if self.operation_timeout_secs == 0 {
            return Err(Error::Config(
                "operation_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Connection settings for the remote authoritative store.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Project base URL (e.g. `https://project.supabase.co`)
    #[serde(default)]
    pub rest_url: Option<String>,
    /// Public anon key sent as `apikey`
    #[serde(default)]
    pub anon_key: Option<String>,
    /// User access token; falls back to the anon key when absent
    #[serde(default)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("rest_url", &self.rest_url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl RemoteConfig {
    pub fn new(rest_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            rest_url: Some(rest_url.into()),
            anon_key: Some(anon_key.into()),
            access_token: None,
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Read remote settings from `SATCHEL_*` environment variables
    pub fn from_env() -> Self {
        Self {
            rest_url: std::env::var(ENV_REST_URL).ok(),
            anon_key: std::env::var(ENV_ANON_KEY).ok(),
            access_token: std::env::var(ENV_ACCESS_TOKEN).ok(),
        }
        .normalized()
    }

    /// Fill unset values from `other`
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self {
            rest_url: self.rest_url.or(other.rest_url),
            anon_key: self.anon_key.or(other.anon_key),
            access_token: self.access_token.or(other.access_token),
        }
    }

    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            rest_url: non_blank(self.rest_url)
                .map(|url| url.trim_end_matches('/').to_string()),
            anon_key: non_blank(self.anon_key),
            access_token: non_blank(self.access_token),
        }
    }

    /// Check if the remote is configured
    pub const fn is_configured(&self) -> bool {
        self.rest_url.is_some() && self.anon_key.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        let Some(url) = self.rest_url.as_deref() else {
            return Err(Error::Config("remote URL is required".into()));
        };
        if !is_http_endpoint(url) {
            return Err(Error::Config(
                "remote URL must include http:// or https://".into(),
            ));
        }
        if self.anon_key.is_none() {
            return Err(Error::Config("remote anon key is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.reconnect_debounce(), Duration::from_millis(250));
        assert_eq!(config.sync_interval(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn engine_config_fills_missing_fields_from_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.operation_timeout_secs, 30);
    }

    #[test]
    fn engine_config_rejects_zero_retries() {
        let config = EngineConfig {
            max_retries: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_sync_interval_disables_timer() {
        let config = EngineConfig {
            sync_interval_secs: Some(0),
            ..EngineConfig::default()
        };
        assert_eq!(config.sync_interval(), None);
    }

    #[test]
    fn remote_config_normalizes_and_validates() {
        let config = RemoteConfig::new(" https://project.supabase.co/ ", " anon ").normalized();
        assert_eq!(config.rest_url.as_deref(), Some("https://project.supabase.co"));
        assert_eq!(config.anon_key.as_deref(), Some("anon"));
        assert!(config.is_configured());
        assert!(config.validate().is_ok());

        let missing_scheme = RemoteConfig::new("project.supabase.co", "anon").normalized();
        assert!(missing_scheme.validate().is_err());

        assert!(!RemoteConfig::default().is_configured());
    }

    #[test]
    fn remote_config_debug_redacts_keys() {
        let config = RemoteConfig::new("https://x.supabase.co", "anon-secret")
            .with_access_token("token-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("anon-secret"));
        assert!(!debug.contains("token-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
