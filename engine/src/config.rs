//! Engine configuration.

use crate::merge::MergePolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default interval between remote fetches.
pub const DEFAULT_POLL_PERIOD_MS: u64 = 3000;

/// Default limit on a single remote fetch.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Default buffer size of the status broadcast channel.
pub const DEFAULT_STATUS_CAPACITY: usize = 64;

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Poller tick interval in milliseconds
    pub poll_period_ms: u64,
    /// Keep the existing value when timestamps tie
    pub local_bias_on_tie: bool,
    /// Per-fetch timeout in milliseconds
    pub fetch_timeout_ms: u64,
    /// Status events buffered per subscriber before old ones are dropped
    pub status_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_period_ms: DEFAULT_POLL_PERIOD_MS,
            local_bias_on_tie: true,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            status_capacity: DEFAULT_STATUS_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// - `NOTESYNC_POLL_PERIOD_MS`
    /// - `NOTESYNC_LOCAL_BIAS_ON_TIE`
    /// - `NOTESYNC_FETCH_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll_period_ms = match env::var("NOTESYNC_POLL_PERIOD_MS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidPollPeriod(raw))?,
            Err(_) => defaults.poll_period_ms,
        };

        let local_bias_on_tie = match env::var("NOTESYNC_LOCAL_BIAS_ON_TIE") {
            Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidTieBias(raw))?,
            Err(_) => defaults.local_bias_on_tie,
        };

        let fetch_timeout_ms = match env::var("NOTESYNC_FETCH_TIMEOUT_MS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidFetchTimeout(raw))?,
            Err(_) => defaults.fetch_timeout_ms,
        };

        Self {
            poll_period_ms,
            local_bias_on_tie,
            fetch_timeout_ms,
            ..defaults
        }
        .validated()
    }

    /// Reject settings the engine cannot run with.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.poll_period_ms == 0 {
            return Err(ConfigError::InvalidPollPeriod("0".into()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::InvalidFetchTimeout("0".into()));
        }
        if self.status_capacity == 0 {
            return Err(ConfigError::InvalidStatusCapacity);
        }
        Ok(self)
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy {
            local_bias_on_tie: self.local_bias_on_tie,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid poll period: {0} (expected a positive number of milliseconds)")]
    InvalidPollPeriod(String),

    #[error("Invalid fetch timeout: {0} (expected a positive number of milliseconds)")]
    InvalidFetchTimeout(String),

    #[error("Invalid tie bias: {0} (expected true or false)")]
    InvalidTieBias(String),

    #[error("Status capacity must be at least 1")]
    InvalidStatusCapacity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_period(), Duration::from_millis(3000));
        assert!(config.local_bias_on_tie);
        assert!(config.merge_policy().local_bias_on_tie);
    }

    #[test]
    fn deserialize_partial_camel_case() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"pollPeriodMs": 500, "localBiasOnTie": false}"#).unwrap();

        assert_eq!(config.poll_period_ms, 500);
        assert!(!config.local_bias_on_tie);
        assert_eq!(config.fetch_timeout_ms, DEFAULT_FETCH_TIMEOUT_MS);
    }

    #[test]
    fn zero_period_is_rejected() {
        let config = SyncConfig {
            poll_period_ms: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validated(),
            Err(ConfigError::InvalidPollPeriod("0".into()))
        );
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
