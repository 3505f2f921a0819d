//! Configuration types for codepair

use crate::error::{Error, Result};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Number of decimal digits in a pairing code
pub const CODE_LENGTH: usize = 6;

/// Default pairing code lifetime in seconds
pub const DEFAULT_CODE_TTL_SECS: u64 = 5 * 60;

/// Default number of redemption attempts counted against one code
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default rate limit window length in seconds
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Default number of issuances allowed per source per window
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 5;

/// Default number of regenerations after a code collision
pub const DEFAULT_MAX_CODE_REGENERATIONS: u32 = 10;

/// Default session lifetime in seconds (24 hours)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Default period of the background reaper in seconds
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 30;

/// Upper bound for every configured duration (ten years)
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Configuration for the pairing store, rate limiter, reaper and sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Seconds a pairing code stays redeemable
    pub code_ttl_secs: u64,
    /// Attempts allowed against one code before it is invalidated
    pub max_attempts: u32,
    /// Length of a rate limit window in seconds
    pub rate_limit_window_secs: u64,
    /// Issuances allowed per source inside one window
    pub rate_limit_max: u32,
    /// Regenerations tried when a candidate code is already live
    pub max_code_regenerations: u32,
    /// Seconds a session stays valid after it is opened
    pub session_ttl_secs: u64,
    /// Period of the background reaper in seconds
    pub reap_interval_secs: u64,
    /// Sources allowed to issue codes (any source if None)
    pub allowed_sources: Option<Vec<String>>,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: DEFAULT_CODE_TTL_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            max_code_regenerations: DEFAULT_MAX_CODE_REGENERATIONS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            reap_interval_secs: DEFAULT_REAP_INTERVAL_SECS,
            allowed_sources: None,
        }
    }
}

impl PairingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults. The result is validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        debug!("Loaded pairing configuration from {:?}", path);
        Ok(config)
    }

    /// Builder pattern: set code lifetime
    pub fn with_code_ttl_secs(mut self, secs: u64) -> Self {
        self.code_ttl_secs = secs;
        self
    }

    /// Builder pattern: set attempt cap
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Builder pattern: set rate limit window
    pub fn with_rate_limit_window_secs(mut self, secs: u64) -> Self {
        self.rate_limit_window_secs = secs;
        self
    }

    /// Builder pattern: set issuances per window
    pub fn with_rate_limit_max(mut self, max: u32) -> Self {
        self.rate_limit_max = max;
        self
    }

    /// Builder pattern: set collision regenerations
    pub fn with_max_code_regenerations(mut self, retries: u32) -> Self {
        self.max_code_regenerations = retries;
        self
    }

    /// Builder pattern: set session lifetime
    pub fn with_session_ttl_secs(mut self, secs: u64) -> Self {
        self.session_ttl_secs = secs;
        self
    }

    /// Builder pattern: set reaper period
    pub fn with_reap_interval_secs(mut self, secs: u64) -> Self {
        self.reap_interval_secs = secs;
        self
    }

    /// Builder pattern: restrict issuance to the given sources
    pub fn with_allowed_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        check_duration("code_ttl_secs", self.code_ttl_secs)?;
        if self.max_attempts == 0 {
            return Err(Error::invalid_value("max_attempts", "must be greater than zero"));
        }
        check_duration("rate_limit_window_secs", self.rate_limit_window_secs)?;
        if self.rate_limit_max == 0 {
            return Err(Error::invalid_value("rate_limit_max", "must be greater than zero"));
        }
        check_duration("session_ttl_secs", self.session_ttl_secs)?;
        check_duration("reap_interval_secs", self.reap_interval_secs)?;
        if let Some(sources) = &self.allowed_sources {
            if sources.is_empty() {
                return Err(Error::Config(
                    "allowed_sources is set but empty, no source could issue codes".to_string(),
                ));
            }
            if sources.iter().any(|s| s.trim().is_empty()) {
                return Err(Error::invalid_value("allowed_sources", "contains a blank entry"));
            }
        }
        Ok(())
    }

    /// Whether `source` may issue codes under this configuration
    pub fn is_source_allowed(&self, source: &str) -> bool {
        match &self.allowed_sources {
            Some(sources) => sources.iter().any(|s| s == source),
            None => true,
        }
    }

    /// Pairing code lifetime
    pub fn code_ttl(&self) -> TimeDelta {
        bounded_delta(self.code_ttl_secs)
    }

    /// Rate limit window length
    pub fn rate_limit_window(&self) -> TimeDelta {
        bounded_delta(self.rate_limit_window_secs)
    }

    /// Session lifetime
    pub fn session_ttl(&self) -> TimeDelta {
        bounded_delta(self.session_ttl_secs)
    }

    /// Background reaper period
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.min(MAX_DURATION_SECS))
    }
}

/// Reject zero and anything past `MAX_DURATION_SECS`
fn check_duration(field: &'static str, secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(Error::invalid_value(field, "must be greater than zero"));
    }
    if secs > MAX_DURATION_SECS {
        return Err(Error::invalid_value(
            field,
            format!("must be at most {} seconds", MAX_DURATION_SECS),
        ));
    }
    Ok(())
}

/// Seconds as a chrono delta, clamped to `MAX_DURATION_SECS`
///
/// Unvalidated configs still get a positive, representable duration.
fn bounded_delta(secs: u64) -> TimeDelta {
    i64::try_from(secs.min(MAX_DURATION_SECS))
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::zero())
}
