//! Pairing entries and their redemption state machine

use crate::error::{PairingError, PairingResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An outstanding pairing code and the context it is bound to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingEntry {
    /// The 6-digit code handed to the issuer
    pub code: String,
    /// Principal the code was issued for
    pub tenant_id: String,
    /// Context bound to the code (e.g. a project path)
    pub resource: String,
    /// Caller class the issuance was rate limited under
    pub source: String,
    /// When the code was issued
    pub created_at: DateTime<Utc>,
    /// When the code stops being redeemable
    pub expires_at: DateTime<Utc>,
    /// Redemption attempts counted against this code
    pub attempts: u32,
    /// Set once the code has been redeemed
    pub used: bool,
}

/// What a successful redemption hands back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub tenant_id: String,
    pub resource: String,
}

impl PairingEntry {
    /// Create a fresh entry issued at `now`
    pub fn new(
        code: String,
        tenant_id: String,
        resource: String,
        source: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            code,
            tenant_id,
            resource,
            source,
            created_at: now,
            expires_at: now + ttl,
            attempts: 0,
            used: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.attempts > max_attempts
    }

    /// Used, expired or out of attempts
    pub fn is_dead(&self, now: DateTime<Utc>, max_attempts: u32) -> bool {
        self.used || self.is_expired(now) || self.is_exhausted(max_attempts)
    }

    /// Seconds left before expiry, zero once expired
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// Attempt to redeem this entry at `now`
    ///
    /// Every call that gets past the used and expiry checks counts as an
    /// attempt, whether or not it ends up succeeding. On `Expired` and
    /// `TooManyAttempts` the caller must drop the entry.
    pub fn redeem(&mut self, now: DateTime<Utc>, max_attempts: u32) -> PairingResult<Redemption> {
        if self.used {
            return Err(PairingError::AlreadyUsed);
        }
        if self.is_expired(now) {
            return Err(PairingError::Expired);
        }

        self.attempts += 1;
        if self.is_exhausted(max_attempts) {
            return Err(PairingError::TooManyAttempts);
        }

        self.used = true;
        Ok(Redemption {
            tenant_id: self.tenant_id.clone(),
            resource: self.resource.clone(),
        })
    }
}
