//! Error types for pairing and sessions

use thiserror::Error;

/// Pairing errors
///
/// Every variant is an expected outcome the caller maps to its own response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    #[error("Rate limit exceeded, wait for the current window to end")]
    RateLimited,
    #[error("Could not find a free pairing code")]
    CodeSpaceExhausted,
    #[error("Invalid code")]
    InvalidCode,
    #[error("Code already used")]
    AlreadyUsed,
    #[error("Code expired")]
    Expired,
    #[error("Too many attempts, generate a new code")]
    TooManyAttempts,
    #[error("Missing required field: {0}")]
    InvalidRequest(&'static str),
    #[error("Source {0:?} may not issue pairing codes")]
    SourceNotAllowed(String),
}

impl PairingError {
    /// Stable tag for transport layers
    pub fn kind(&self) -> &'static str {
        match self {
            PairingError::RateLimited => "rate_limited",
            PairingError::CodeSpaceExhausted => "code_space_exhausted",
            PairingError::InvalidCode => "invalid_code",
            PairingError::AlreadyUsed => "already_used",
            PairingError::Expired => "expired",
            PairingError::TooManyAttempts => "too_many_attempts",
            PairingError::InvalidRequest(_) => "invalid_request",
            PairingError::SourceNotAllowed(_) => "source_not_allowed",
        }
    }

    /// Whether the failed redemption also destroys the entry
    pub(crate) fn removes_entry(&self) -> bool {
        matches!(self, PairingError::Expired | PairingError::TooManyAttempts)
    }
}

pub type PairingResult<T> = Result<T, PairingError>;

/// Session errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session not found or expired: {0}")]
    NotFound(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
