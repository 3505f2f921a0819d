//! Codepair Core - Shared configuration and error types
//!
//! This crate provides the foundational types used by the pairing store and the
//! operator console.

pub mod config;
pub mod error;

pub use config::{
    PairingConfig, CODE_LENGTH, DEFAULT_CODE_TTL_SECS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_CODE_REGENERATIONS, DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW_SECS,
    DEFAULT_REAP_INTERVAL_SECS, DEFAULT_SESSION_TTL_SECS, MAX_DURATION_SECS,
};
pub use error::{Error, Result};
