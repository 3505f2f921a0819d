//! Fixed-window rate limiting keyed by source
//!
//! A source gets `max` issuances per window. The window starts with the first
//! request seen after the previous one ended, so a client can burst up to
//! twice the limit across a boundary.

use chrono::{DateTime, Duration, Utc};
use codepair_core::PairingConfig;
use std::collections::HashMap;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied,
}

/// Counter for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests seen in the current window
    pub count: u32,
    /// When the window rolls over
    pub reset_at: DateTime<Utc>,
}

/// Per-source fixed-window counters
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<String, RateWindow>,
    max: u32,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter allowing `max` requests per `window`
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            windows: HashMap::new(),
            max,
            window,
        }
    }

    /// Create a limiter from the pairing configuration
    pub fn from_config(config: &PairingConfig) -> Self {
        Self::new(config.rate_limit_max, config.rate_limit_window())
    }

    /// Count a request from `source` observed at `now`
    pub fn check(&mut self, source: &str, now: DateTime<Utc>) -> RateDecision {
        match self.windows.get_mut(source) {
            Some(window) if now < window.reset_at => {
                if window.count < self.max {
                    window.count += 1;
                    RateDecision::Allowed
                } else {
                    RateDecision::Denied
                }
            }
            _ => {
                self.windows.insert(
                    source.to_string(),
                    RateWindow {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                RateDecision::Allowed
            }
        }
    }

    /// Drop windows that have rolled over, returning how many were removed
    ///
    /// A missing window and an elapsed one behave the same on the next check.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| now < w.reset_at);
        before - self.windows.len()
    }

    /// Current window for `source`, if one is tracked
    #[cfg(test)]
    fn window(&self, source: &str) -> Option<&RateWindow> {
        self.windows.get(source)
    }

    /// Number of tracked windows
    pub(crate) fn len(&self) -> usize {
        self.windows.len()
    }
}
