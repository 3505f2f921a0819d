//! Pairing code store
//!
//! Implements the single-use pairing flow:
//! 1. A trusted agent issues a 6-digit code bound to a tenant and resource
//! 2. The code is shown to a human, who types it into the plugin
//! 3. The plugin redeems the code exactly once and gets the bound context back
//! 4. The plugin mints its own session credential from that context
//!
//! Both tables live behind one lock, so every read-modify-write on an entry or
//! a rate window is atomic.

use crate::clock::{Clock, SystemClock};
use crate::code::{CodeSource, RandomCodes};
use crate::entry::{PairingEntry, Redemption};
use crate::error::{PairingError, PairingResult};
use crate::rate_limit::{RateDecision, RateLimiter};
use chrono::{DateTime, Utc};
use codepair_core::PairingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Snapshot for health and monitoring collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingStats {
    /// Codes that are unused, unexpired and under the attempt cap
    pub active_count: usize,
    /// Sources with an open rate limit window
    pub rate_windows: usize,
}

/// State guarded by the store lock
struct PairingState {
    entries: HashMap<String, PairingEntry>,
    limiter: RateLimiter,
    codes: Box<dyn CodeSource>,
}

impl PairingState {
    /// Pick a code no live entry holds
    fn unique_code(
        &mut self,
        now: DateTime<Utc>,
        max_attempts: u32,
        regenerations: u32,
    ) -> PairingResult<String> {
        for _ in 0..=regenerations {
            let code = format!("{:06}", self.codes.next_code());
            match self.entries.get(&code) {
                Some(existing) if !existing.is_dead(now, max_attempts) => continue,
                _ => return Ok(code),
            }
        }
        Err(PairingError::CodeSpaceExhausted)
    }

    /// Remove dead entries and elapsed rate windows
    fn sweep(&mut self, now: DateTime<Utc>, max_attempts: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_dead(now, max_attempts));
        self.limiter.sweep(now);
        before - self.entries.len()
    }
}

/// Owns outstanding pairing codes and per-source rate limits
///
/// Cloning is cheap and every clone shares the same tables.
#[derive(Clone)]
pub struct PairingStore {
    state: Arc<Mutex<PairingState>>,
    config: Arc<PairingConfig>,
    clock: Arc<dyn Clock>,
}

impl PairingStore {
    /// Create a store using the system clock and OS randomness
    pub fn new(config: PairingConfig) -> Self {
        Self::with_parts(config, Arc::new(SystemClock), Box::new(RandomCodes))
    }

    /// Create a store reading time from `clock`
    pub fn with_clock(config: PairingConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(config, clock, Box::new(RandomCodes))
    }

    /// Create a store with an explicit clock and code source
    pub fn with_parts(
        config: PairingConfig,
        clock: Arc<dyn Clock>,
        codes: Box<dyn CodeSource>,
    ) -> Self {
        let state = PairingState {
            entries: HashMap::new(),
            limiter: RateLimiter::from_config(&config),
            codes,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            config: Arc::new(config),
            clock,
        }
    }

    /// Configuration this store was built with
    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// Issue a new pairing code for `tenant_id` and `resource`
    ///
    /// Counts against the rate limit of `source` before anything is created.
    pub async fn issue_code(
        &self,
        tenant_id: &str,
        resource: &str,
        source: &str,
    ) -> PairingResult<String> {
        require_field("tenant_id", tenant_id)?;
        require_field("resource", resource)?;
        require_field("source", source)?;

        if !self.config.is_source_allowed(source) {
            warn!("Rejected pairing request from disallowed source {:?}", source);
            return Err(PairingError::SourceNotAllowed(source.to_string()));
        }

        let max_attempts = self.config.max_attempts;
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if state.limiter.check(source, now) == RateDecision::Denied {
            warn!("Rate limit exceeded for source {:?}", source);
            return Err(PairingError::RateLimited);
        }

        let code = state.unique_code(now, max_attempts, self.config.max_code_regenerations)?;
        let entry = PairingEntry::new(
            code.clone(),
            tenant_id.to_string(),
            resource.to_string(),
            source.to_string(),
            now,
            self.config.code_ttl(),
        );

        if let Some(previous) = state.entries.insert(code.clone(), entry) {
            assert!(
                previous.is_dead(now, max_attempts),
                "pairing code displaced a live entry"
            );
        }

        let removed = state.sweep(now, max_attempts);
        if removed > 0 {
            debug!("Swept {} dead pairing entries on issuance", removed);
        }

        info!("Issued pairing code for tenant {}", tenant_id);
        Ok(code)
    }

    /// Redeem `code` and return the context it was issued for
    ///
    /// `code` must already be normalized; see [`crate::normalize_code`].
    pub async fn redeem_code(&self, code: &str) -> PairingResult<Redemption> {
        let max_attempts = self.config.max_attempts;
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let Some(entry) = state.entries.get_mut(code) else {
            warn!("Redemption attempt with unknown code");
            return Err(PairingError::InvalidCode);
        };

        match entry.redeem(now, max_attempts) {
            Ok(redemption) => {
                info!("Pairing code redeemed for tenant {}", redemption.tenant_id);
                Ok(redemption)
            }
            Err(err) => {
                if err.removes_entry() {
                    state.entries.remove(code);
                }
                warn!("Pairing code redemption failed: {}", err);
                Err(err)
            }
        }
    }

    /// Seconds until `code` expires, if it is still live
    ///
    /// Does not count as a redemption attempt.
    pub async fn expires_in(&self, code: &str) -> Option<i64> {
        let state = self.state.lock().await;
        let now = self.clock.now();
        state
            .entries
            .get(code)
            .filter(|e| !e.is_dead(now, self.config.max_attempts))
            .map(|e| e.remaining_secs(now))
    }

    /// Remove dead entries, returning how many were removed
    pub async fn sweep(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        state.sweep(now, self.config.max_attempts)
    }

    /// Live entry counts after an implicit sweep
    pub async fn stats(&self) -> PairingStats {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        state.sweep(now, self.config.max_attempts);
        PairingStats {
            active_count: state.entries.len(),
            rate_windows: state.limiter.len(),
        }
    }

    /// Entries physically present, dead or alive
    #[cfg(test)]
    pub(crate) async fn tracked_entries(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    #[cfg(test)]
    async fn set_attempts(&self, code: &str, attempts: u32) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.entries.get_mut(code) {
            entry.attempts = attempts;
        }
    }
}

fn require_field(name: &'static str, value: &str) -> PairingResult<()> {
    if value.is_empty() {
        return Err(PairingError::InvalidRequest(name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::code::{is_well_formed, CODE_MAX, CODE_MIN};
    use chrono::Duration;
    use std::collections::{HashSet, VecDeque};

    /// Replays a fixed list of candidates, repeating the last one
    struct ScriptedCodes(VecDeque<u32>);

    impl CodeSource for ScriptedCodes {
        fn next_code(&mut self) -> u32 {
            if self.0.len() > 1 {
                self.0.pop_front().unwrap()
            } else {
                *self.0.front().unwrap()
            }
        }
    }

    fn create_test_store() -> (PairingStore, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = PairingStore::with_clock(PairingConfig::default(), Arc::new(clock.clone()));
        (store, clock)
    }

    fn scripted_store(codes: &[u32]) -> (PairingStore, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = PairingStore::with_parts(
            PairingConfig::default(),
            Arc::new(clock.clone()),
            Box::new(ScriptedCodes(codes.iter().copied().collect())),
        );
        (store, clock)
    }

    #[tokio::test]
    async fn test_pairing_flow() {
        let (store, _clock) = create_test_store();

        let code = store.issue_code("tenant-1", "/proj", "agent").await.unwrap();
        assert!(is_well_formed(&code));
        let value: u32 = code.parse().unwrap();
        assert!((CODE_MIN..=CODE_MAX).contains(&value));

        let redemption = store.redeem_code(&code).await.unwrap();
        assert_eq!(redemption.tenant_id, "tenant-1");
        assert_eq!(redemption.resource, "/proj");
    }

    #[tokio::test]
    async fn test_example_scenario() {
        let (store, _clock) = scripted_store(&[482913]);

        let code = store.issue_code("tenant-1", "/proj", "agent").await.unwrap();
        assert_eq!(code, "482913");
        assert_eq!(
            store.redeem_code("482913").await,
            Ok(Redemption {
                tenant_id: "tenant-1".to_string(),
                resource: "/proj".to_string(),
            })
        );
        assert_eq!(
            store.redeem_code("482913").await,
            Err(PairingError::AlreadyUsed)
        );
    }

    #[tokio::test]
    async fn test_invalid_code() {
        let (store, _clock) = create_test_store();
        store.issue_code("tenant-1", "/proj", "agent").await.unwrap();

        let result = store.redeem_code("000000").await;
        assert_eq!(result, Err(PairingError::InvalidCode));
    }

    #[tokio::test]
    async fn test_unnormalized_code_is_not_found() {
        let (store, _clock) = scripted_store(&[482913]);
        store.issue_code("tenant-1", "/proj", "agent").await.unwrap();

        assert_eq!(
            store.redeem_code("482 913").await,
            Err(PairingError::InvalidCode)
        );
        assert!(store
            .redeem_code(&crate::normalize_code("482 913"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_expired_code() {
        let (store, clock) = create_test_store();
        let code = store.issue_code("tenant-1", "/proj", "agent").await.unwrap();

        clock.advance(Duration::seconds(301));
        assert_eq!(store.redeem_code(&code).await, Err(PairingError::Expired));
        // The expired entry is gone afterwards
        assert_eq!(store.redeem_code(&code).await, Err(PairingError::InvalidCode));
    }

    #[tokio::test]
    async fn test_code_valid_at_exact_deadline() {
        let (store, clock) = create_test_store();
        let code = store.issue_code("tenant-1", "/proj", "agent").await.unwrap();

        clock.advance(Duration::seconds(300));
        assert!(store.redeem_code(&code).await.is_ok());
    }

    #[tokio::test]
    async fn test_too_many_attempts() {
        let (store, _clock) = create_test_store();
        let code = store.issue_code("tenant-1", "/proj", "agent").await.unwrap();

        // Three lookups already counted against the entry
        store.set_attempts(&code, 3).await;
        assert_eq!(
            store.redeem_code(&code).await,
            Err(PairingError::TooManyAttempts)
        );
        assert_eq!(store.redeem_code(&code).await, Err(PairingError::InvalidCode));
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let (store, clock) = create_test_store();

        for i in 0..5 {
            store
                .issue_code("tenant-1", &format!("/proj/{}", i), "agent")
                .await
                .unwrap();
        }
        assert_eq!(
            store.issue_code("tenant-1", "/proj/5", "agent").await,
            Err(PairingError::RateLimited)
        );
        // Other sources are unaffected
        assert!(store.issue_code("tenant-1", "/proj", "ci").await.is_ok());

        clock.advance(Duration::seconds(60));
        assert!(store.issue_code("tenant-1", "/proj/6", "agent").await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limited_issue_creates_nothing() {
        let (store, _clock) = create_test_store();
        for _ in 0..5 {
            store.issue_code("tenant-1", "/proj", "agent").await.unwrap();
        }
        let before = store.tracked_entries().await;
        let _ = store.issue_code("tenant-1", "/proj", "agent").await;
        assert_eq!(store.tracked_entries().await, before);
    }

    #[tokio::test]
    async fn test_collision_regenerates() {
        let (store, _clock) = scripted_store(&[111111, 111111, 222222]);

        let first = store.issue_code("tenant-1", "/a", "agent").await.unwrap();
        let second = store.issue_code("tenant-2", "/b", "agent").await.unwrap();
        assert_eq!(first, "111111");
        assert_eq!(second, "222222");
    }

    #[tokio::test]
    async fn test_code_space_exhausted() {
        let (store, _clock) = scripted_store(&[123456]);

        store.issue_code("tenant-1", "/a", "agent").await.unwrap();
        assert_eq!(
            store.issue_code("tenant-2", "/b", "agent").await,
            Err(PairingError::CodeSpaceExhausted)
        );
        // The live entry still belongs to the first tenant
        let redemption = store.redeem_code("123456").await.unwrap();
        assert_eq!(redemption.tenant_id, "tenant-1");
    }

    #[tokio::test]
    async fn test_dead_entry_does_not_block_code() {
        let (store, clock) = scripted_store(&[123456]);

        store.issue_code("tenant-1", "/a", "agent").await.unwrap();
        clock.advance(Duration::seconds(301));

        let code = store.issue_code("tenant-2", "/b", "agent").await.unwrap();
        assert_eq!(code, "123456");
        let redemption = store.redeem_code(&code).await.unwrap();
        assert_eq!(redemption.tenant_id, "tenant-2");
    }

    #[tokio::test]
    async fn test_codes_unique_among_live_entries() {
        let config = PairingConfig::default().with_rate_limit_max(500);
        let store = PairingStore::new(config);

        let mut seen = HashSet::new();
        for i in 0..200 {
            let code = store
                .issue_code("tenant-1", &format!("/proj/{}", i), "agent")
                .await
                .unwrap();
            assert!(seen.insert(code));
        }
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let (store, _clock) = create_test_store();
        assert_eq!(
            store.issue_code("", "/proj", "agent").await,
            Err(PairingError::InvalidRequest("tenant_id"))
        );
        assert_eq!(
            store.issue_code("tenant-1", "", "agent").await,
            Err(PairingError::InvalidRequest("resource"))
        );
        assert_eq!(
            store.issue_code("tenant-1", "/proj", "").await,
            Err(PairingError::InvalidRequest("source"))
        );
        assert_eq!(store.stats().await.rate_windows, 0);
    }

    #[tokio::test]
    async fn test_whitespace_fields_are_opaque_values() {
        let (store, _clock) = create_test_store();
        let code = store.issue_code(" ", "  ", "agent").await.unwrap();

        let redemption = store.redeem_code(&code).await.unwrap();
        assert_eq!(redemption.tenant_id, " ");
        assert_eq!(redemption.resource, "  ");
    }

    #[tokio::test]
    async fn test_oversized_code_ttl_does_not_expire_codes() {
        let clock = ManualClock::starting_now();
        let config = PairingConfig::default().with_code_ttl_secs(u64::MAX);
        let store = PairingStore::with_clock(config, Arc::new(clock.clone()));

        let code = store.issue_code("tenant-1", "/proj", "agent").await.unwrap();
        assert!(store.expires_in(&code).await.unwrap() > 0);
        assert!(store.redeem_code(&code).await.is_ok());

        let huge = PairingConfig::default().with_code_ttl_secs(10_000_000_000_000_000);
        let store = PairingStore::with_clock(huge, Arc::new(clock));
        let code = store.issue_code("tenant-1", "/proj", "agent").await.unwrap();
        assert!(store.redeem_code(&code).await.is_ok());
    }

    #[tokio::test]
    async fn test_oversized_rate_window_still_limits() {
        let clock = ManualClock::starting_now();
        let config = PairingConfig::default().with_rate_limit_window_secs(u64::MAX);
        let store = PairingStore::with_clock(config, Arc::new(clock));

        let mut issued = 0;
        for i in 0..20 {
            if store
                .issue_code("tenant-1", &format!("/proj/{}", i), "agent")
                .await
                .is_ok()
            {
                issued += 1;
            }
        }
        assert_eq!(issued, 5);
    }

    #[tokio::test]
    async fn test_source_allow_list() {
        let clock = ManualClock::starting_now();
        let config = PairingConfig::default().with_allowed_sources(["claude-code"]);
        let store = PairingStore::with_clock(config, Arc::new(clock));

        assert_eq!(
            store.issue_code("tenant-1", "/proj", "browser").await,
            Err(PairingError::SourceNotAllowed("browser".to_string()))
        );
        assert!(store
            .issue_code("tenant-1", "/proj", "claude-code")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_stats_track_expiry() {
        let (store, clock) = create_test_store();

        store.issue_code("tenant-1", "/a", "agent").await.unwrap();
        clock.advance(Duration::seconds(120));
        store.issue_code("tenant-1", "/b", "agent").await.unwrap();
        assert_eq!(store.stats().await.active_count, 2);

        clock.advance(Duration::seconds(181));
        assert_eq!(store.stats().await.active_count, 1);

        clock.advance(Duration::seconds(120));
        let stats = store.stats().await;
        assert_eq!(stats.active_count, 0);
        assert_eq!(stats.rate_windows, 0);
    }

    #[tokio::test]
    async fn test_stats_exclude_used_entries() {
        let (store, _clock) = create_test_store();
        let code = store.issue_code("tenant-1", "/a", "agent").await.unwrap();
        store.issue_code("tenant-1", "/b", "agent").await.unwrap();

        store.redeem_code(&code).await.unwrap();
        assert_eq!(store.stats().await.active_count, 1);
    }

    #[tokio::test]
    async fn test_issue_sweeps_dead_entries() {
        let (store, clock) = create_test_store();
        let used = store.issue_code("tenant-1", "/a", "agent").await.unwrap();
        store.redeem_code(&used).await.unwrap();
        store.issue_code("tenant-1", "/b", "agent").await.unwrap();
        clock.advance(Duration::seconds(301));
        assert_eq!(store.tracked_entries().await, 1);

        store.issue_code("tenant-1", "/c", "agent").await.unwrap();
        assert_eq!(store.tracked_entries().await, 1);
    }

    #[tokio::test]
    async fn test_expires_in() {
        let (store, clock) = create_test_store();
        let code = store.issue_code("tenant-1", "/a", "agent").await.unwrap();

        assert_eq!(store.expires_in(&code).await, Some(300));
        clock.advance(Duration::seconds(100));
        assert_eq!(store.expires_in(&code).await, Some(200));

        // Checking status is not an attempt
        for _ in 0..5 {
            store.expires_in(&code).await;
        }
        assert!(store.redeem_code(&code).await.is_ok());
        assert_eq!(store.expires_in(&code).await, None);
        assert_eq!(store.expires_in("999999").await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemption_single_winner() {
        for _ in 0..20 {
            let (store, _clock) = create_test_store();
            let code = store.issue_code("tenant-1", "/proj", "agent").await.unwrap();

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    let code = code.clone();
                    tokio::spawn(async move { store.redeem_code(&code).await })
                })
                .collect();

            let mut successes = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => successes += 1,
                    Err(err) => assert!(matches!(
                        err,
                        PairingError::AlreadyUsed | PairingError::InvalidCode
                    )),
                }
            }
            assert_eq!(successes, 1);
        }
    }

    #[test]
    fn test_stats_serialization() {
        let stats = PairingStats {
            active_count: 2,
            rate_windows: 1,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["activeCount"], 2);
        assert_eq!(json["rateWindows"], 1);
    }
}
