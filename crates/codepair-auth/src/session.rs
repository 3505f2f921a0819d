//! Sessions opened after a successful pairing
//!
//! The signed credential handed to the plugin is minted elsewhere and carries
//! a [`SessionId`]; this registry only tracks which sessions exist and when
//! they were last seen.

use crate::clock::{Clock, SystemClock};
use crate::entry::Redemption;
use crate::error::{SessionError, SessionResult};
use chrono::{DateTime, Duration, Utc};
use codepair_core::PairingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Unique identifier for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A session opened by a plugin after redeeming a code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Tenant the redeemed code was bound to
    pub tenant_id: String,
    /// Resource the redeemed code was bound to
    pub resource: String,
    pub created_at: DateTime<Utc>,
    /// Last keep-alive from the plugin
    pub last_ping: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Seconds left before expiry, zero once expired
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// Tracks live sessions in memory
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    /// Create a registry using the system clock
    pub fn new(config: &PairingConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry reading time from `clock`
    pub fn with_clock(config: &PairingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: config.session_ttl(),
            clock,
        }
    }

    /// Open a session for a redeemed pairing
    pub async fn open(&self, redemption: &Redemption) -> Session {
        let now = self.clock.now();
        let session = Session {
            id: SessionId::new(),
            tenant_id: redemption.tenant_id.clone(),
            resource: redemption.resource.clone(),
            created_at: now,
            last_ping: now,
            expires_at: now + self.ttl,
        };

        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());

        info!("Opened session {} for tenant {}", session.id, session.tenant_id);
        session
    }

    /// Record a keep-alive, returning seconds until the session expires
    pub async fn ping(&self, id: &SessionId) -> SessionResult<i64> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;

        let Some(session) = sessions.get_mut(id) else {
            return Err(SessionError::NotFound(id.to_string()));
        };

        if session.is_expired(now) {
            sessions.remove(id);
            debug!("Session {} expired", id);
            return Err(SessionError::NotFound(id.to_string()));
        }

        session.last_ping = now;
        Ok(session.remaining_secs(now))
    }

    /// Look up a live session
    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        let now = self.clock.now();
        let sessions = self.sessions.read().await;
        sessions.get(id).filter(|s| !s.is_expired(now)).cloned()
    }

    /// Close a session, returning whether it existed
    pub async fn close(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!("Closed session {}", id);
        }
        removed
    }

    /// Remove expired sessions, returning how many were removed
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        before - sessions.len()
    }

    /// Number of live sessions
    pub async fn active_count(&self) -> usize {
        self.sweep().await;
        self.sessions.read().await.len()
    }
}
