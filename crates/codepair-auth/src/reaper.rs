//! Background sweep of dead pairing entries and expired sessions
//!
//! Issuance and stats already sweep inline; the reaper bounds how long a dead
//! entry can linger when neither is called.

use crate::session::SessionRegistry;
use crate::store::PairingStore;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodic sweeper for a [`PairingStore`] and optionally a [`SessionRegistry`]
pub struct Reaper {
    store: PairingStore,
    sessions: Option<SessionRegistry>,
    interval: Duration,
}

/// Handle to a running reaper
///
/// Dropping the handle closes the shutdown channel, which wakes the task and
/// ends the loop without waiting for the next tick.
pub struct ReaperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Reaper {
    /// Create a reaper sweeping `store` every `interval`
    pub fn new(store: PairingStore, interval: Duration) -> Self {
        Self {
            store,
            sessions: None,
            interval,
        }
    }

    /// Also sweep expired sessions
    pub fn with_sessions(mut self, sessions: SessionRegistry) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Spawn the sweep loop on the current tokio runtime
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let Reaper {
            store,
            sessions,
            interval,
        } = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let codes = store.sweep().await;
                        let expired_sessions = match &sessions {
                            Some(registry) => registry.sweep().await,
                            None => 0,
                        };
                        if codes > 0 || expired_sessions > 0 {
                            debug!(
                                "Reaped {} pairing entries and {} sessions",
                                codes, expired_sessions
                            );
                        }
                    }
                }
            }

            debug!("Reaper stopped");
        });

        info!("Reaper started with {:?} interval", interval);
        ReaperHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

impl ReaperHandle {
    /// Stop the reaper and wait for it to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        report_exit((&mut self.task).await);
    }

    /// Whether the sweep loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Log how the sweep loop ended, returning whether it exited normally
fn report_exit(result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_panic() => {
            warn!("Reaper task panicked: {}", e);
            false
        }
        Err(e) => {
            debug!("Reaper task cancelled: {}", e);
            false
        }
    }
}
