//! Codepair Auth - Single-use pairing codes
//!
//! A trusted agent issues a short-lived 6-digit code; a plugin redeems it
//! exactly once to learn which tenant and resource it has been paired with.
//!
//! # Pairing Flow
//!
//! 1. Agent calls `PairingStore::issue_code()` with its tenant, resource and source tag
//! 2. The code is shown to the human as `XXX XXX`
//! 3. The plugin normalizes the typed code and calls `PairingStore::redeem_code()`
//! 4. On success the plugin mints its own credential and records a session
//!
//! Codes expire after 5 minutes, are single-use, and each source may issue at
//! most 5 codes per minute.
//!
//! # Example
//!
//! ```no_run
//! use codepair_auth::{normalize_code, PairingStore, SessionRegistry};
//! use codepair_core::PairingConfig;
//!
//! async fn example() {
//!     let config = PairingConfig::default();
//!     let store = PairingStore::new(config.clone());
//!     let sessions = SessionRegistry::new(&config);
//!
//!     let code = store.issue_code("tenant-1", "/proj", "agent").await.unwrap();
//!     println!("Enter code in plugin: {}", codepair_auth::format_code(&code));
//!
//!     // Later, in the plugin
//!     let typed = "482 913";
//!     if let Ok(redemption) = store.redeem_code(&normalize_code(typed)).await {
//!         let session = sessions.open(&redemption).await;
//!         println!("Paired session {}", session.id);
//!     }
//! }
//! ```

pub mod clock;
pub mod code;
pub mod entry;
pub mod error;
pub mod rate_limit;
pub mod reaper;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{format_code, is_well_formed, normalize_code, CodeSource, RandomCodes};
pub use entry::{PairingEntry, Redemption};
pub use error::{PairingError, PairingResult, SessionError, SessionResult};
pub use rate_limit::{RateDecision, RateLimiter, RateWindow};
pub use reaper::{Reaper, ReaperHandle};
pub use session::{Session, SessionId, SessionRegistry};
pub use store::{PairingStats, PairingStore};
