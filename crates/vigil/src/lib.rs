//! # Vigil
//!
//! Client-side session and token lifecycle management for a compliance
//! console.
//!
//! Vigil keeps a signed-in user's access token fresh while they work,
//! stops refreshing while they are away, warns them before an inactivity
//! timeout, and redirects to login exactly once when the session is over.
//! The application implements [`SessionHooks`] and feeds user activity
//! into a [`SessionLifecycle`]; everything else runs on timers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil::prelude::*;
//!
//! struct Redirect;
//!
//! impl SessionHooks for Redirect {
//!     fn go_to_login(&self, return_path: Option<String>) {
//!         println!("to login, then back to {return_path:?}");
//!     }
//! }
//!
//! # async fn run(access: &str, refresh: &str) -> Result<(), VigilError> {
//! vigil::telemetry::init("info");
//!
//! let session = SessionLifecycle::new(
//!     SessionConfig::from_env()?,
//!     Arc::new(FileStore::new("/var/lib/console/session.json")),
//!     HttpRefreshEndpoint::from_env()?,
//!     Arc::new(SystemClock),
//!     Arc::new(Redirect),
//! );
//! session.begin(access, Some(refresh))?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod telemetry;

pub use error::VigilError;

pub use vigil_clock::{Clock, ClockConfig, ManualClock, MonotonicClock, SystemClock};
pub use vigil_io::{
    FileStore, HttpRefreshEndpoint, KeyValueStore, MemoryStore, RefreshEndpoint, RefreshError,
    RefreshResponse, StorageKey, StoreError,
};
pub use vigil_session::{
    ActivityTracker, ConfigError, Credentials, ExpiryReason, RefreshCoordinator,
    RefreshFailure, RefreshOutcome, SessionConfig, SessionError, SessionHooks, SessionLifecycle,
    SessionPhase, SessionRecord,
};
pub use vigil_token::{DecodedToken, RolePolicy, TokenCodec, TokenError, UserInfo};

/// Everything an application needs to wire up a session.
pub mod prelude {
    pub use crate::VigilError;
    pub use vigil_clock::{Clock, MonotonicClock, SystemClock};
    pub use vigil_io::{
        FileStore, HttpRefreshEndpoint, KeyValueStore, MemoryStore, RefreshEndpoint,
        RefreshError, RefreshResponse,
    };
    pub use vigil_session::{
        RefreshOutcome, SessionConfig, SessionError, SessionHooks, SessionLifecycle,
        SessionPhase,
    };
    pub use vigil_token::{TokenCodec, UserInfo};
}
