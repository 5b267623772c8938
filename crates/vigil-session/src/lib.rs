//! Session lifecycle management for Vigil.
//!
//! This crate keeps a console user signed in for exactly as long as they
//! should be:
//!
//! 1. **Activity**: when the user last interacted ([`ActivityTracker`])
//! 2. **Refresh**: replacing the access token before it expires, but
//!    only for active users ([`RefreshCoordinator`])
//! 3. **Lifecycle**: timers, warnings, expiry, and the logout redirect
//!    ([`SessionLifecycle`], the only type most applications touch)
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← calls SessionLifecycle, implements SessionHooks
//!     ↕
//! Session Layer (this crate)  ← decides when to refresh and when to log out
//!     ↕
//! vigil-token / vigil-io / vigil-clock (below)  ← decode, persist, schedule
//! ```
//!
//! # Failure policy
//!
//! Only two things ever reach the user: the "expiring soon" warning
//! ([`SessionHooks::on_warning`]) and the redirect to login on real
//! expiry ([`SessionHooks::go_to_login`]). A refresh that fails while the
//! current token is still valid is retried quietly.

mod activity;
mod config;
mod error;
mod hooks;
mod lifecycle;
mod refresh;
mod state;

pub use activity::ActivityTracker;
pub use config::SessionConfig;
pub use error::{ConfigError, RefreshFailure, SessionError};
pub use hooks::SessionHooks;
pub use lifecycle::SessionLifecycle;
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use state::{Credentials, ExpiryReason, SessionPhase, SessionRecord};
