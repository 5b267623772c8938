//! Clock sources and session timers for Vigil.
//!
//! Two kinds of time live here:
//!
//! - **Wall-clock instants** ([`Clock`]): what tokens and persisted
//!   timestamps are expressed in. Always injected, never read ad hoc, so
//!   every expiry and timeout boundary can be tested deterministically.
//! - **Timers** ([`SessionClock`]): the three per-instance timers that
//!   drive a session: the periodic timeout check, the periodic heartbeat,
//!   and the one-shot refresh. Built on Tokio's timer wheel.
//!
//! # Integration
//!
//! The session lifecycle implements [`TimerTarget`] and owns a
//! `SessionClock` pointing back at itself:
//!
//! ```ignore
//! let lifecycle = Arc::new_cyclic(|weak| Lifecycle {
//!     timers: SessionClock::new(weak.clone(), ClockConfig::default()),
//!     /* ... */
//! });
//! lifecycle.timers.start(refresh_delay(expires_at, now, margin));
//! ```
//!
//! Timers only hold a `Weak` reference, so dropping the owner stops them.

#![allow(async_fn_in_trait)]

mod clock;
mod scheduler;

pub use clock::{refresh_delay, saturating_add, Clock, ManualClock, MonotonicClock, SystemClock};
pub use scheduler::{ArmedTimers, ClockConfig, SessionClock, TimerKind, TimerTarget};
