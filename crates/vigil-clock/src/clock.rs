//! Wall-clock sources.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// A source of the current wall-clock instant.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. For tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jumps to `instant` (backwards is allowed).
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = saturating_add(*now, by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wall-clock anchor plus elapsed monotonic time.
///
/// Reads `anchor + (tokio::time::Instant::now() - origin)`. Two useful
/// consequences:
///
/// - Immune to wall-clock jumps (NTP corrections, manual changes) after
///   the anchor is taken.
/// - Follows Tokio's paused test clock, so `tokio::time::advance` moves
///   timers *and* instants together.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor: DateTime<Utc>,
    origin: Instant,
}

impl MonotonicClock {
    /// Anchors at the current system time.
    pub fn new() -> Self {
        Self::anchored(Utc::now())
    }

    /// Anchors at `anchor`. The clock reads `anchor` right now.
    pub fn anchored(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        saturating_add(self.anchor, self.origin.elapsed())
    }
}

/// Delay before a refresh should fire: `expires_at − now − margin`,
/// saturating at zero.
///
/// Zero means "as soon as possible", never "don't bother".
pub fn refresh_delay(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    margin: Duration,
) -> Duration {
    let Some(due) = TimeDelta::from_std(margin)
        .ok()
        .and_then(|margin| expires_at.checked_sub_signed(margin))
    else {
        return Duration::ZERO;
    };
    (due - now).to_std().unwrap_or(Duration::ZERO)
}

/// `instant + by`, pinned to the latest representable instant on overflow.
pub fn saturating_add(instant: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| instant.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
