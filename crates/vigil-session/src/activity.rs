//! User activity tracking.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;
use vigil_io::{KeyValueStore, StorageKey, StoreError};

use crate::state::{read_instant, write_instant};

/// Records when the user last interacted, and answers "recently active?".
///
/// The timestamp lives in the shared store, so activity in any instance
/// keeps every instance's session alive. The tracker never does I/O
/// beyond that one key; callers poll it.
#[derive(Clone)]
pub struct ActivityTracker {
    store: Arc<dyn KeyValueStore>,
}

impl ActivityTracker {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Overwrites the last-activity instant with `now`.
    pub fn record_activity(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        write_instant(self.store.as_ref(), StorageKey::LastActivityAt, now)
    }

    /// The last recorded activity, if any.
    pub fn last_activity(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        read_instant(self.store.as_ref(), StorageKey::LastActivityAt)
    }

    /// Time since the last recorded activity. `None` if nothing was ever
    /// recorded (or the store could not be read).
    ///
    /// A last-activity instant later than `now`, written by an instance
    /// whose clock runs ahead, counts as zero elapsed.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = match self.last_activity() {
            Ok(last) => last?,
            Err(e) => {
                warn!(error = %e, "could not read last activity");
                return None;
            }
        };
        Some((now - last).to_std().unwrap_or(Duration::ZERO))
    }

    /// Returns `true` if activity was recorded within `threshold` of `now`.
    /// Never-recorded activity is inactive.
    pub fn is_active(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.idle_for(now).is_some_and(|idle| idle <= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use vigil_io::MemoryStore;

    fn tracker() -> ActivityTracker {
        ActivityTracker::new(Arc::new(MemoryStore::new()))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    const FIVE_MIN: Duration = Duration::from_secs(300);

    #[test]
    fn test_is_active_never_recorded_returns_false() {
        assert!(!tracker().is_active(t0(), FIVE_MIN));
    }

    #[test]
    fn test_is_active_tracks_threshold_boundary() {
        let tracker = tracker();
        tracker.record_activity(t0()).unwrap();

        for (offset, expected) in [(0, true), (299, true), (300, true), (301, false), (3600, false)] {
            let t2 = t0() + TimeDelta::seconds(offset);
            assert_eq!(
                tracker.is_active(t2, FIVE_MIN),
                expected,
                "t2 - t1 = {offset}s"
            );
        }
    }

    #[test]
    fn test_record_activity_overwrites_previous() {
        let tracker = tracker();
        tracker.record_activity(t0()).unwrap();
        let later = t0() + TimeDelta::minutes(20);

        tracker.record_activity(later).unwrap();

        assert_eq!(tracker.last_activity().unwrap(), Some(later));
        assert!(tracker.is_active(later + TimeDelta::minutes(1), FIVE_MIN));
    }

    #[test]
    fn test_idle_for_future_activity_counts_as_zero() {
        let tracker = tracker();
        tracker.record_activity(t0() + TimeDelta::seconds(30)).unwrap();

        assert_eq!(tracker.idle_for(t0()), Some(Duration::ZERO));
        assert!(tracker.is_active(t0(), Duration::ZERO));
    }

    #[test]
    fn test_activity_is_shared_between_sibling_instances() {
        let tab_a = MemoryStore::new();
        let tab_b = tab_a.sibling();
        let a = ActivityTracker::new(Arc::new(tab_a));
        let b = ActivityTracker::new(Arc::new(tab_b));

        a.record_activity(t0()).unwrap();

        assert!(b.is_active(t0() + TimeDelta::seconds(10), FIVE_MIN));
    }
}
