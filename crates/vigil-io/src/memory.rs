//! In-memory store shared between sibling instances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::{InstanceId, KeyValueStore, StoreChange, StoreError, StoreWatcher};

/// Change feed capacity. A watcher more than this many writes behind
/// skips ahead (see [`StoreWatcher::next`]).
const CHANGE_CHANNEL_SIZE: usize = 64;

struct Backing {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
    next_instance: AtomicU64,
}

/// A [`KeyValueStore`] held in process memory.
///
/// Every handle is one *instance*. Use [`sibling`](Self::sibling) to
/// attach another instance to the same data, e.g. to run two session
/// lifecycles side by side the way two tabs would.
pub struct MemoryStore {
    backing: Arc<Backing>,
    instance: InstanceId,
}

impl MemoryStore {
    /// Creates an empty store with a single instance attached.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        let backing = Arc::new(Backing {
            entries: Mutex::new(HashMap::new()),
            changes,
            next_instance: AtomicU64::new(1),
        });
        Self::attach(backing)
    }

    /// Attaches a new instance to the same data.
    pub fn sibling(&self) -> Self {
        Self::attach(Arc::clone(&self.backing))
    }

    /// This handle's instance id.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Number of keys currently set.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if no keys are set.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn attach(backing: Arc<Backing>) -> Self {
        let instance = InstanceId::new(backing.next_instance.fetch_add(1, Ordering::Relaxed));
        Self { backing, instance }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.backing
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, key: &str, value: Option<&str>) {
        // No receivers is fine: nobody is watching.
        let _ = self.backing.changes.send(StoreChange {
            key: key.to_owned(),
            value: value.map(str::to_owned),
            origin: self.instance,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries().insert(key.to_owned(), value.to_owned());
        self.publish(key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let existed = self.entries().remove(key).is_some();
        if existed {
            self.publish(key, None);
        }
        Ok(())
    }

    fn watch(&self) -> Option<StoreWatcher> {
        Some(StoreWatcher::new(
            self.backing.changes.subscribe(),
            self.instance,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get_returns_value() {
        let store = MemoryStore::new();

        store.set("k", "v").unwrap();

        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_absent_key_is_ok() {
        let store = MemoryStore::new();

        assert!(store.remove("missing").is_ok());
        assert!(store.is_empty());
    }

    #[test]
    fn test_sibling_shares_data_with_distinct_identity() {
        let tab_a = MemoryStore::new();
        let tab_b = tab_a.sibling();

        tab_a.set("k", "from-a").unwrap();

        assert_eq!(tab_b.get("k").unwrap().as_deref(), Some("from-a"));
        assert_ne!(tab_a.instance(), tab_b.instance());
    }

    #[tokio::test]
    async fn test_watch_sees_sibling_writes_but_not_own() {
        let tab_a = MemoryStore::new();
        let tab_b = tab_a.sibling();
        let mut watcher = tab_a.watch().expect("memory store supports watch");

        tab_a.set("own", "ignored").unwrap();
        tab_b.set("theirs", "seen").unwrap();
        tab_b.remove("theirs").unwrap();

        let first = watcher.next().await.unwrap();
        assert_eq!(first.key, "theirs");
        assert_eq!(first.value.as_deref(), Some("seen"));
        assert_eq!(first.origin, tab_b.instance());

        let second = watcher.next().await.unwrap();
        assert_eq!(second.key, "theirs");
        assert_eq!(second.value, None);
    }
}
