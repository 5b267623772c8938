//! The persistent key/value store seam.

use std::fmt;

use tokio::sync::broadcast;

use crate::StoreError;

/// Identifies one running instance attached to a shared store.
///
/// Two [`MemoryStore`](crate::MemoryStore) handles created with
/// `sibling()` share data but have different ids, the way two browser
/// tabs share local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Creates an `InstanceId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

/// A single write observed on the shared store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// Key that changed.
    pub key: String,
    /// New value, or `None` if the key was removed.
    pub value: Option<String>,
    /// Instance that made the write.
    pub origin: InstanceId,
}

/// A string key/value store shared by every running instance.
///
/// Read-then-write, not transactional. The session layer tolerates lost
/// updates between instances because every field it stores can be
/// re-derived.
///
/// # Trait bounds
///
/// - `Send + Sync` → the store is read from timer tasks, which Tokio may
///   run on any worker thread.
/// - Object safe → the session layer holds it as `Arc<dyn KeyValueStore>`.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Reads a key. `Ok(None)` if it is not set.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a key, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Subscribes to writes made by *other* instances.
    ///
    /// Optional: the session layer works without it, it only reacts
    /// faster to another instance's refresh or logout. Defaults to `None`.
    fn watch(&self) -> Option<StoreWatcher> {
        None
    }
}

/// Stream of [`StoreChange`]s made by other instances.
pub struct StoreWatcher {
    receiver: broadcast::Receiver<StoreChange>,
    own: InstanceId,
}

impl StoreWatcher {
    /// Creates a watcher that skips changes originating from `own`.
    pub fn new(receiver: broadcast::Receiver<StoreChange>, own: InstanceId) -> Self {
        Self { receiver, own }
    }

    /// Waits for the next change made by another instance.
    ///
    /// Returns `None` once the store is gone. If this watcher fell behind
    /// and missed changes, it logs how many and carries on; the session
    /// layer re-reads the store on every timer tick anyway.
    pub async fn next(&mut self) -> Option<StoreChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.origin == self.own => continue,
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(instance = %self.own, missed, "store watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
