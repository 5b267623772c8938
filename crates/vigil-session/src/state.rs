//! What a session persists: credentials and session timestamps.
//!
//! Everything lives in the shared [`KeyValueStore`] under the
//! [`StorageKey`] names, so every running instance sees the same values.
//! Instants are stored as epoch milliseconds.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use vigil_clock::saturating_add;
use vigil_io::{KeyValueStore, StorageKey, StoreError};
use vigil_token::UserInfo;

// ---------------------------------------------------------------------------
// Instants
// ---------------------------------------------------------------------------

/// Reads an instant. Unparsable values count as absent.
pub(crate) fn read_instant(
    store: &dyn KeyValueStore,
    key: StorageKey,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let Some(raw) = store.get(key.as_str())? else {
        return Ok(None);
    };
    let parsed = raw
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis);
    if parsed.is_none() {
        tracing::debug!(%key, "ignoring unparsable instant");
    }
    Ok(parsed)
}

pub(crate) fn write_instant(
    store: &dyn KeyValueStore,
    key: StorageKey,
    instant: DateTime<Utc>,
) -> Result<(), StoreError> {
    store.set(key.as_str(), &instant.timestamp_millis().to_string())
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// The signed-in user's token pair and the identity derived from it.
///
/// Written wholesale on login and on every refresh; never patched.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user_display_name: String,
    pub user_role: String,
    pub subject_id: String,
}

impl Credentials {
    /// Pairs tokens with the identity decoded from the access token.
    pub fn new(access_token: String, refresh_token: Option<String>, user: &UserInfo) -> Self {
        Self {
            access_token,
            refresh_token,
            user_display_name: user.display_name.clone(),
            user_role: user.primary_role.clone(),
            subject_id: user.subject_id.clone(),
        }
    }

    /// Loads the stored credentials. `None` if there is no access token.
    pub fn load(store: &dyn KeyValueStore) -> Result<Option<Self>, StoreError> {
        let Some(access_token) = store.get(StorageKey::AccessToken.as_str())? else {
            return Ok(None);
        };
        let text = |key: StorageKey| -> Result<String, StoreError> {
            Ok(store.get(key.as_str())?.unwrap_or_default())
        };
        Ok(Some(Self {
            access_token,
            refresh_token: store
                .get(StorageKey::RefreshToken.as_str())?
                .filter(|t| !t.is_empty()),
            user_display_name: text(StorageKey::UserDisplayName)?,
            user_role: text(StorageKey::UserRole)?,
            subject_id: text(StorageKey::UserSubjectId)?,
        }))
    }

    /// Writes every field. A `None` refresh token removes the stored one.
    ///
    /// The access token goes last: other instances treat an access token
    /// write as "credentials changed" and re-read the rest.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        match &self.refresh_token {
            Some(token) => store.set(StorageKey::RefreshToken.as_str(), token)?,
            None => store.remove(StorageKey::RefreshToken.as_str())?,
        }
        store.set(StorageKey::UserDisplayName.as_str(), &self.user_display_name)?;
        store.set(StorageKey::UserRole.as_str(), &self.user_role)?;
        store.set(StorageKey::UserSubjectId.as_str(), &self.subject_id)?;
        store.set(StorageKey::AccessToken.as_str(), &self.access_token)
    }

    /// Removes every credential key.
    pub fn clear(store: &dyn KeyValueStore) -> Result<(), StoreError> {
        for key in [
            StorageKey::AccessToken,
            StorageKey::RefreshToken,
            StorageKey::UserDisplayName,
            StorageKey::UserRole,
            StorageKey::UserSubjectId,
        ] {
            store.remove(key.as_str())?;
        }
        Ok(())
    }
}

// Tokens stay out of debug output.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("user_display_name", &self.user_display_name)
            .field("user_role", &self.user_role)
            .field("subject_id", &self.subject_id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionRecord
// ---------------------------------------------------------------------------

/// Session timestamps.
///
/// `deadline` is `started_at + timeout_window`, re-derived on every save.
/// It is a ceiling, not a countdown: the inactivity timeout is computed
/// from `last_activity_at` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Owned by [`ActivityTracker`](crate::ActivityTracker); `save` leaves
    /// it alone.
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// A record for a session started at `started_at`.
    pub fn new(
        started_at: DateTime<Utc>,
        timeout_window: Duration,
        last_activity_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            started_at,
            deadline: saturating_add(started_at, timeout_window),
            last_activity_at,
        }
    }

    /// Loads the record. `None` if no start instant is stored.
    ///
    /// A missing deadline is re-derived from `timeout_window`.
    pub fn load(
        store: &dyn KeyValueStore,
        timeout_window: Duration,
    ) -> Result<Option<Self>, StoreError> {
        let Some(started_at) = read_instant(store, StorageKey::SessionStartedAt)? else {
            return Ok(None);
        };
        let last_activity_at = read_instant(store, StorageKey::LastActivityAt)?;
        let record = match read_instant(store, StorageKey::SessionDeadline)? {
            Some(deadline) => Self {
                started_at,
                deadline,
                last_activity_at,
            },
            None => Self::new(started_at, timeout_window, last_activity_at),
        };
        Ok(Some(record))
    }

    /// Writes the start instant and deadline.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        write_instant(store, StorageKey::SessionStartedAt, self.started_at)?;
        write_instant(store, StorageKey::SessionDeadline, self.deadline)
    }

    /// Removes all three session timestamps.
    pub fn clear(store: &dyn KeyValueStore) -> Result<(), StoreError> {
        for key in [
            StorageKey::SessionStartedAt,
            StorageKey::SessionDeadline,
            StorageKey::LastActivityAt,
        ] {
            store.remove(key.as_str())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where a lifecycle is in its state machine.
///
/// ```text
/// Idle ──start()──→ Active ⇄ Warning ──timeout / refresh confirms expiry──→ Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Not started, or stopped.
    Idle,
    /// Running, user recently active.
    Active,
    /// Running, inside the warning window before the inactivity timeout.
    Warning,
    /// Torn down. Terminal for this instance.
    Expired,
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// No activity for longer than the timeout window.
    Inactivity,
    /// A refresh failed and the current token had already expired.
    TokenExpired,
    /// Another instance cleared the credentials.
    SignedOutElsewhere,
    /// [`destroy`](crate::SessionLifecycle::destroy) was called.
    Destroyed,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactivity => write!(f, "inactivity"),
            Self::TokenExpired => write!(f, "token-expired"),
            Self::SignedOutElsewhere => write!(f, "signed-out-elsewhere"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_io::MemoryStore;

    fn creds(refresh: Option<&str>) -> Credentials {
        Credentials {
            access_token: "a.b.c".into(),
            refresh_token: refresh.map(str::to_owned),
            user_display_name: "Ada".into(),
            user_role: "admin".into(),
            subject_id: "u-1".into(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_credentials_load_without_access_token_is_none() {
        let store = MemoryStore::new();
        store.set(StorageKey::RefreshToken.as_str(), "r").unwrap();

        assert_eq!(Credentials::load(&store).unwrap(), None);
    }

    #[test]
    fn test_credentials_save_without_refresh_token_removes_key() {
        let store = MemoryStore::new();
        creds(Some("r-1")).save(&store).unwrap();

        creds(None).save(&store).unwrap();

        assert_eq!(store.get(StorageKey::RefreshToken.as_str()).unwrap(), None);
        assert_eq!(Credentials::load(&store).unwrap(), Some(creds(None)));
    }

    #[test]
    fn test_credentials_clear_leaves_session_keys() {
        let store = MemoryStore::new();
        creds(Some("r-1")).save(&store).unwrap();
        write_instant(&store, StorageKey::LastActivityAt, at(100)).unwrap();

        Credentials::clear(&store).unwrap();

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_credentials_debug_redacts_tokens() {
        let shown = format!("{:?}", creds(Some("secret-refresh")));

        assert!(!shown.contains("a.b.c"));
        assert!(!shown.contains("secret-refresh"));
        assert!(shown.contains("Ada"));
    }

    #[test]
    fn test_session_record_deadline_is_start_plus_window() {
        let record = SessionRecord::new(at(1_000), Duration::from_secs(1_800), None);

        assert_eq!(record.deadline, at(2_800));
    }

    #[test]
    fn test_session_record_out_of_range_window_pins_deadline() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(10_000_000_000_000);

        let record = SessionRecord::new(at(1_000), window, None);
        record.save(&store).unwrap();

        assert_eq!(record.deadline, DateTime::<Utc>::MAX_UTC);
        let loaded = SessionRecord::load(&store, window).unwrap().unwrap();
        assert_eq!(loaded.started_at, at(1_000));
    }

    #[test]
    fn test_session_record_load_rederives_missing_deadline() {
        let store = MemoryStore::new();
        write_instant(&store, StorageKey::SessionStartedAt, at(1_000)).unwrap();
        write_instant(&store, StorageKey::LastActivityAt, at(1_500)).unwrap();

        let record = SessionRecord::load(&store, Duration::from_secs(60))
            .unwrap()
            .unwrap();

        assert_eq!(record.deadline, at(1_060));
        assert_eq!(record.last_activity_at, Some(at(1_500)));
    }

    #[test]
    fn test_session_record_unparsable_start_counts_as_absent() {
        let store = MemoryStore::new();
        store
            .set(StorageKey::SessionStartedAt.as_str(), "yesterday")
            .unwrap();

        assert_eq!(
            SessionRecord::load(&store, Duration::from_secs(60)).unwrap(),
            None
        );
    }

    #[test]
    fn test_session_record_clear_removes_activity_too() {
        let store = MemoryStore::new();
        SessionRecord::new(at(1_000), Duration::from_secs(60), None)
            .save(&store)
            .unwrap();
        write_instant(&store, StorageKey::LastActivityAt, at(1_010)).unwrap();

        SessionRecord::clear(&store).unwrap();

        assert!(store.is_empty());
    }
}
