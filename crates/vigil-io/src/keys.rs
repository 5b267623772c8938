//! The fixed set of keys the session layer reads and writes.

use std::fmt;

/// A persisted key.
///
/// Names are namespaced so the console can share a store (e.g. browser
/// local storage) with unrelated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    SessionStartedAt,
    SessionDeadline,
    LastActivityAt,
    AccessToken,
    RefreshToken,
    UserRole,
    UserDisplayName,
    UserSubjectId,
}

impl StorageKey {
    /// Every key, in a stable order.
    pub const ALL: [StorageKey; 8] = [
        Self::SessionStartedAt,
        Self::SessionDeadline,
        Self::LastActivityAt,
        Self::AccessToken,
        Self::RefreshToken,
        Self::UserRole,
        Self::UserDisplayName,
        Self::UserSubjectId,
    ];

    /// The stored key name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionStartedAt => "vigil.session_started_at",
            Self::SessionDeadline => "vigil.session_deadline",
            Self::LastActivityAt => "vigil.last_activity_at",
            Self::AccessToken => "vigil.access_token",
            Self::RefreshToken => "vigil.refresh_token",
            Self::UserRole => "vigil.user_role",
            Self::UserDisplayName => "vigil.user_name",
            Self::UserSubjectId => "vigil.user_id",
        }
    }

    /// Looks a key up by its stored name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_storage_key_names_are_unique() {
        let names: HashSet<_> = StorageKey::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), StorageKey::ALL.len());
    }

    #[test]
    fn test_storage_key_from_name_resolves_every_key() {
        for key in StorageKey::ALL {
            assert_eq!(StorageKey::from_name(key.as_str()), Some(key));
        }
        assert_eq!(StorageKey::from_name("vigil.unknown"), None);
    }
}
