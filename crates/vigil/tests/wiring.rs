//! Wiring tests through the meta crate's prelude.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::DateTime;
use vigil::prelude::*;
use vigil::{ManualClock, StorageKey};

/// `{"alg":"none"}` . `{"exp":1700003600,"sub":"u-7","name":"Ada","roles":["ROLE_AUDITOR"]}`
const TOKEN: &str = "eyJhbGciOiJub25lIn0.\
    eyJleHAiOjE3MDAwMDM2MDAsInN1YiI6InUtNyIsIm5hbWUiOiJBZGEiLCJyb2xlcyI6WyJST0xFX0FVRElUT1IiXX0.\
    sig";

struct Unreachable;

impl RefreshEndpoint for Unreachable {
    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshResponse, RefreshError> {
        Err(RefreshError::Network("unreachable".into()))
    }
}

#[derive(Default)]
struct CountingHooks {
    logins: AtomicUsize,
}

impl SessionHooks for CountingHooks {
    fn go_to_login(&self, _return_path: Option<String>) {
        self.logins.fetch_add(1, Ordering::SeqCst);
    }
}

fn session(
    store: Arc<MemoryStore>,
    hooks: Arc<CountingHooks>,
) -> SessionLifecycle<Unreachable> {
    let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    SessionLifecycle::new(
        SessionConfig::default(),
        store,
        Unreachable,
        Arc::new(clock),
        hooks,
    )
}

fn start_without_login(session: &SessionLifecycle<Unreachable>) -> Result<(), VigilError> {
    session.start()?;
    Ok(())
}

#[tokio::test]
async fn test_start_without_login_surfaces_as_vigil_error() {
    let session = session(Arc::new(MemoryStore::new()), Arc::default());

    let err = start_without_login(&session).unwrap_err();

    assert!(matches!(err, VigilError::Session(SessionError::NoCredentials)));
}

#[tokio::test]
async fn test_login_then_logout_through_prelude() {
    let store = Arc::new(MemoryStore::new());
    let hooks = Arc::new(CountingHooks::default());
    let session = session(Arc::clone(&store), Arc::clone(&hooks));

    session.begin(TOKEN, Some("refresh-1")).unwrap();

    assert_eq!(session.phase(), SessionPhase::Active);
    let user = session.user().unwrap();
    assert_eq!(user.display_name, "Ada");
    assert_eq!(user.primary_role, "auditor");
    assert_eq!(
        store.get(StorageKey::UserSubjectId.as_str()).unwrap().as_deref(),
        Some("u-7")
    );

    session.destroy();

    assert_eq!(hooks.logins.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
}
