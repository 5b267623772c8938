//! The session lifecycle: the one type the application talks to.
//!
//! ```text
//!            start()                       timeout check: idle > timeout
//!   Idle ───────────────→ Active ⇄ Warning ─────────────────────────────→ Expired
//!     ↑                     │                refresh failed + token expired   │
//!     └──── stop() ─────────┘                destroy() / signed out elsewhere │
//!                                                                             ▼
//!                                              timers cancelled, store cleared,
//!                                              go_to_login() called once
//! ```
//!
//! One lifecycle per running instance (tab, process). Instances share
//! state only through the [`KeyValueStore`]; when the store offers a
//! change feed, an instance follows the others' refreshes and sign-outs
//! without waiting for its own timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use vigil_clock::{refresh_delay, ArmedTimers, Clock, SessionClock, TimerTarget};
use vigil_io::{KeyValueStore, RefreshEndpoint, StorageKey, StoreChange};
use vigil_token::{TokenCodec, UserInfo};

use crate::{
    ActivityTracker, Credentials, ExpiryReason, RefreshCoordinator, RefreshOutcome,
    SessionConfig, SessionError, SessionHooks, SessionPhase, SessionRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Expired,
}

/// Whether a refresh goes through the activity gate.
#[derive(Debug, Clone, Copy)]
enum Gate {
    /// Timer-driven: inactive users are deferred.
    Activity,
    /// The user asked to stay signed in.
    Bypass,
}

/// Drives one instance's session: timers, activity, refresh, expiry.
///
/// A cheap-to-clone handle. Timers and the store watcher only hold weak
/// references, so dropping the last handle stops everything.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use vigil_clock::SystemClock;
/// use vigil_io::{HttpRefreshEndpoint, MemoryStore};
/// use vigil_session::{SessionConfig, SessionHooks, SessionLifecycle};
///
/// struct Redirect;
///
/// impl SessionHooks for Redirect {
///     fn go_to_login(&self, return_path: Option<String>) {
///         println!("redirecting to login (return to {return_path:?})");
///     }
/// }
///
/// # async fn run(access: &str, refresh: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let endpoint = HttpRefreshEndpoint::new("https://auth.example.com/".parse()?)?;
/// let session = SessionLifecycle::new(
///     SessionConfig::default(),
///     Arc::new(MemoryStore::new()),
///     endpoint,
///     Arc::new(SystemClock),
///     Arc::new(Redirect),
/// );
///
/// session.begin(access, Some(refresh))?;
/// session.record_activity(); // on every user interaction
/// # Ok(())
/// # }
/// ```
pub struct SessionLifecycle<R: RefreshEndpoint> {
    shared: Arc<Shared<R>>,
}

impl<R: RefreshEndpoint> Clone for SessionLifecycle<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<R: RefreshEndpoint> {
    this: Weak<Shared<R>>,
    config: SessionConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    codec: TokenCodec,
    activity: ActivityTracker,
    coordinator: RefreshCoordinator<R>,
    hooks: Arc<dyn SessionHooks>,
    timers: SessionClock<Shared<R>>,
    state: Mutex<RunState>,
    /// Set once the warning hook fired; cleared by new activity.
    warned: AtomicBool,
    /// Set while a refresh call is in flight.
    refreshing: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<R: RefreshEndpoint> SessionLifecycle<R> {
    /// Creates an idle lifecycle. `config` is [validated] first.
    ///
    /// [validated]: SessionConfig::validated
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn KeyValueStore>,
        endpoint: R,
        clock: Arc<dyn Clock>,
        hooks: Arc<dyn SessionHooks>,
    ) -> Self {
        let config = config.validated();
        let shared = Arc::new_cyclic(|this: &Weak<Shared<R>>| Shared {
            this: this.clone(),
            timers: SessionClock::new(this.clone(), config.clock_config()),
            codec: TokenCodec::new(config.role_policy()),
            activity: ActivityTracker::new(Arc::clone(&store)),
            coordinator: RefreshCoordinator::new(
                endpoint,
                Arc::clone(&store),
                Arc::clone(&clock),
                config.clone(),
            ),
            store,
            clock,
            hooks,
            config,
            state: Mutex::new(RunState::Idle),
            warned: AtomicBool::new(false),
            refreshing: AtomicBool::new(false),
            watcher: Mutex::new(None),
        });
        Self { shared }
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Signs in with a fresh token pair, then [`start`](Self::start)s.
    ///
    /// Any previous session timestamps are discarded; this is a new
    /// session, not a resumed one.
    ///
    /// # Errors
    /// - [`SessionError::Terminated`] if this instance already expired.
    /// - [`SessionError::Token`] if `access_token` cannot be decoded.
    /// - [`SessionError::Store`] if persisting fails.
    pub fn begin(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), SessionError> {
        let shared = &self.shared;
        if shared.state() == RunState::Expired {
            return Err(SessionError::Terminated);
        }
        let user = shared.codec.extract_user_info(access_token)?;

        SessionRecord::clear(shared.store.as_ref())?;
        Credentials::new(
            access_token.to_owned(),
            refresh_token.map(str::to_owned),
            &user,
        )
        .save(shared.store.as_ref())?;
        info!(subject = %user.subject_id, role = %user.primary_role, "signed in");

        self.start()
    }

    /// Starts (or resumes) the session from the stored credentials.
    ///
    /// Keeps a previously stored start instant, so a reload resumes the
    /// same session. Records activity, then arms the timers with the
    /// refresh due `refresh_margin` before the access token expires (at
    /// once if the token is unreadable). Calling it again re-arms.
    ///
    /// # Errors
    /// - [`SessionError::Terminated`] if this instance already expired.
    /// - [`SessionError::NoCredentials`] if no access token is stored.
    /// - [`SessionError::Store`] if the store fails.
    pub fn start(&self) -> Result<(), SessionError> {
        let shared = &self.shared;
        if shared.state() == RunState::Expired {
            return Err(SessionError::Terminated);
        }
        let credentials =
            Credentials::load(shared.store.as_ref())?.ok_or(SessionError::NoCredentials)?;

        let now = shared.clock.now();
        let window = shared.config.timeout_window;
        let started_at = SessionRecord::load(shared.store.as_ref(), window)?
            .map(|record| record.started_at)
            .filter(|started_at| *started_at <= now)
            .unwrap_or(now);
        SessionRecord::new(started_at, window, None).save(shared.store.as_ref())?;
        shared.activity.record_activity(now)?;
        shared.warned.store(false, Ordering::SeqCst);

        {
            let mut state = shared.lock_state();
            if *state == RunState::Expired {
                return Err(SessionError::Terminated);
            }
            *state = RunState::Running;
        }

        let refresh_in = shared.refresh_delay_for(&credentials.access_token, now);
        shared.timers.start(refresh_in);
        shared.spawn_watcher();

        info!(
            subject = %credentials.subject_id,
            role = %credentials.user_role,
            resumed = started_at < now,
            refresh_in_secs = refresh_in.as_secs(),
            "session started"
        );
        Ok(())
    }

    /// Records a user interaction. Cheap; call it on every input event.
    pub fn record_activity(&self) {
        self.shared.record_activity();
    }

    /// Returns `true` if the running session has been idle longer than the
    /// timeout window. `false` when not running.
    pub fn check_timeout(&self) -> bool {
        self.shared.timed_out(self.shared.clock.now())
    }

    /// Returns `true` if the running session is inside the warning window.
    pub fn should_show_warning(&self) -> bool {
        self.shared.warning_due(self.shared.clock.now())
    }

    /// Time until the inactivity timeout. `None` when not running.
    pub fn time_remaining(&self) -> Option<Duration> {
        let shared = &self.shared;
        shared
            .is_running()
            .then(|| shared.remaining(shared.clock.now()))
    }

    /// Where the lifecycle is in its state machine.
    pub fn phase(&self) -> SessionPhase {
        match self.shared.state() {
            RunState::Idle => SessionPhase::Idle,
            RunState::Expired => SessionPhase::Expired,
            RunState::Running if self.should_show_warning() => SessionPhase::Warning,
            RunState::Running => SessionPhase::Active,
        }
    }

    /// "Stay signed in": records activity, then refreshes right away.
    ///
    /// The outcome is applied like a timer-driven refresh: the timer is
    /// re-armed, and a failure with an expired token ends the session.
    pub async fn extend_session(&self) -> RefreshOutcome {
        let shared = &self.shared;
        if !shared.is_running() {
            return RefreshOutcome::NotRunning;
        }
        shared.record_activity();
        shared.refresh(Gate::Bypass).await
    }

    /// The signed-in user, from the stored credentials.
    pub fn user(&self) -> Option<UserInfo> {
        let shared = &self.shared;
        let credentials = match Credentials::load(shared.store.as_ref()) {
            Ok(credentials) => credentials?,
            Err(e) => {
                warn!(error = %e, "could not read credentials");
                return None;
            }
        };
        let roles = shared
            .codec
            .decode(&credentials.access_token)
            .map(|token| token.roles())
            .unwrap_or_default();
        Some(UserInfo {
            display_name: credentials.user_display_name,
            subject_id: credentials.subject_id,
            primary_role: credentials.user_role,
            roles,
        })
    }

    /// The stored access token, for attaching to outgoing requests.
    pub fn access_token(&self) -> Option<String> {
        self.shared
            .store
            .get(StorageKey::AccessToken.as_str())
            .ok()
            .flatten()
    }

    /// Signs out: cancels every timer, clears the stored session and
    /// credentials, and calls [`SessionHooks::go_to_login`].
    ///
    /// Idempotent. Whatever ends the session first (this, the timeout
    /// check, a failed refresh) wins; everything after is a no-op.
    pub fn destroy(&self) {
        self.shared.expire(ExpiryReason::Destroyed);
    }

    /// Cancels every timer and the store watcher without touching the
    /// store or calling the hooks. For shutdown or unmount; the session
    /// can be resumed with [`start`](Self::start).
    pub fn stop(&self) {
        let shared = &self.shared;
        {
            let mut state = shared.lock_state();
            if *state == RunState::Running {
                *state = RunState::Idle;
            }
        }
        shared.timers.cancel_all();
        shared.stop_watcher();
        debug!("session stopped");
    }

    /// Which timers are armed.
    pub fn armed_timers(&self) -> ArmedTimers {
        self.shared.timers.armed()
    }

    /// When the pending refresh will fire.
    pub fn refresh_deadline(&self) -> Option<Instant> {
        self.shared.timers.refresh_deadline()
    }

    /// How many refresh timers this instance has armed so far.
    pub fn refresh_schedule_count(&self) -> u64 {
        self.shared.timers.refresh_schedule_count()
    }
}

impl<R: RefreshEndpoint> Shared<R> {
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> RunState {
        *self.lock_state()
    }

    fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    fn record_activity(&self) {
        if self.state() == RunState::Expired {
            return;
        }
        if let Err(e) = self.activity.record_activity(self.clock.now()) {
            warn!(error = %e, "could not record activity");
        }
        self.warned.store(false, Ordering::SeqCst);
    }

    /// Fail-closed: a running session with no readable activity has
    /// timed out.
    fn timed_out(&self, now: DateTime<Utc>) -> bool {
        self.is_running()
            && self
                .activity
                .idle_for(now)
                .is_none_or(|idle| idle > self.config.timeout_window)
    }

    fn warning_due(&self, now: DateTime<Utc>) -> bool {
        let threshold = self
            .config
            .timeout_window
            .saturating_sub(self.config.warning_window);
        self.is_running()
            && self
                .activity
                .idle_for(now)
                .is_none_or(|idle| idle > threshold)
    }

    fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let window = self.config.timeout_window;
        window.saturating_sub(self.activity.idle_for(now).unwrap_or(window))
    }

    fn refresh_delay_for(&self, access_token: &str, now: DateTime<Utc>) -> Duration {
        match self.codec.decode(access_token).and_then(|t| t.expires_at()) {
            Ok(expires_at) => refresh_delay(expires_at, now, self.config.refresh_margin),
            Err(e) => {
                debug!(error = %e, "access token unreadable, refreshing now");
                Duration::ZERO
            }
        }
    }

    async fn refresh(&self, gate: Gate) -> RefreshOutcome {
        let _in_flight = InFlight::enter(&self.refreshing);
        let now = self.clock.now();
        let outcome = match gate {
            Gate::Activity => self.coordinator.maybe_refresh(now).await,
            Gate::Bypass => self.coordinator.refresh_now(now).await,
        };
        self.apply(&outcome);
        outcome
    }

    fn apply(&self, outcome: &RefreshOutcome) {
        match (outcome, self.state()) {
            (RefreshOutcome::Expired { .. }, RunState::Running) => {
                self.expire(ExpiryReason::TokenExpired);
            }
            // Torn down while the call was in flight; don't resurrect.
            (RefreshOutcome::Refreshed { .. }, RunState::Expired) => {
                if let Err(e) = Credentials::clear(self.store.as_ref()) {
                    warn!(error = %e, "could not discard late refresh");
                }
            }
            (_, RunState::Running) => match outcome.next_delay() {
                Some(delay) => self.timers.reschedule_refresh(delay),
                None => debug!("refresh timer left disarmed"),
            },
            _ => {}
        }
    }

    /// Tears the session down once. Returns `false` if already expired.
    fn expire(&self, reason: ExpiryReason) -> bool {
        {
            let mut state = self.lock_state();
            if *state == RunState::Expired {
                debug!(%reason, "session already expired");
                return false;
            }
            *state = RunState::Expired;
        }

        self.timers.cancel_all();
        self.stop_watcher();
        let store = self.store.as_ref();
        if let Err(e) = Credentials::clear(store).and_then(|()| SessionRecord::clear(store)) {
            warn!(error = %e, "could not clear stored session");
        }

        info!(%reason, "session expired");
        self.hooks.go_to_login(self.config.login_path.clone());
        true
    }

    fn persist_record(&self, now: DateTime<Utc>) -> Result<(), SessionError> {
        let store = self.store.as_ref();
        let window = self.config.timeout_window;
        let started_at = SessionRecord::load(store, window)?
            .map(|record| record.started_at)
            .unwrap_or(now);
        SessionRecord::new(started_at, window, None).save(store)?;
        Ok(())
    }

    /// Re-arms a refresh that was abandoned for lack of a refresh token,
    /// once one shows up.
    fn reprime_refresh(&self, now: DateTime<Utc>) {
        match Credentials::load(self.store.as_ref()) {
            Ok(Some(credentials)) if credentials.refresh_token.is_some() => {
                let delay = self.refresh_delay_for(&credentials.access_token, now);
                debug!(refresh_in_secs = delay.as_secs(), "refresh timer re-primed");
                self.timers.reschedule_refresh(delay);
            }
            Ok(_) => trace!("no refresh token, refresh stays disarmed"),
            Err(e) => warn!(error = %e, "could not read credentials"),
        }
    }

    // -- cross-instance sync ------------------------------------------------

    fn spawn_watcher(&self) {
        let Some(mut changes) = self.store.watch() else {
            return;
        };
        let this = self.this.clone();
        let handle = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                let Some(shared) = this.upgrade() else {
                    break;
                };
                shared.on_external_change(change);
            }
        });
        if let Some(previous) = self.lock_watcher().replace(handle) {
            previous.abort();
        }
    }

    fn stop_watcher(&self) {
        if let Some(handle) = self.lock_watcher().take() {
            handle.abort();
        }
    }

    fn lock_watcher(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_external_change(&self, change: StoreChange) {
        if !self.is_running() {
            return;
        }
        match StorageKey::from_name(&change.key) {
            Some(StorageKey::AccessToken) => match change.value {
                Some(token) => {
                    let delay = self.refresh_delay_for(&token, self.clock.now());
                    debug!(
                        origin = %change.origin,
                        refresh_in_secs = delay.as_secs(),
                        "credentials replaced by another instance"
                    );
                    self.timers.reschedule_refresh(delay);
                }
                None => {
                    info!(origin = %change.origin, "signed out by another instance");
                    self.expire(ExpiryReason::SignedOutElsewhere);
                }
            },
            Some(StorageKey::LastActivityAt) => self.warned.store(false, Ordering::SeqCst),
            _ => trace!(key = %change.key, "ignoring external change"),
        }
    }
}

impl<R: RefreshEndpoint> TimerTarget for Shared<R> {
    async fn on_timeout_check(&self) {
        if !self.is_running() {
            return;
        }
        let now = self.clock.now();
        if self.timed_out(now) {
            self.expire(ExpiryReason::Inactivity);
            return;
        }
        if self.warning_due(now) && !self.warned.swap(true, Ordering::SeqCst) {
            let remaining = self.remaining(now);
            info!(remaining_secs = remaining.as_secs(), "session expiring soon");
            self.hooks.on_warning(remaining);
        }
    }

    async fn on_heartbeat(&self) {
        let now = self.clock.now();
        // A timed-out session is left to the timeout check.
        if !self.is_running() || self.timed_out(now) {
            return;
        }
        if let Err(e) = self.persist_record(now) {
            warn!(error = %e, "heartbeat could not persist session record");
        }
        if !self.timers.armed().refresh && !self.refreshing.load(Ordering::SeqCst) {
            self.reprime_refresh(now);
        }
        trace!("heartbeat");
    }

    async fn on_refresh_due(&self) {
        if !self.is_running() {
            return;
        }
        self.refresh(Gate::Activity).await;
    }
}

impl<R: RefreshEndpoint> Drop for Shared<R> {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

/// Marks a refresh in flight until dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
