//! The three session timers.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, trace};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Shortest period a repeating timer may have.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Longest delay any timer is armed with: thirty years.
const MAX_DELAY: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Timer periods.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// Period of the timeout-check timer. Default: 60 s.
    pub timeout_check_interval: Duration,
    /// Period of the heartbeat timer. Default: 5 min.
    pub heartbeat_interval: Duration,
    /// Random jitter (0–max) added to the *first* tick of each repeating
    /// timer, so instances started together (a restored browser session
    /// with many tabs) don't all hit the store in the same instant.
    /// Default: 2 s. Never applied to the refresh timer.
    pub initial_jitter: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            timeout_check_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(5 * 60),
            initial_jitter: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    TimeoutCheck,
    Heartbeat,
    Refresh,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeoutCheck => write!(f, "timeout-check"),
            Self::Heartbeat => write!(f, "heartbeat"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// Receives timer callbacks.
///
/// Each callback runs in its timer's own task. A callback that panics is
/// logged and swallowed: its timer keeps its schedule and the other two
/// timers never notice.
pub trait TimerTarget: Send + Sync + 'static {
    /// The periodic timeout check fired.
    fn on_timeout_check(&self) -> impl Future<Output = ()> + Send;

    /// The periodic heartbeat fired.
    fn on_heartbeat(&self) -> impl Future<Output = ()> + Send;

    /// The one-shot refresh timer fired. Calling
    /// [`SessionClock::reschedule_refresh`] from here is safe.
    fn on_refresh_due(&self) -> impl Future<Output = ()> + Send;
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Which timers are currently armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArmedTimers {
    pub timeout_check: bool,
    pub heartbeat: bool,
    pub refresh: bool,
}

impl ArmedTimers {
    /// Returns `true` if nothing is armed.
    pub fn is_idle(&self) -> bool {
        !(self.timeout_check || self.heartbeat || self.refresh)
    }
}

struct PendingRefresh {
    generation: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Timers {
    timeout_check: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    refresh: Option<PendingRefresh>,
    /// Bumped on every refresh arm; lets a firing refresh task tell
    /// whether it is still the current one.
    generation: u64,
    refresh_schedules: u64,
}

/// Owns the timeout-check, heartbeat and refresh timers of one instance.
///
/// Every arm cancels the previous timer of the same kind first, so
/// repeated `start()` / `reschedule_refresh()` calls never leak tasks.
/// [`cancel_all`](Self::cancel_all) is idempotent and also runs on drop.
///
/// Arming spawns Tokio tasks, so it must happen inside a runtime.
pub struct SessionClock<T: TimerTarget> {
    target: Weak<T>,
    config: ClockConfig,
    timers: Arc<Mutex<Timers>>,
}

impl<T: TimerTarget> SessionClock<T> {
    /// Creates a clock whose callbacks go to `target`. Nothing is armed
    /// until [`start`](Self::start).
    ///
    /// Periods are clamped to the range Tokio timers accept.
    pub fn new(target: Weak<T>, mut config: ClockConfig) -> Self {
        for period in [
            &mut config.timeout_check_interval,
            &mut config.heartbeat_interval,
        ] {
            *period = (*period).clamp(MIN_PERIOD, MAX_DELAY);
        }
        config.initial_jitter = config.initial_jitter.min(MAX_DELAY);
        Self {
            target,
            config,
            timers: Arc::new(Mutex::new(Timers::default())),
        }
    }

    /// The timer periods in use.
    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Cancels everything, then arms all three timers. The refresh timer
    /// fires after `refresh_in`; zero means on the next scheduler tick.
    pub fn start(&self, refresh_in: Duration) {
        self.cancel_all();

        let check_period = self.config.timeout_check_interval;
        let heartbeat_period = self.config.heartbeat_interval;
        let check = spawn_repeating(
            self.target.clone(),
            Repeating::TimeoutCheck,
            check_period,
            self.jitter(),
        );
        let heartbeat = spawn_repeating(
            self.target.clone(),
            Repeating::Heartbeat,
            heartbeat_period,
            self.jitter(),
        );

        {
            let mut timers = self.lock();
            timers.timeout_check = Some(check);
            timers.heartbeat = Some(heartbeat);
        }
        self.reschedule_refresh(refresh_in);

        debug!(
            check_secs = check_period.as_secs(),
            heartbeat_secs = heartbeat_period.as_secs(),
            refresh_in_secs = refresh_in.as_secs(),
            "session timers armed"
        );
    }

    /// Cancels the pending one-shot refresh (if any) and arms a new one
    /// that fires after `delay`, capped at thirty years.
    pub fn reschedule_refresh(&self, delay: Duration) {
        let delay = delay.min(MAX_DELAY);
        let mut timers = self.lock();
        if let Some(previous) = timers.refresh.take() {
            previous.handle.abort();
        }

        timers.generation += 1;
        timers.refresh_schedules += 1;
        let generation = timers.generation;
        let deadline = Instant::now() + delay;
        let handle = spawn_refresh(
            self.target.clone(),
            Arc::clone(&self.timers),
            generation,
            deadline,
        );
        timers.refresh = Some(PendingRefresh {
            generation,
            deadline,
            handle,
        });

        trace!(delay_secs = delay.as_secs_f64(), generation, "refresh timer armed");
    }

    /// Cancels the pending one-shot refresh, leaving the repeating timers.
    pub fn cancel_refresh(&self) {
        if let Some(previous) = self.lock().refresh.take() {
            previous.handle.abort();
        }
    }

    /// Cancels all three timers. Safe to call when nothing is armed.
    pub fn cancel_all(&self) {
        let mut timers = self.lock();
        let mut cancelled = 0;
        for handle in [timers.timeout_check.take(), timers.heartbeat.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
            cancelled += 1;
        }
        if let Some(refresh) = timers.refresh.take() {
            refresh.handle.abort();
            cancelled += 1;
        }
        if cancelled > 0 {
            debug!(cancelled, "session timers cancelled");
        }
    }

    /// Which timers are armed right now.
    pub fn armed(&self) -> ArmedTimers {
        let timers = self.lock();
        let live = |h: &Option<JoinHandle<()>>| h.as_ref().is_some_and(|h| !h.is_finished());
        ArmedTimers {
            timeout_check: live(&timers.timeout_check),
            heartbeat: live(&timers.heartbeat),
            refresh: timers
                .refresh
                .as_ref()
                .is_some_and(|p| !p.handle.is_finished()),
        }
    }

    /// When the pending refresh will fire, if one is armed.
    pub fn refresh_deadline(&self) -> Option<Instant> {
        self.lock().refresh.as_ref().map(|p| p.deadline)
    }

    /// How many one-shot refresh timers have been armed since creation.
    pub fn refresh_schedule_count(&self) -> u64 {
        self.lock().refresh_schedules
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.config.initial_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }

    fn lock(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: TimerTarget> Drop for SessionClock<T> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

// ---------------------------------------------------------------------------
// Timer tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Repeating {
    TimeoutCheck,
    Heartbeat,
}

impl Repeating {
    fn kind(self) -> TimerKind {
        match self {
            Self::TimeoutCheck => TimerKind::TimeoutCheck,
            Self::Heartbeat => TimerKind::Heartbeat,
        }
    }
}

fn spawn_repeating<T: TimerTarget>(
    target: Weak<T>,
    which: Repeating,
    period: Duration,
    jitter: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // First tick one full period out, not immediately.
        let mut ticker = time::interval_at(Instant::now() + period + jitter, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(target) = target.upgrade() else {
                debug!(timer = %which.kind(), "timer owner dropped, stopping");
                break;
            };
            trace!(timer = %which.kind(), "timer fired");
            match which {
                Repeating::TimeoutCheck => {
                    run_isolated(which.kind(), target.on_timeout_check()).await;
                }
                Repeating::Heartbeat => {
                    run_isolated(which.kind(), target.on_heartbeat()).await;
                }
            }
        }
    })
}

fn spawn_refresh<T: TimerTarget>(
    target: Weak<T>,
    timers: Arc<Mutex<Timers>>,
    generation: u64,
    deadline: Instant,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        time::sleep_until(deadline).await;

        // Vacate our slot before running the callback, so a reschedule
        // from inside the callback arms a new timer instead of aborting us.
        {
            let mut timers = timers.lock().unwrap_or_else(PoisonError::into_inner);
            let current = timers
                .refresh
                .as_ref()
                .is_some_and(|pending| pending.generation == generation);
            if !current {
                return;
            }
            timers.refresh = None;
        }

        let Some(target) = target.upgrade() else {
            return;
        };
        trace!(generation, "refresh timer fired");
        run_isolated(TimerKind::Refresh, target.on_refresh_due()).await;
    })
}

async fn run_isolated<F: Future<Output = ()>>(kind: TimerKind, callback: F) {
    if AssertUnwindSafe(callback).catch_unwind().await.is_err() {
        error!(timer = %kind, "timer callback panicked");
    }
}
