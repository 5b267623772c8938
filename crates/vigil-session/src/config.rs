//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use vigil_clock::ClockConfig;
use vigil_token::RolePolicy;

use crate::ConfigError;

/// Configuration for a [`SessionLifecycle`](crate::SessionLifecycle).
///
/// Every duration is independent. Use [`validated`](Self::validated) to
/// clamp combinations that make no sense; [`SessionLifecycle::new`]
/// does this for you.
///
/// [`SessionLifecycle::new`]: crate::SessionLifecycle::new
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity longer than this ends the session. Default: 30 min.
    pub timeout_window: Duration,

    /// How long before the timeout the warning becomes due. Default: 5 min.
    pub warning_window: Duration,

    /// Period of the timeout check. Default: 60 s.
    pub timeout_check_interval: Duration,

    /// Period of the heartbeat. Default: 5 min.
    pub heartbeat_interval: Duration,

    /// Refresh this long before the access token expires. Default: 60 s.
    pub refresh_margin: Duration,

    /// A user who interacted within this long counts as active, so the
    /// refresh goes ahead. Default: 5 min.
    pub activity_threshold: Duration,

    /// Re-check delay when a refresh is deferred because the user is
    /// inactive. Default: 60 s.
    pub inactive_recheck_delay: Duration,

    /// Retry delay after a transient refresh failure. Default: 60 s.
    pub retry_delay: Duration,

    /// Floor for the post-refresh delay. Stops a refresh loop when the
    /// server hands out lifetimes shorter than the margin. Default: 10 s.
    pub min_refresh_delay: Duration,

    /// Maximum random delay added to the first tick of each repeating
    /// timer. Default: 2 s.
    pub timer_jitter: Duration,

    /// Recognized role prefix. Default: `"ROLE_"`.
    pub role_prefix: String,

    /// Primary role when no role matches. Default: `"user"`.
    pub default_role: String,

    /// Return path handed to the login navigator on expiry.
    pub login_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let roles = RolePolicy::default();
        Self {
            timeout_window: Duration::from_secs(30 * 60),
            warning_window: Duration::from_secs(5 * 60),
            timeout_check_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(5 * 60),
            refresh_margin: Duration::from_secs(60),
            activity_threshold: Duration::from_secs(5 * 60),
            inactive_recheck_delay: Duration::from_secs(60),
            retry_delay: Duration::from_secs(60),
            min_refresh_delay: Duration::from_secs(10),
            timer_jitter: Duration::from_secs(2),
            role_prefix: roles.prefix,
            default_role: roles.default_role,
            login_path: None,
        }
    }
}

impl SessionConfig {
    /// Smallest period a timer may have.
    const MIN_INTERVAL: Duration = Duration::from_secs(1);

    /// Largest duration any field may hold: ten years.
    pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

    /// Clamps inconsistent values, logging a warning for each one.
    ///
    /// - Durations above [`MAX_DURATION`](Self::MAX_DURATION) are capped.
    /// - Zero timer periods and delays become one second.
    /// - `warning_window` is capped at `timeout_window`.
    pub fn validated(mut self) -> Self {
        for (name, value) in [
            ("timeout_window", &mut self.timeout_window),
            ("warning_window", &mut self.warning_window),
            ("timeout_check_interval", &mut self.timeout_check_interval),
            ("heartbeat_interval", &mut self.heartbeat_interval),
            ("refresh_margin", &mut self.refresh_margin),
            ("activity_threshold", &mut self.activity_threshold),
            ("inactive_recheck_delay", &mut self.inactive_recheck_delay),
            ("retry_delay", &mut self.retry_delay),
            ("min_refresh_delay", &mut self.min_refresh_delay),
            ("timer_jitter", &mut self.timer_jitter),
        ] {
            if *value > Self::MAX_DURATION {
                warn!(field = name, secs = value.as_secs(), "duration out of range, capping");
                *value = Self::MAX_DURATION;
            }
        }
        for (name, value) in [
            ("timeout_window", &mut self.timeout_window),
            ("timeout_check_interval", &mut self.timeout_check_interval),
            ("heartbeat_interval", &mut self.heartbeat_interval),
            ("inactive_recheck_delay", &mut self.inactive_recheck_delay),
            ("retry_delay", &mut self.retry_delay),
            ("min_refresh_delay", &mut self.min_refresh_delay),
        ] {
            if value.is_zero() {
                warn!(field = name, "zero duration, clamping to 1s");
                *value = Self::MIN_INTERVAL;
            }
        }
        if self.warning_window > self.timeout_window {
            warn!(
                warning_secs = self.warning_window.as_secs(),
                timeout_secs = self.timeout_window.as_secs(),
                "warning_window exceeds timeout_window, clamping"
            );
            self.warning_window = self.timeout_window;
        }
        self
    }

    /// Defaults overridden by `VIGIL_*` environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `VIGIL_TIMEOUT_SECS` | `timeout_window` |
    /// | `VIGIL_WARNING_SECS` | `warning_window` |
    /// | `VIGIL_CHECK_INTERVAL_SECS` | `timeout_check_interval` |
    /// | `VIGIL_HEARTBEAT_SECS` | `heartbeat_interval` |
    /// | `VIGIL_REFRESH_MARGIN_SECS` | `refresh_margin` |
    /// | `VIGIL_ACTIVITY_THRESHOLD_SECS` | `activity_threshold` |
    /// | `VIGIL_RETRY_SECS` | `retry_delay` |
    /// | `VIGIL_ROLE_PREFIX` | `role_prefix` |
    /// | `VIGIL_DEFAULT_ROLE` | `default_role` |
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if a duration variable is not a
    /// whole number of seconds.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if a duration variable is not a
    /// whole number of seconds.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let seconds = |var: &str, field: &mut Duration| -> Result<(), ConfigError> {
            if let Some(raw) = lookup(var) {
                let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    var: var.to_owned(),
                    reason: format!("expected whole seconds, got {raw:?}: {e}"),
                })?;
                *field = Duration::from_secs(secs);
            }
            Ok(())
        };

        seconds("VIGIL_TIMEOUT_SECS", &mut config.timeout_window)?;
        seconds("VIGIL_WARNING_SECS", &mut config.warning_window)?;
        seconds("VIGIL_CHECK_INTERVAL_SECS", &mut config.timeout_check_interval)?;
        seconds("VIGIL_HEARTBEAT_SECS", &mut config.heartbeat_interval)?;
        seconds("VIGIL_REFRESH_MARGIN_SECS", &mut config.refresh_margin)?;
        seconds("VIGIL_ACTIVITY_THRESHOLD_SECS", &mut config.activity_threshold)?;
        seconds("VIGIL_RETRY_SECS", &mut config.retry_delay)?;
        if let Some(prefix) = lookup("VIGIL_ROLE_PREFIX") {
            config.role_prefix = prefix;
        }
        if let Some(role) = lookup("VIGIL_DEFAULT_ROLE") {
            config.default_role = role;
        }
        Ok(config)
    }

    /// Sets the inactivity timeout.
    pub fn with_timeout_window(mut self, window: Duration) -> Self {
        self.timeout_window = window;
        self
    }

    /// Sets the warning window.
    pub fn with_warning_window(mut self, window: Duration) -> Self {
        self.warning_window = window;
        self
    }

    /// Sets the refresh safety margin.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Sets the activity threshold of the refresh gate.
    pub fn with_activity_threshold(mut self, threshold: Duration) -> Self {
        self.activity_threshold = threshold;
        self
    }

    /// Sets the first-tick jitter of the repeating timers.
    pub fn with_timer_jitter(mut self, jitter: Duration) -> Self {
        self.timer_jitter = jitter;
        self
    }

    /// Sets the return path handed to the login navigator.
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = Some(path.into());
        self
    }

    /// The timer periods for [`SessionClock`](vigil_clock::SessionClock).
    pub fn clock_config(&self) -> ClockConfig {
        ClockConfig {
            timeout_check_interval: self.timeout_check_interval,
            heartbeat_interval: self.heartbeat_interval,
            initial_jitter: self.timer_jitter,
        }
    }

    /// The role policy for the token codec.
    pub fn role_policy(&self) -> RolePolicy {
        RolePolicy {
            prefix: self.role_prefix.clone(),
            default_role: self.default_role.clone(),
        }
    }
}
