//! Refresh coordination: when to refresh, and what a failure means.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use vigil_clock::Clock;
use vigil_io::{KeyValueStore, RefreshEndpoint, RefreshResponse, StorageKey};
use vigil_token::{TokenCodec, UserInfo};

use crate::{ActivityTracker, Credentials, RefreshFailure, SessionConfig, SessionError};

/// The result of one refresh decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The user is inactive; the endpoint was not called.
    Deferred { recheck_in: Duration },
    /// New credentials are persisted.
    Refreshed { next_in: Duration, user: UserInfo },
    /// No refresh token is stored. Nothing to retry with.
    Abandoned,
    /// The refresh failed but the current token is still valid.
    RetryScheduled {
        retry_in: Duration,
        cause: RefreshFailure,
    },
    /// The refresh failed and the current token has expired.
    Expired { cause: RefreshFailure },
    /// The lifecycle was not running, so nothing was attempted.
    NotRunning,
}

impl RefreshOutcome {
    /// The delay to re-arm the refresh timer with. `None` means leave it
    /// disarmed.
    pub fn next_delay(&self) -> Option<Duration> {
        match self {
            Self::Deferred { recheck_in } => Some(*recheck_in),
            Self::Refreshed { next_in, .. } => Some(*next_in),
            Self::RetryScheduled { retry_in, .. } => Some(*retry_in),
            Self::Abandoned | Self::Expired { .. } | Self::NotRunning => None,
        }
    }

    /// Maps the outcome onto [`SessionError`]. Deferral counts as success.
    pub fn into_result(self) -> Result<(), SessionError> {
        match self {
            Self::Deferred { .. } | Self::Refreshed { .. } => Ok(()),
            Self::Abandoned => Err(SessionError::MissingRefreshToken),
            Self::RetryScheduled { cause, .. } => {
                Err(SessionError::TransientRefreshFailure(cause))
            }
            Self::Expired { cause } => Err(SessionError::TokenGenuinelyExpired(cause)),
            Self::NotRunning => Err(SessionError::Terminated),
        }
    }
}

/// Decides whether to refresh, calls the endpoint, and classifies failures.
///
/// The two rules:
///
/// 1. **Inactive users don't refresh.** An idle session must not burn
///    refresh-token budget; it re-checks later instead.
/// 2. **A slow network never logs anyone out.** A failed refresh only ends
///    the session if the token it was meant to replace has expired.
pub struct RefreshCoordinator<R> {
    endpoint: R,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    codec: TokenCodec,
    activity: ActivityTracker,
    config: SessionConfig,
}

impl<R: RefreshEndpoint> RefreshCoordinator<R> {
    pub fn new(
        endpoint: R,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            endpoint,
            activity: ActivityTracker::new(Arc::clone(&store)),
            codec: TokenCodec::new(config.role_policy()),
            store,
            clock,
            config,
        }
    }

    /// The refresh endpoint in use.
    pub fn endpoint(&self) -> &R {
        &self.endpoint
    }

    /// Refreshes if the user was active within the activity threshold,
    /// otherwise defers.
    pub async fn maybe_refresh(&self, now: DateTime<Utc>) -> RefreshOutcome {
        if !self.activity.is_active(now, self.config.activity_threshold) {
            debug!(
                recheck_secs = self.config.inactive_recheck_delay.as_secs(),
                "user inactive, deferring refresh"
            );
            return RefreshOutcome::Deferred {
                recheck_in: self.config.inactive_recheck_delay,
            };
        }
        self.refresh_now(now).await
    }

    /// Refreshes regardless of activity.
    ///
    /// `now` is only used for logging context; the expiry check after a
    /// failure re-reads the clock, since the endpoint call may have taken
    /// a while.
    pub async fn refresh_now(&self, now: DateTime<Utc>) -> RefreshOutcome {
        let refresh_token = match self.store.get(StorageKey::RefreshToken.as_str()) {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => {
                error!("no refresh token stored, automatic refresh abandoned");
                return RefreshOutcome::Abandoned;
            }
            Err(e) => return self.on_failure(RefreshFailure::Store(e.to_string())),
        };

        debug!(at = %now, "calling refresh endpoint");
        let response = match self.endpoint.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(e) => return self.on_failure(RefreshFailure::Endpoint(e)),
        };

        match self.persist(response, refresh_token) {
            Ok(outcome) => outcome,
            Err(failure) => self.on_failure(failure),
        }
    }

    /// Validates the new access token and overwrites the credentials.
    fn persist(
        &self,
        response: RefreshResponse,
        previous_refresh_token: String,
    ) -> Result<RefreshOutcome, RefreshFailure> {
        self.codec.decode(&response.access_token)?.expires_at()?;
        let user = self.codec.extract_user_info(&response.access_token)?;

        // Servers that don't rotate leave the old refresh token valid.
        let refresh_token = response.refresh_token.or(Some(previous_refresh_token));
        Credentials::new(response.access_token, refresh_token, &user)
            .save(self.store.as_ref())
            .map_err(|e| RefreshFailure::Store(e.to_string()))?;

        let next_in = Duration::from_secs(response.expires_in_seconds)
            .saturating_sub(self.config.refresh_margin)
            .max(self.config.min_refresh_delay);
        info!(
            subject = %user.subject_id,
            role = %user.primary_role,
            next_in_secs = next_in.as_secs(),
            "access token refreshed"
        );
        Ok(RefreshOutcome::Refreshed { next_in, user })
    }

    /// Splits a failure into "retry later" and "session is over".
    fn on_failure(&self, cause: RefreshFailure) -> RefreshOutcome {
        let now = self.clock.now();
        let current_expired = match self.store.get(StorageKey::AccessToken.as_str()) {
            Ok(Some(token)) => self.codec.is_expired(&token, now),
            Ok(None) => true,
            // Can't tell: assume still valid and retry.
            Err(e) => {
                warn!(error = %e, "could not read current access token");
                false
            }
        };

        if current_expired {
            warn!(error = %cause, "refresh failed and current token has expired");
            RefreshOutcome::Expired { cause }
        } else {
            warn!(
                error = %cause,
                retry_secs = self.config.retry_delay.as_secs(),
                "refresh failed, current token still valid, retrying"
            );
            RefreshOutcome::RetryScheduled {
                retry_in: self.config.retry_delay,
                cause,
            }
        }
    }
}
