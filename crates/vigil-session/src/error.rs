//! Error types for the session layer.

use vigil_io::{RefreshError, StoreError};
use vigil_token::TokenError;

/// Why a refresh attempt did not produce usable credentials.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    /// The endpoint call failed (network, non-2xx, bad body).
    #[error(transparent)]
    Endpoint(#[from] RefreshError),

    /// The endpoint answered, but its access token cannot be decoded.
    #[error("refreshed access token is unusable: {0}")]
    UnusableToken(#[from] TokenError),

    /// Reading the refresh token or persisting the result failed.
    #[error("store failure during refresh: {0}")]
    Store(String),
}

/// Errors that can occur during session management.
///
/// Timer callbacks never surface these: the lifecycle absorbs them and
/// either retries silently or ends the session. They reach callers only
/// through explicit operations like [`start`] or
/// [`RefreshOutcome::into_result`].
///
/// [`start`]: crate::SessionLifecycle::start
/// [`RefreshOutcome::into_result`]: crate::RefreshOutcome::into_result
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Nothing to start a session from: the store holds no access token.
    #[error("no stored credentials, sign in first")]
    NoCredentials,

    /// This instance already tore its session down. Expiry is terminal
    /// for an instance; build a new lifecycle to sign in again.
    #[error("session already expired for this instance")]
    Terminated,

    /// No refresh token is available, so automatic refresh stops for
    /// this cycle.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// A refresh failed while the current token is still valid. Retried
    /// on a fixed backoff; never turned into a logout.
    #[error("transient refresh failure: {0}")]
    TransientRefreshFailure(RefreshFailure),

    /// A refresh failed *and* the current token is confirmed expired.
    #[error("token expired and could not be refreshed: {0}")]
    TokenGenuinelyExpired(RefreshFailure),

    /// A token could not be decoded.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The persistent store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors while loading [`SessionConfig`](crate::SessionConfig).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable is set but unusable.
    #[error("{var}: {reason}")]
    Invalid { var: String, reason: String },
}
