//! Error types for the I/O layer.

/// Errors from a [`KeyValueStore`](crate::KeyValueStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing data exists but cannot be parsed.
    #[error("store contents are corrupt: {0}")]
    Corrupt(String),
}

/// Errors from a [`RefreshEndpoint`](crate::RefreshEndpoint) call.
///
/// None of these say anything about whether the *current* token is still
/// good; the session layer decides that separately before reacting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// The request never got a response (DNS, connect, timeout, reset).
    #[error("refresh request failed: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("refresh rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The server answered 2xx but the body is not a refresh response.
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    /// The endpoint is misconfigured (bad base URL, missing env var).
    #[error("refresh endpoint misconfigured: {0}")]
    Config(String),
}
