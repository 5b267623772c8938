//! Unified error type for Vigil.

use vigil_io::{RefreshError, StoreError};
use vigil_session::{ConfigError, SessionError};
use vigil_token::TokenError;

/// Top-level error that wraps every crate-specific error.
///
/// Each variant has a `From` impl, so `?` converts sub-crate errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// A token could not be decoded.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The persistent store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The refresh endpoint failed or is misconfigured.
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_token_error() {
        let err: VigilError = TokenError::MissingExpiryClaim.into();
        assert!(matches!(err, VigilError::Token(_)));
    }

    #[test]
    fn test_from_store_error() {
        let err: VigilError = StoreError::Corrupt("truncated".into()).into();
        assert!(matches!(err, VigilError::Store(_)));
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_from_refresh_error() {
        let err: VigilError = RefreshError::Network("reset".into()).into();
        assert!(matches!(err, VigilError::Refresh(_)));
        assert!(err.to_string().contains("reset"));
    }

    #[test]
    fn test_from_session_error() {
        let err: VigilError = SessionError::NoCredentials.into();
        assert!(matches!(err, VigilError::Session(_)));
    }

    #[test]
    fn test_from_config_error() {
        let err: VigilError = ConfigError::Invalid {
            var: "VIGIL_TIMEOUT_SECS".into(),
            reason: "not a number".into(),
        }
        .into();
        assert!(matches!(err, VigilError::Config(_)));
        assert!(err.to_string().contains("VIGIL_TIMEOUT_SECS"));
    }
}
