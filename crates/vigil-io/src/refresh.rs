//! The token refresh endpoint seam.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::RefreshError;

/// Body of `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// What the auth server hands back on a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// The new bearer token.
    pub access_token: String,
    /// The rotated refresh token. Some servers don't rotate; the session
    /// layer then keeps the one it already has.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds.
    pub expires_in_seconds: u64,
    /// Lifetime of the refresh token in seconds, when the server says.
    #[serde(default)]
    pub refresh_expires_in_seconds: Option<u64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".into()
}

/// Exchanges a refresh token for a new credential set.
///
/// Vigil never issues tokens itself; implement this against your auth
/// server, or use [`HttpRefreshEndpoint`](crate::HttpRefreshEndpoint).
///
/// Implementations must tolerate duplicate concurrent calls with the same
/// refresh token: several instances may refresh at once and the last
/// writer wins.
///
/// # Example
///
/// ```rust
/// use vigil_io::{RefreshEndpoint, RefreshError, RefreshResponse};
///
/// /// Always fails, as if the auth server were down.
/// struct Offline;
///
/// impl RefreshEndpoint for Offline {
///     async fn refresh(
///         &self,
///         _refresh_token: &str,
///     ) -> Result<RefreshResponse, RefreshError> {
///         Err(RefreshError::Network("offline".into()))
///     }
/// }
/// ```
pub trait RefreshEndpoint: Send + Sync + 'static {
    /// Calls the refresh endpoint with `refresh_token`.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshResponse, RefreshError>> + Send;
}

impl<T: RefreshEndpoint> RefreshEndpoint for Arc<T> {
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshResponse, RefreshError>> + Send {
        (**self).refresh(refresh_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parses_camel_case_body() {
        let body = r#"{
            "accessToken": "a.b.c",
            "refreshToken": "r-2",
            "expiresInSeconds": 300,
            "refreshExpiresInSeconds": 1800,
            "tokenType": "Bearer"
        }"#;

        let parsed: RefreshResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.access_token, "a.b.c");
        assert_eq!(parsed.refresh_token.as_deref(), Some("r-2"));
        assert_eq!(parsed.expires_in_seconds, 300);
        assert_eq!(parsed.refresh_expires_in_seconds, Some(1800));
    }

    #[test]
    fn test_response_optional_fields_default() {
        let body = r#"{ "accessToken": "a.b.c", "expiresInSeconds": 60 }"#;

        let parsed: RefreshResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.refresh_token, None);
        assert_eq!(parsed.token_type, "Bearer");
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let body = serde_json::to_string(&RefreshRequest { refresh_token: "r-1" }).unwrap();

        assert_eq!(body, r#"{"refreshToken":"r-1"}"#);
    }
}
