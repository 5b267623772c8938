//! `reqwest`-backed refresh endpoint.

use url::Url;

use crate::{RefreshEndpoint, RefreshError, RefreshRequest, RefreshResponse};

/// Path of the refresh call, relative to the auth base URL.
const REFRESH_PATH: &str = "auth/refresh";

/// Calls `POST {base}/auth/refresh` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRefreshEndpoint {
    refresh_url: Url,
    http: reqwest::Client,
}

impl HttpRefreshEndpoint {
    /// Creates an endpoint rooted at `base` (e.g. `https://console.example.com/api`).
    ///
    /// # Errors
    /// Returns [`RefreshError::Config`] if `base` cannot carry a path
    /// (`mailto:`, `data:` and the like).
    pub fn new(mut base: Url) -> Result<Self, RefreshError> {
        if base.cannot_be_a_base() {
            return Err(RefreshError::Config(format!("{base} cannot be a base URL")));
        }
        // `join` replaces the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let refresh_url = base
            .join(REFRESH_PATH)
            .map_err(|e| RefreshError::Config(e.to_string()))?;

        Ok(Self {
            refresh_url,
            http: reqwest::Client::new(),
        })
    }

    /// Creates an endpoint from `VIGIL_AUTH_BASE_URL`.
    ///
    /// # Errors
    /// Returns [`RefreshError::Config`] if the variable is missing or not a URL.
    pub fn from_env() -> Result<Self, RefreshError> {
        let raw = std::env::var("VIGIL_AUTH_BASE_URL")
            .map_err(|_| RefreshError::Config("VIGIL_AUTH_BASE_URL is required".into()))?;
        let base: Url = raw
            .parse()
            .map_err(|e| RefreshError::Config(format!("VIGIL_AUTH_BASE_URL: {e}")))?;
        Self::new(base)
    }

    /// Use a custom HTTP client (timeouts, proxies, connection pool reuse).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// The full URL the refresh call is posted to.
    pub fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }
}

impl RefreshEndpoint for HttpRefreshEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RefreshError> {
        let response = self
            .http
            .post(self.refresh_url.clone())
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_appends_refresh_path_to_base_with_path() {
        let endpoint = HttpRefreshEndpoint::new("https://console.example.com/api".parse().unwrap())
            .unwrap();

        assert_eq!(
            endpoint.refresh_url().as_str(),
            "https://console.example.com/api/auth/refresh"
        );
    }

    #[test]
    fn test_new_handles_trailing_slash_and_root() {
        let slashed = HttpRefreshEndpoint::new("https://a.example/api/".parse().unwrap()).unwrap();
        let root = HttpRefreshEndpoint::new("https://a.example".parse().unwrap()).unwrap();

        assert_eq!(slashed.refresh_url().as_str(), "https://a.example/api/auth/refresh");
        assert_eq!(root.refresh_url().as_str(), "https://a.example/auth/refresh");
    }

    #[test]
    fn test_new_rejects_non_base_url() {
        let result = HttpRefreshEndpoint::new("mailto:ops@example.com".parse().unwrap());

        assert!(matches!(result, Err(RefreshError::Config(_))));
    }
}
