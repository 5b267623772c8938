//! The token codec: compact three-part token → [`DecodedToken`].
//!
//! Every time-based question takes `now` as a parameter instead of reading
//! a clock. The session layer owns the clock; this keeps the codec pure
//! and its boundaries trivially testable.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{DecodedToken, RolePolicy, TokenError, UserInfo};

/// Segment delimiter of the compact serialization.
const DELIMITER: char = '.';

/// Decodes bearer tokens and answers expiry/identity questions about them.
#[derive(Debug, Clone, Default)]
pub struct TokenCodec {
    roles: RolePolicy,
}

impl TokenCodec {
    /// Creates a codec that derives primary roles with `roles`.
    pub fn new(roles: RolePolicy) -> Self {
        Self { roles }
    }

    /// The role policy used by [`extract_user_info`](Self::extract_user_info).
    pub fn role_policy(&self) -> &RolePolicy {
        &self.roles
    }

    /// Decodes a token into its header and claims.
    ///
    /// The signature segment must be present but is not inspected.
    ///
    /// # Errors
    /// Returns [`TokenError::MalformedToken`] if the token does not have
    /// exactly three segments, or if the header or payload is not
    /// base64url-encoded JSON object.
    pub fn decode(&self, token: &str) -> Result<DecodedToken, TokenError> {
        let segments: Vec<&str> = token.split(DELIMITER).collect();
        if segments.len() != 3 {
            return Err(TokenError::MalformedToken(format!(
                "expected 3 segments, got {}",
                segments.len()
            )));
        }

        let header = decode_segment(segments[0], "header")?;
        let claims = decode_segment(segments[1], "payload")?;
        Ok(DecodedToken::new(header, claims))
    }

    /// Returns `true` unless the token decodes, carries a numeric `exp`,
    /// and that expiry is strictly after `now`.
    pub fn is_expired(&self, token: &str, now: DateTime<Utc>) -> bool {
        match self.decode(token).and_then(|t| t.expires_at()) {
            Ok(expires_at) => expires_at <= now,
            Err(_) => true,
        }
    }

    /// Returns `true` if the token is still valid but expires within
    /// `window` of `now` (`0 < exp − now ≤ window`).
    pub fn is_expiring_soon(
        &self,
        token: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> bool {
        self.expires_in(token, now)
            .is_some_and(|left| left <= window)
    }

    /// Time left before the token expires. `None` if it already expired
    /// or cannot be read.
    pub fn expires_in(&self, token: &str, now: DateTime<Utc>) -> Option<Duration> {
        let expires_at = self.decode(token).and_then(|t| t.expires_at()).ok()?;
        let left = (expires_at - now).to_std().ok()?;
        (!left.is_zero()).then_some(left)
    }

    /// Extracts display name, subject id and primary role.
    ///
    /// # Errors
    /// Returns [`TokenError::MalformedToken`] if the token cannot be decoded.
    pub fn extract_user_info(&self, token: &str) -> Result<UserInfo, TokenError> {
        let decoded = self.decode(token)?;
        let roles = decoded.roles();
        Ok(UserInfo {
            display_name: decoded.display_name(),
            subject_id: decoded.subject().unwrap_or_default().to_owned(),
            primary_role: self.roles.primary_role(&roles),
            roles,
        })
    }
}

/// Base64url-decodes one segment and parses it as a JSON object.
///
/// Issuers disagree on padding, so trailing `=` is tolerated.
fn decode_segment(segment: &str, which: &str) -> Result<Map<String, Value>, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| TokenError::MalformedToken(format!("{which}: invalid base64: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TokenError::MalformedToken(format!(
            "{which}: not a JSON object"
        ))),
        Err(e) => Err(TokenError::MalformedToken(format!(
            "{which}: invalid JSON: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE;
    use chrono::TimeDelta;
    use serde_json::json;

    fn encode(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    fn make_token(claims: Value) -> String {
        let header = json!({ "alg": "RS256", "typ": "JWT" });
        format!("{}.{}.c2lnbmF0dXJl", encode(&header), encode(&claims))
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn token_expiring_in(secs: i64) -> String {
        let n = now().timestamp();
        make_token(json!({ "exp": n + secs, "iat": n - 60, "sub": "u-1" }))
    }

    // =====================================================================
    // decode()
    // =====================================================================

    #[test]
    fn test_decode_valid_token_exposes_header_and_claims() {
        let codec = TokenCodec::default();
        let token = make_token(json!({ "exp": 10, "sub": "u-1" }));

        let decoded = codec.decode(&token).expect("should decode");

        assert_eq!(decoded.header()["alg"], "RS256");
        assert_eq!(decoded.subject(), Some("u-1"));
    }

    #[test]
    fn test_decode_wrong_segment_count_is_malformed() {
        let codec = TokenCodec::default();

        for token in ["", "abc", "a.b", "a.b.c.d"] {
            assert!(
                matches!(codec.decode(token), Err(TokenError::MalformedToken(_))),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_decode_invalid_base64_is_malformed() {
        let codec = TokenCodec::default();

        let result = codec.decode("!!!.@@@.sig");

        assert!(matches!(result, Err(TokenError::MalformedToken(_))));
    }

    #[test]
    fn test_decode_invalid_json_is_malformed() {
        let codec = TokenCodec::default();
        let garbage = URL_SAFE_NO_PAD.encode(b"{not json");
        let token = format!("{garbage}.{garbage}.sig");

        assert!(matches!(
            codec.decode(&token),
            Err(TokenError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_decode_non_object_payload_is_malformed() {
        let codec = TokenCodec::default();
        let header = encode(&json!({ "alg": "none" }));
        let token = format!("{header}.{}.sig", encode(&json!([1, 2, 3])));

        assert!(matches!(
            codec.decode(&token),
            Err(TokenError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_decode_accepts_padded_segments() {
        let codec = TokenCodec::default();
        let header = URL_SAFE.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE.encode(br#"{"exp":12}"#);
        assert!(header.ends_with('=') && payload.ends_with("=="));

        let decoded = codec.decode(&format!("{header}.{payload}.sig"));

        assert!(decoded.is_ok());
    }

    // =====================================================================
    // is_expired() / is_expiring_soon() / expires_in()
    // =====================================================================

    #[test]
    fn test_is_expired_past_exp_returns_true() {
        let codec = TokenCodec::default();

        for secs in [-10, -1, 0] {
            assert!(codec.is_expired(&token_expiring_in(secs), now()));
        }
    }

    #[test]
    fn test_is_expired_future_exp_returns_false() {
        let codec = TokenCodec::default();

        assert!(!codec.is_expired(&token_expiring_in(3600), now()));
    }

    #[test]
    fn test_is_expired_malformed_input_returns_true() {
        let codec = TokenCodec::default();

        for token in ["", "one.two", "!!!.@@@.###", "a.b.c.d"] {
            assert!(codec.is_expired(token, now()), "{token:?}");
        }
    }

    #[test]
    fn test_is_expired_missing_exp_returns_true() {
        let codec = TokenCodec::default();
        let token = make_token(json!({ "sub": "u-1" }));

        assert!(codec.is_expired(&token, now()));
    }

    #[test]
    fn test_is_expiring_soon_inside_window() {
        let codec = TokenCodec::default();
        let window = Duration::from_secs(300);

        assert!(codec.is_expiring_soon(&token_expiring_in(120), now(), window));
        assert!(codec.is_expiring_soon(&token_expiring_in(300), now(), window));
    }

    #[test]
    fn test_is_expiring_soon_outside_window_or_expired() {
        let codec = TokenCodec::default();
        let window = Duration::from_secs(300);

        assert!(!codec.is_expiring_soon(&token_expiring_in(301), now(), window));
        assert!(!codec.is_expiring_soon(&token_expiring_in(0), now(), window));
        assert!(!codec.is_expiring_soon(&token_expiring_in(-5), now(), window));
    }

    #[test]
    fn test_expires_in_reports_remaining_time() {
        let codec = TokenCodec::default();

        let left = codec.expires_in(&token_expiring_in(90), now());

        assert_eq!(left, Some(Duration::from_secs(90)));
        assert_eq!(
            codec.expires_in(&token_expiring_in(90), now() + TimeDelta::seconds(91)),
            None
        );
    }

    // =====================================================================
    // extract_user_info()
    // =====================================================================

    #[test]
    fn test_extract_user_info_full_token() {
        let codec = TokenCodec::default();
        let token = make_token(json!({
            "exp": 10,
            "sub": "8f1c",
            "name": "Grace Hopper",
            "realm_access": { "roles": ["offline_access", "ROLE_COMPLIANCE", "ROLE_ADMIN"] },
        }));

        let info = codec.extract_user_info(&token).unwrap();

        assert_eq!(info.display_name, "Grace Hopper");
        assert_eq!(info.subject_id, "8f1c");
        assert_eq!(info.primary_role, "compliance");
        assert_eq!(info.roles.len(), 3);
    }

    #[test]
    fn test_extract_user_info_sparse_token_uses_defaults() {
        let codec = TokenCodec::default();
        let token = make_token(json!({ "exp": 10 }));

        let info = codec.extract_user_info(&token).unwrap();

        assert_eq!(info.display_name, crate::UNKNOWN_USER);
        assert_eq!(info.subject_id, "");
        assert_eq!(info.primary_role, "user");
    }

    #[test]
    fn test_extract_user_info_malformed_token_is_error() {
        let codec = TokenCodec::default();

        assert!(codec.extract_user_info("not-a-token").is_err());
    }
}
