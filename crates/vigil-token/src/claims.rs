//! Decoded token data: header, claims, and the user info derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::TokenError;

/// Display name used when the token carries no name-like claim at all.
pub const UNKNOWN_USER: &str = "Unknown User";

// ---------------------------------------------------------------------------
// RolePolicy
// ---------------------------------------------------------------------------

/// How the single "primary role" is picked out of a token's role list.
///
/// Auth servers tend to mix application roles (`ROLE_ADMIN`) with
/// infrastructure ones (`offline_access`, `uma_authorization`). Only
/// entries that start with `prefix` count; the first one wins, in the
/// order the server listed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    /// Recognized role prefix, including its separator (e.g. `"ROLE_"`).
    pub prefix: String,
    /// Role reported when no entry matches.
    pub default_role: String,
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self {
            prefix: "ROLE_".into(),
            default_role: "user".into(),
        }
    }
}

impl RolePolicy {
    /// Returns the primary role for an ordered role list.
    ///
    /// `ROLE_COMPLIANCE_OFFICER` becomes `compliance_officer`. An entry
    /// that is exactly the prefix (nothing after it) is skipped.
    pub fn primary_role<S: AsRef<str>>(&self, roles: &[S]) -> String {
        roles
            .iter()
            .filter_map(|role| role.as_ref().strip_prefix(self.prefix.as_str()))
            .find(|rest| !rest.is_empty())
            .map(str::to_lowercase)
            .unwrap_or_else(|| self.default_role.clone())
    }
}

// ---------------------------------------------------------------------------
// DecodedToken
// ---------------------------------------------------------------------------

/// A structurally valid token, decoded but not verified.
///
/// Never mutated after decoding. Holding one says nothing about whether
/// the token is still valid; use the time-based accessors for that.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    header: Map<String, Value>,
    claims: Map<String, Value>,
}

impl DecodedToken {
    pub(crate) fn new(header: Map<String, Value>, claims: Map<String, Value>) -> Self {
        Self { header, claims }
    }

    /// The header object (`alg`, `typ`, `kid`, …).
    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    /// The payload claims object.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Gets a single claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// The expiry instant from the `exp` claim.
    ///
    /// # Errors
    /// Returns [`TokenError::MissingExpiryClaim`] if `exp` is absent,
    /// non-numeric, or out of range.
    pub fn expires_at(&self) -> Result<DateTime<Utc>, TokenError> {
        self.instant_claim("exp").ok_or(TokenError::MissingExpiryClaim)
    }

    /// The issued-at instant from the `iat` claim, if present and numeric.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.instant_claim("iat")
    }

    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.string_claim("sub")
    }

    /// The role list, in the order the issuer wrote it.
    ///
    /// Reads `realm_access.roles` first (Keycloak-style realm roles) and
    /// falls back to a top-level `roles` array. Non-string entries are
    /// skipped.
    pub fn roles(&self) -> Vec<String> {
        let list = self
            .claims
            .get("realm_access")
            .and_then(|realm| realm.get("roles"))
            .and_then(Value::as_array)
            .or_else(|| self.claims.get("roles").and_then(Value::as_array));

        list.map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
    }

    /// The primary role under `policy`.
    pub fn primary_role(&self, policy: &RolePolicy) -> String {
        policy.primary_role(&self.roles())
    }

    /// The best available display name.
    ///
    /// First of `name`, `username`, `preferred_username`, `sub`; otherwise
    /// [`UNKNOWN_USER`]. Empty strings do not count.
    pub fn display_name(&self) -> String {
        ["name", "username", "preferred_username", "sub"]
            .iter()
            .find_map(|claim| self.string_claim(claim))
            .unwrap_or(UNKNOWN_USER)
            .to_owned()
    }

    fn string_claim(&self, name: &str) -> Option<&str> {
        self.claims
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Reads a numeric-seconds claim. Floats are truncated.
    fn instant_claim(&self, name: &str) -> Option<DateTime<Utc>> {
        let value = self.claims.get(name)?;
        let secs = match value.as_i64() {
            Some(secs) => secs,
            None => {
                let secs = value.as_f64()?;
                if !secs.is_finite() {
                    return None;
                }
                secs.trunc() as i64
            }
        };
        DateTime::from_timestamp(secs, 0)
    }
}

// ---------------------------------------------------------------------------
// UserInfo
// ---------------------------------------------------------------------------

/// Who a token belongs to, as far as the console UI cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Name shown in the header bar.
    pub display_name: String,
    /// The `sub` claim, or empty if the token has none.
    pub subject_id: String,
    /// Lower-cased primary role (see [`RolePolicy`]).
    pub primary_role: String,
    /// Every role string the token carried, in issuer order.
    pub roles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_with(claims: Value) -> DecodedToken {
        let Value::Object(claims) = claims else {
            panic!("claims must be an object");
        };
        DecodedToken::new(Map::new(), claims)
    }

    #[test]
    fn test_primary_role_first_match_wins_in_issuer_order() {
        let policy = RolePolicy::default();
        let roles = ["offline_access", "ROLE_OPERATOR", "ROLE_ADMIN"];

        assert_eq!(policy.primary_role(&roles), "operator");
    }

    #[test]
    fn test_primary_role_no_match_returns_default() {
        let policy = RolePolicy::default();

        assert_eq!(policy.primary_role(&["offline_access"]), "user");
        assert_eq!(policy.primary_role::<&str>(&[]), "user");
    }

    #[test]
    fn test_primary_role_bare_prefix_is_skipped() {
        let policy = RolePolicy::default();

        assert_eq!(policy.primary_role(&["ROLE_", "ROLE_AUDITOR"]), "auditor");
    }

    #[test]
    fn test_primary_role_custom_prefix() {
        let policy = RolePolicy {
            prefix: "ESCROW_".into(),
            default_role: "viewer".into(),
        };

        assert_eq!(policy.primary_role(&["ROLE_ADMIN", "ESCROW_Agent"]), "agent");
        assert_eq!(policy.primary_role(&["ROLE_ADMIN"]), "viewer");
    }

    #[test]
    fn test_roles_prefers_realm_access() {
        let token = token_with(json!({
            "realm_access": { "roles": ["ROLE_ADMIN", 7, "ROLE_USER"] },
            "roles": ["ROLE_IGNORED"],
        }));

        assert_eq!(token.roles(), vec!["ROLE_ADMIN", "ROLE_USER"]);
    }

    #[test]
    fn test_roles_falls_back_to_top_level() {
        let token = token_with(json!({ "roles": ["ROLE_AUDITOR"] }));

        assert_eq!(token.roles(), vec!["ROLE_AUDITOR"]);
    }

    #[test]
    fn test_display_name_fallback_chain() {
        let named = token_with(json!({ "name": "Ada", "username": "ada", "sub": "u1" }));
        let username = token_with(json!({ "username": "ada", "sub": "u1" }));
        let subject = token_with(json!({ "name": "", "sub": "u1" }));
        let nothing = token_with(json!({}));

        assert_eq!(named.display_name(), "Ada");
        assert_eq!(username.display_name(), "ada");
        assert_eq!(subject.display_name(), "u1");
        assert_eq!(nothing.display_name(), UNKNOWN_USER);
    }

    #[test]
    fn test_expires_at_accepts_float_seconds() {
        let token = token_with(json!({ "exp": 1_700_000_000.9 }));

        assert_eq!(token.expires_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_expires_at_non_numeric_is_missing() {
        let token = token_with(json!({ "exp": "tomorrow" }));

        assert_eq!(token.expires_at(), Err(TokenError::MissingExpiryClaim));
    }

    #[test]
    fn test_issued_at_absent_returns_none() {
        let token = token_with(json!({ "exp": 10 }));

        assert!(token.issued_at().is_none());
    }
}
