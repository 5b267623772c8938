//! Error types for the token layer.

/// Errors that can occur while decoding a bearer token.
///
/// Callers of the boolean predicates ([`TokenCodec::is_expired`] and
/// friends) never see these: a decode failure is folded into "expired".
/// They surface only from [`TokenCodec::decode`] and the accessors that
/// need a specific claim.
///
/// [`TokenCodec::is_expired`]: crate::TokenCodec::is_expired
/// [`TokenCodec::decode`]: crate::TokenCodec::decode
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token is structurally broken: wrong segment count, bad
    /// base64, bad JSON, or a segment that is not a JSON object.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The payload has no usable `exp` claim (absent, non-numeric, or
    /// outside the representable range).
    #[error("token has no usable expiry claim")]
    MissingExpiryClaim,
}
