//! Session tokens and access-token validity.
//!
//! The access token is a JWT whose payload is decoded without verifying the
//! signature; only the `exp` claim is read. The server stays the authority on
//! whether a token is accepted.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Bearer/refresh token pair for the signed-in user.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    /// Bearer token sent on authenticated requests.
    pub access_token: SecretString,
    /// Token exchanged for a new access token once it expires.
    pub refresh_token: Option<SecretString>,
}

impl SessionTokens {
    /// Create a token pair.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: refresh_token.map(SecretString::from),
        }
    }

    /// Unix timestamp at which the access token expires, if it carries one.
    #[must_use]
    pub fn access_expires_at(&self) -> Option<i64> {
        decode_expiry(self.access_token.expose_secret()).ok().flatten()
    }

    /// Validity of the access token at `now`.
    #[must_use]
    pub fn status(&self, now: i64, leeway_secs: i64) -> TokenStatus {
        token_status(Some(self.access_token.expose_secret()), now, leeway_secs)
    }

    /// Whether a refresh is possible.
    #[must_use]
    pub const fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Validity of an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Usable as-is.
    Valid,
    /// Past `exp` (minus leeway) or undecodable.
    Expired,
    /// No token stored.
    Absent,
}

/// Reasons a token payload could not be decoded.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenDecodeError {
    #[error("token is not a three-part JWT")]
    Malformed,
    #[error("token payload is not valid base64url")]
    Base64,
    #[error("token payload is not a JSON object")]
    Payload,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<serde_json::Number>,
}

/// Read the `exp` claim from a JWT without checking its signature.
///
/// Returns `Ok(None)` for a well-formed token that carries no `exp`.
///
/// # Errors
///
/// Returns `TokenDecodeError` if the token is not a decodable JWT.
pub fn decode_expiry(token: &str) -> Result<Option<i64>, TokenDecodeError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenDecodeError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| TokenDecodeError::Base64)?;
    let claims: Claims = serde_json::from_slice(&bytes).map_err(|_| TokenDecodeError::Payload)?;

    #[allow(clippy::cast_possible_truncation)] // exp is a unix timestamp in seconds
    let exp = claims
        .exp
        .and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)));
    Ok(exp)
}

/// Classify an access token at `now` (unix seconds).
///
/// A token is treated as expired `leeway_secs` before its `exp` so it does
/// not lapse in flight. Tokens that cannot be decoded count as expired;
/// tokens without `exp` count as valid.
#[must_use]
pub fn token_status(access_token: Option<&str>, now: i64, leeway_secs: i64) -> TokenStatus {
    let Some(token) = access_token.filter(|t| !t.is_empty()) else {
        return TokenStatus::Absent;
    };

    match decode_expiry(token) {
        Ok(Some(exp)) if now < exp.saturating_sub(leeway_secs) => TokenStatus::Valid,
        Ok(None) => TokenStatus::Valid,
        Ok(Some(_)) | Err(_) => TokenStatus::Expired,
    }
}

/// Build an unsigned JWT carrying the given `exp`, for tests.
#[cfg(test)]
pub(crate) fn test_jwt(exp: Option<i64>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = exp.map_or_else(
        || serde_json::json!({ "sub": "u-1" }),
        |exp| serde_json::json!({ "sub": "u-1", "exp": exp }),
    );
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{payload}.signature")
}
