//! Unified error type for the marketplace client.
//!
//! Every public operation returns `Result<T, ClientError>`. Callers can tell
//! a transport failure from an API rejection, a missing session or a local
//! validation error instead of collapsing everything into an empty state.

use thiserror::Error;

use crate::image_cache::ImageCacheError;
use crate::session::StorageError;

/// Errors that can occur when talking to the marketplace API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with `success: false` or a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the response envelope, or the raw body.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The envelope reported success but carried no data.
    #[error("Response has no data")]
    MissingData,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// No tokens are stored; the user must sign in.
    #[error("Not signed in")]
    NoSession,

    /// The refresh token was rejected; the stored session has been cleared.
    #[error("Session expired, sign in again")]
    SessionExpired,

    /// The refresh call failed for a reason other than rejection.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The API still answered 401 after a refresh.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A request was rejected locally before reaching the network.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Session tokens could not be read or written.
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),

    /// The image cache failed.
    #[error("Image cache error: {0}")]
    ImageCache(#[from] ImageCacheError),

    /// A URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Whether the error means the user has to sign in again.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::NoSession | Self::SessionExpired | Self::Unauthorized(_)
        )
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::NotFound("product p-1".to_string());
        assert_eq!(err.to_string(), "Not found: product p-1");

        let err = ClientError::Api {
            status: 422,
            message: "quantity exceeds stock".to_string(),
        };
        assert_eq!(err.to_string(), "API error (422): quantity exceeds stock");
    }

    #[test]
    fn test_rate_limited_error() {
        let err = ClientError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }

    #[test]
    fn test_requires_login() {
        assert!(ClientError::NoSession.requires_login());
        assert!(ClientError::SessionExpired.requires_login());
        assert!(!ClientError::MissingData.requires_login());
        assert!(!ClientError::RefreshFailed("timeout".to_string()).requires_login());
    }
}
