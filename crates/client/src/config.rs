//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PETMART_API_BASE_URL` - Base URL of the marketplace REST API
//!
//! ## Optional
//! - `PETMART_LANGUAGE` - Initial content language, `en` or `ar` (default: en)
//! - `PETMART_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `PETMART_SESSION_FILE` - Where session tokens are persisted (default: .petmart/session.json)
//! - `PETMART_IMAGE_CACHE_DIR` - Image cache directory (default: .petmart/images)
//! - `PETMART_IMAGE_CACHE_MAX_BYTES` - Upper bound for the image cache (default: unbounded)
//! - `PETMART_CATALOG_CACHE_TTL_SECS` - Catalog response cache lifetime (default: 300)
//! - `PETMART_TOKEN_LEEWAY_SECS` - Refresh tokens this long before `exp` (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use petmart_core::Language;
use thiserror::Error;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CATALOG_TTL_SECS: u64 = 300;
const DEFAULT_TOKEN_LEEWAY_SECS: i64 = 30;
const DEFAULT_SESSION_FILE: &str = ".petmart/session.json";
const DEFAULT_IMAGE_CACHE_DIR: &str = ".petmart/images";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Marketplace client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API (paths such as `/api/cart` are joined onto it)
    pub base_url: Url,
    /// Language sent as `Accept-Language` until changed at runtime
    pub language: Language,
    /// Per-request timeout
    pub timeout: Duration,
    /// File holding the persisted session tokens
    pub session_file: PathBuf,
    /// Directory for downloaded images
    pub image_cache_dir: PathBuf,
    /// Optional size bound for the image cache
    pub image_cache_max_bytes: Option<u64>,
    /// Lifetime of cached catalog responses
    pub catalog_cache_ttl: Duration,
    /// Seconds before `exp` at which an access token is treated as expired
    pub token_leeway_secs: i64,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL does not parse or is
    /// not http(s).
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url("PETMART_API_BASE_URL", base_url)?,
            language: Language::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            image_cache_dir: PathBuf::from(DEFAULT_IMAGE_CACHE_DIR),
            image_cache_max_bytes: None,
            catalog_cache_ttl: Duration::from_secs(DEFAULT_CATALOG_TTL_SECS),
            token_leeway_secs: DEFAULT_TOKEN_LEEWAY_SECS,
            sentry_dsn: None,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url = get_required_env("PETMART_API_BASE_URL")?;
        let mut config = Self::new(&base_url)?;

        config.language = get_parsed_env("PETMART_LANGUAGE", Language::En)?;
        config.timeout = Duration::from_secs(get_parsed_env(
            "PETMART_HTTP_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?);
        config.session_file = PathBuf::from(get_env_or_default(
            "PETMART_SESSION_FILE",
            DEFAULT_SESSION_FILE,
        ));
        config.image_cache_dir = PathBuf::from(get_env_or_default(
            "PETMART_IMAGE_CACHE_DIR",
            DEFAULT_IMAGE_CACHE_DIR,
        ));
        config.image_cache_max_bytes = get_optional_env("PETMART_IMAGE_CACHE_MAX_BYTES")
            .map(|v| parse_value("PETMART_IMAGE_CACHE_MAX_BYTES", &v))
            .transpose()?;
        config.catalog_cache_ttl = Duration::from_secs(get_parsed_env(
            "PETMART_CATALOG_CACHE_TTL_SECS",
            DEFAULT_CATALOG_TTL_SECS,
        )?);
        config.token_leeway_secs =
            get_parsed_env("PETMART_TOKEN_LEEWAY_SECS", DEFAULT_TOKEN_LEEWAY_SECS)?;
        config.sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(config)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn get_parsed_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |v| parse_value(key, &v))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse the API base URL, requiring an http(s) scheme.
///
/// A trailing slash is ensured so relative joins keep any path prefix.
fn parse_base_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_applies_defaults() {
        let config = ClientConfig::new("https://api.petmart.test").unwrap();
        assert_eq!(config.base_url.as_str(), "https://api.petmart.test/");
        assert_eq!(config.language, Language::En);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.catalog_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.token_leeway_secs, 30);
        assert!(config.image_cache_max_bytes.is_none());
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let config = ClientConfig::new("https://host.test/v2").unwrap();
        assert_eq!(config.base_url.as_str(), "https://host.test/v2/");
        assert_eq!(
            config.base_url.join("api/cart").unwrap().as_str(),
            "https://host.test/v2/api/cart"
        );
    }

    #[test]
    fn test_base_url_rejects_other_schemes() {
        let result = ClientConfig::new("ftp://host.test");
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_base_url_rejects_garbage() {
        assert!(ClientConfig::new("not a url").is_err());
    }

    #[test]
    fn test_parse_value_reports_key() {
        let err = parse_value::<u64>("PETMART_HTTP_TIMEOUT_SECS", "soon").unwrap_err();
        assert!(err.to_string().contains("PETMART_HTTP_TIMEOUT_SECS"));
    }

    #[test]
    fn test_parse_value_trims() {
        let value: u64 = parse_value("K", " 42 ").unwrap();
        assert_eq!(value, 42);
    }
}
