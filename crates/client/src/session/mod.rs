//! Session lifecycle: stored tokens, validity checks and refresh.
//!
//! Tokens are created by OTP verification, refreshed on demand once the
//! access token expires, and deleted on logout or account deletion.
//!
//! # Single-flight refresh
//!
//! All refreshes go through one async mutex. A caller that finds the access
//! token expired takes the lock and checks validity again before calling the
//! API, so concurrent callers that raced on an expired token end up sharing
//! the refresh performed by whichever got the lock first. A refresh forced by
//! a 401 compares the rejected token with the current one and skips the call
//! when another caller already replaced it.

mod storage;
mod token;

pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage, StorageError};
pub use token::{SessionTokens, TokenDecodeError, TokenStatus, decode_expiry, token_status};

#[cfg(test)]
pub(crate) use token::test_jwt;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::http::{Envelope, REQUEST_ID_HEADER, truncate_body};

/// Data returned by `POST /api/auth/refresh`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Owns the signed-in user's tokens and keeps the access token fresh.
pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
    tokens: RwLock<Option<SessionTokens>>,
    refresh_lock: Mutex<()>,
    http: reqwest::Client,
    refresh_url: Url,
    leeway_secs: i64,
    refreshes: AtomicU64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("refresh_url", &self.refresh_url.as_str())
            .field("leeway_secs", &self.leeway_secs)
            .field("refreshes", &self.refreshes.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager, loading any previously persisted tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be read.
    pub fn new(
        storage: Arc<dyn SessionStorage>,
        http: reqwest::Client,
        refresh_url: Url,
        leeway_secs: i64,
    ) -> std::result::Result<Self, StorageError> {
        let tokens = storage.load()?;
        if tokens.is_some() {
            debug!("Loaded persisted session");
        }

        Ok(Self {
            storage,
            tokens: RwLock::new(tokens),
            refresh_lock: Mutex::new(()),
            http,
            refresh_url,
            leeway_secs,
            refreshes: AtomicU64::new(0),
        })
    }

    /// The stored tokens, if any.
    pub async fn current(&self) -> Option<SessionTokens> {
        self.tokens.read().await.clone()
    }

    /// Whether tokens are stored (they may still need a refresh).
    pub async fn is_authenticated(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    /// Validity of the stored access token right now.
    pub async fn status(&self) -> TokenStatus {
        self.tokens.read().await.as_ref().map_or(TokenStatus::Absent, |t| {
            t.status(chrono::Utc::now().timestamp(), self.leeway_secs)
        })
    }

    /// Number of refresh calls this manager has sent.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Store tokens obtained from a login.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokens cannot be persisted.
    pub async fn set_tokens(&self, tokens: SessionTokens) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        self.store_locked(tokens).await
    }

    /// Delete the stored tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be written.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        self.clear_locked().await
    }

    /// Return a usable access token, refreshing it first if it has expired.
    ///
    /// # Errors
    ///
    /// - `ClientError::NoSession` if nothing is stored
    /// - `ClientError::SessionExpired` if the refresh token is missing or rejected
    /// - `ClientError::RefreshFailed` if the refresh call fails otherwise
    #[instrument(skip(self))]
    pub async fn ensure_valid_token(&self) -> Result<SecretString> {
        if let Some(token) = self.valid_access_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = self.valid_access_token().await {
            debug!("Access token refreshed by a concurrent caller");
            return Ok(token);
        }

        self.refresh_locked().await
    }

    /// Refresh after the server rejected `rejected` with a 401.
    ///
    /// If the stored access token already differs from `rejected`, it was
    /// replaced by a concurrent refresh and is returned without a new call.
    ///
    /// # Errors
    ///
    /// Same as [`Self::ensure_valid_token`].
    #[instrument(skip_all)]
    pub async fn force_refresh(&self, rejected: &SecretString) -> Result<SecretString> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(tokens) = self.tokens.read().await.as_ref()
            && tokens.access_token.expose_secret() != rejected.expose_secret()
        {
            debug!("Rejected token already replaced by a concurrent refresh");
            return Ok(tokens.access_token.clone());
        }

        self.refresh_locked().await
    }

    async fn valid_access_token(&self) -> Option<SecretString> {
        let now = chrono::Utc::now().timestamp();
        self.tokens
            .read()
            .await
            .as_ref()
            .filter(|t| t.status(now, self.leeway_secs) == TokenStatus::Valid)
            .map(|t| t.access_token.clone())
    }

    /// Exchange the refresh token. Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<SecretString> {
        let Some(tokens) = self.tokens.read().await.clone() else {
            return Err(ClientError::NoSession);
        };

        let Some(refresh_token) = tokens.refresh_token else {
            warn!("Access token expired and no refresh token is stored");
            self.clear_locked().await?;
            return Err(ClientError::SessionExpired);
        };

        info!("Refreshing access token");
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        let response = self
            .http
            .post(self.refresh_url.clone())
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
            .json(&serde_json::json!({ "refreshToken": refresh_token.expose_secret() }))
            .send()
            .await
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            warn!(status = %status, "Refresh token rejected, clearing session");
            self.clear_locked().await?;
            return Err(ClientError::SessionExpired);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(ClientError::RefreshFailed(format!(
                "HTTP {status}: {}",
                truncate_body(&body)
            )));
        }

        let envelope: Envelope<RefreshData> = serde_json::from_str(&body)
            .map_err(|e| ClientError::RefreshFailed(format!("invalid response: {e}")))?;

        if !envelope.success {
            return Err(ClientError::RefreshFailed(
                envelope
                    .message
                    .unwrap_or_else(|| "refresh rejected".to_string()),
            ));
        }

        let data = envelope
            .data
            .ok_or_else(|| ClientError::RefreshFailed("response has no tokens".to_string()))?;

        // The server may rotate the refresh token or leave it as is
        let refreshed = SessionTokens {
            access_token: SecretString::from(data.access_token),
            refresh_token: Some(
                data.refresh_token
                    .map_or(refresh_token, SecretString::from),
            ),
        };
        let access = refreshed.access_token.clone();
        self.store_locked(refreshed).await?;

        info!("Access token refreshed");
        Ok(access)
    }

    async fn store_locked(&self, tokens: SessionTokens) -> Result<()> {
        self.storage.save(&tokens)?;
        *self.tokens.write().await = Some(tokens);
        Ok(())
    }

    async fn clear_locked(&self) -> Result<()> {
        self.storage.clear()?;
        *self.tokens.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn manager(storage: Arc<dyn SessionStorage>) -> SessionManager {
        // Port 9 (discard) on localhost: any refresh attempt fails fast
        let url = Url::parse("http://127.0.0.1:9/api/auth/refresh").unwrap();
        SessionManager::new(storage, reqwest::Client::new(), url, 30).unwrap()
    }

    fn in_one_hour() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_no_session() {
        let session = manager(Arc::new(MemorySessionStorage::new()));
        assert_eq!(session.status().await, TokenStatus::Absent);
        assert!(matches!(
            session.ensure_valid_token().await,
            Err(ClientError::NoSession)
        ));
        assert_eq!(session.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_needs_no_refresh() {
        let access = test_jwt(Some(in_one_hour()));
        let storage = MemorySessionStorage::with_tokens(SessionTokens::new(
            access.clone(),
            Some("refresh".into()),
        ));
        let session = manager(Arc::new(storage));

        let token = session.ensure_valid_token().await.unwrap();
        assert_eq!(token.expose_secret(), access);
        assert_eq!(session.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_clears_session() {
        let storage = Arc::new(MemorySessionStorage::with_tokens(SessionTokens::new(
            test_jwt(Some(0)),
            None,
        )));
        let session = manager(storage.clone());

        assert!(matches!(
            session.ensure_valid_token().await,
            Err(ClientError::SessionExpired)
        ));
        assert!(!session.is_authenticated().await);
        assert!(storage.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_transport_failure_keeps_session() {
        let session = manager(Arc::new(MemorySessionStorage::with_tokens(
            SessionTokens::new(test_jwt(Some(0)), Some("refresh".into())),
        )));

        let result = session.ensure_valid_token().await;
        assert!(matches!(result, Err(ClientError::RefreshFailed(_))));
        assert!(session.is_authenticated().await);
        assert_eq!(session.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_skips_when_token_replaced() {
        let current = test_jwt(Some(in_one_hour()));
        let session = manager(Arc::new(MemorySessionStorage::with_tokens(
            SessionTokens::new(current.clone(), Some("refresh".into())),
        )));

        let stale = SecretString::from("an-older-token".to_string());
        let token = session.force_refresh(&stale).await.unwrap();
        assert_eq!(token.expose_secret(), current);
        assert_eq!(session.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_set_and_clear_tokens_persist() {
        let storage = Arc::new(MemorySessionStorage::new());
        let session = manager(storage.clone());

        session
            .set_tokens(SessionTokens::new(test_jwt(Some(in_one_hour())), None))
            .await
            .unwrap();
        assert!(storage.load().unwrap().is_some());
        assert_eq!(session.status().await, TokenStatus::Valid);

        session.clear().await.unwrap();
        assert!(storage.load().unwrap().is_none());
        assert_eq!(session.status().await, TokenStatus::Absent);
    }
}
