//! Phone/OTP authentication.
//!
//! # Flow
//!
//! 1. `request_otp()` asks the backend to text a one-time code
//! 2. `verify_otp()` exchanges the code for an access/refresh token pair
//! 3. Tokens are persisted and attached to subsequent requests
//! 4. `logout()` or `delete_account()` deletes them

use serde::Deserialize;
use tracing::{info, instrument, warn};

use petmart_core::PhoneNumber;

use crate::client::PetmartClient;
use crate::error::{ClientError, Result};
use crate::http::{ApiRequest, AuthMode};
use crate::session::SessionTokens;
use crate::types::User;

/// Data returned by `POST /api/auth/verify-otp`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyOtpData {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: User,
}

impl PetmartClient {
    /// Ask the backend to send a one-time code to `phone`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the number or the request fails.
    #[instrument(skip(self), fields(phone = %phone))]
    pub async fn request_otp(&self, phone: &PhoneNumber) -> Result<()> {
        self.execute(
            ApiRequest::post("api/auth/request-otp")
                .auth(AuthMode::None)
                .json(serde_json::json!({ "phone": phone })),
        )
        .await?;

        info!("OTP requested");
        Ok(())
    }

    /// Verify the code sent to `phone` and start a session.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidInput` for an empty or non-numeric code,
    /// or an API error if the backend rejects it.
    #[instrument(skip(self, code), fields(phone = %phone))]
    pub async fn verify_otp(&self, phone: &PhoneNumber, code: &str) -> Result<User> {
        let code = code.trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ClientError::InvalidInput(
                "OTP must be a non-empty string of digits".to_string(),
            ));
        }

        let data: VerifyOtpData = self
            .fetch(
                ApiRequest::post("api/auth/verify-otp")
                    .auth(AuthMode::None)
                    .json(serde_json::json!({ "phone": phone, "otp": code })),
            )
            .await?;

        self.session()
            .set_tokens(SessionTokens::new(data.access_token, data.refresh_token))
            .await?;

        // A new user may see different carts; drop anything mirrored before
        self.forget_all_carts().await;

        info!(user_id = %data.user.id, "Signed in");
        Ok(data.user)
    }

    /// Profile of the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoSession` when signed out, or any API error.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<User> {
        self.fetch(ApiRequest::get("api/auth/me")).await
    }

    /// Sign out.
    ///
    /// The server is told on a best-effort basis; local tokens and the cart
    /// mirror are deleted regardless of the network result.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local session cannot be cleared.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        if self.session().is_authenticated().await
            && let Err(e) = self.execute(ApiRequest::post("api/auth/logout")).await
        {
            warn!(error = %e, "Server-side logout failed, clearing local session anyway");
        }

        self.end_session().await?;
        info!("Signed out");
        Ok(())
    }

    /// Permanently delete the signed-in user's account, then sign out.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion request fails; the session is kept in
    /// that case so the user can retry.
    #[instrument(skip(self))]
    pub async fn delete_account(&self) -> Result<()> {
        self.execute(ApiRequest::delete("api/auth/account")).await?;
        self.end_session().await?;
        info!("Account deleted");
        Ok(())
    }

    async fn end_session(&self) -> Result<()> {
        self.session().clear().await?;
        self.forget_all_carts().await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ClientConfig;
    use crate::session::MemorySessionStorage;

    #[tokio::test]
    async fn test_verify_otp_rejects_non_numeric_code_locally() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::new("http://127.0.0.1:9").unwrap();
        config.image_cache_dir = dir.path().to_path_buf();
        let client =
            PetmartClient::with_storage(&config, Arc::new(MemorySessionStorage::new())).unwrap();
        let phone = PhoneNumber::parse("+971501234567").unwrap();

        for code in ["", "  ", "12a4"] {
            assert!(matches!(
                client.verify_otp(&phone, code).await,
                Err(ClientError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_logout_when_signed_out_is_local_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::new("http://127.0.0.1:9").unwrap();
        config.image_cache_dir = dir.path().to_path_buf();
        let client =
            PetmartClient::with_storage(&config, Arc::new(MemorySessionStorage::new())).unwrap();

        client.logout().await.unwrap();
        assert!(!client.session().is_authenticated().await);
    }
}
