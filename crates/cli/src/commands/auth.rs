//! `petmart auth` - OTP sign-in and account management.

use clap::Subcommand;
use petmart_client::PetmartClient;
use petmart_core::PhoneNumber;
use serde_json::json;

use super::{CliError, print_json};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Text a one-time code to a phone number
    RequestOtp {
        /// Phone number, e.g. +971501234567
        phone: PhoneNumber,
    },
    /// Exchange a one-time code for a session
    Verify {
        phone: PhoneNumber,
        /// The code received by SMS
        code: String,
    },
    /// Show the signed-in user
    Me,
    /// Show whether a session is stored and its token state
    Status,
    /// Sign out and delete the stored session
    Logout,
    /// Permanently delete the account
    DeleteAccount,
}

pub async fn run(client: &PetmartClient, action: AuthAction) -> Result<(), CliError> {
    match action {
        AuthAction::RequestOtp { phone } => {
            client.request_otp(&phone).await?;
            print_json(&json!({ "sent": true, "phone": phone }))
        }
        AuthAction::Verify { phone, code } => {
            let user = client.verify_otp(&phone, &code).await?;
            print_json(&user)
        }
        AuthAction::Me => print_json(&client.me().await?),
        AuthAction::Status => {
            let session = client.session();
            let expires_at = session
                .current()
                .await
                .and_then(|tokens| tokens.access_expires_at());
            print_json(&json!({
                "status": format!("{:?}", session.status().await).to_lowercase(),
                "accessExpiresAt": expires_at,
            }))
        }
        AuthAction::Logout => {
            client.logout().await?;
            print_json(&json!({ "signedOut": true }))
        }
        AuthAction::DeleteAccount => {
            client.delete_account().await?;
            print_json(&json!({ "deleted": true }))
        }
    }
}
