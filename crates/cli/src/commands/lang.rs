//! `petmart lang` - content language.

use clap::Subcommand;
use petmart_client::PetmartClient;
use serde_json::json;

use super::{CliError, print_json};

#[derive(Subcommand)]
pub enum LangAction {
    /// Show the language requests are sent in (set with `--lang` or `PETMART_LANGUAGE`)
    Show,
}

pub async fn run(client: &PetmartClient, action: LangAction) -> Result<(), CliError> {
    match action {
        LangAction::Show => {
            let language = client.language().await;
            print_json(&json!({
                "language": language,
                "acceptLanguage": language.as_header(),
                "rtl": language.is_rtl(),
            }))
        }
    }
}
