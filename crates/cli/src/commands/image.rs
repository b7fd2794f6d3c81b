//! `petmart image` - image cache.

use clap::Subcommand;
use petmart_client::PetmartClient;
use serde_json::json;

use super::{CliError, print_json};

#[derive(Subcommand)]
pub enum ImageAction {
    /// Download an image (or reuse the cached copy) and print its path
    Fetch { uri: String },
    /// Drop one image from the cache
    Remove { uri: String },
    /// Show cache size
    Stats,
    /// Delete every cached image
    Clear,
}

pub async fn run(client: &PetmartClient, action: ImageAction) -> Result<(), CliError> {
    let images = client.images();

    match action {
        ImageAction::Fetch { uri } => {
            let path = images.get_or_fetch(&uri).await?;
            print_json(&json!({ "uri": uri, "path": path }))
        }
        ImageAction::Remove { uri } => {
            let removed = images.remove(&uri).await?;
            print_json(&json!({ "removed": removed }))
        }
        ImageAction::Stats => print_json(&json!({
            "dir": images.dir(),
            "entries": images.len().await,
            "bytes": images.total_bytes().await,
        })),
        ImageAction::Clear => {
            images.clear().await?;
            print_json(&json!({ "cleared": true }))
        }
    }
}
