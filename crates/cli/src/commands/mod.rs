//! Subcommand implementations.
//!
//! Each module owns its `clap` subcommand enum and a `run` function that
//! calls the SDK and prints the result as JSON.

pub mod address;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod image;
pub mod lang;
pub mod order;
pub mod panel;

use petmart_client::{ClientError, ConfigError, ImageCacheError};
use serde::Serialize;
use thiserror::Error;

/// Errors that end a CLI invocation.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The SDK call failed.
    #[error("{0}")]
    Client(#[from] ClientError),

    /// The image cache failed.
    #[error("{0}")]
    ImageCache(#[from] ImageCacheError),

    /// The result could not be serialized.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Print `value` to stdout as pretty JSON.
#[allow(clippy::print_stdout)]
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
