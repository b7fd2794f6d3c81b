//! Petmart CLI - Marketplace client from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in
//! petmart auth request-otp +971501234567
//! petmart auth verify +971501234567 123456
//!
//! # Browse in Arabic
//! petmart --lang ar catalog products --category dogs
//!
//! # Fill a cart and order
//! petmart cart add prov-1 prod-9 --quantity 2
//! petmart order place prov-1 addr-1 --payment cod
//! ```
//!
//! # Commands
//!
//! - `auth` - OTP sign-in, profile, sign-out, account deletion
//! - `lang` - Show the content language
//! - `catalog` - Products, categories and providers
//! - `cart` - Per-provider carts
//! - `address` - Saved delivery addresses
//! - `order` - Place, list and cancel orders
//! - `panel` - Provider staff and incoming orders
//! - `image` - Image cache
//!
//! Results are printed to stdout as JSON. Logs go to stderr.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use petmart_client::{ClientConfig, PetmartClient};
use petmart_core::Language;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "petmart")]
#[command(author, version, about = "Petmart marketplace CLI")]
struct Cli {
    /// Content language (`en` or `ar`), overrides `PETMART_LANGUAGE`
    #[arg(long, global = true)]
    lang: Option<Language>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and manage the account
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Content language
    Lang {
        #[command(subcommand)]
        action: commands::lang::LangAction,
    },
    /// Browse the catalog
    Catalog {
        #[command(subcommand)]
        action: commands::catalog::CatalogAction,
    },
    /// Manage carts
    Cart {
        #[command(subcommand)]
        action: commands::cart::CartAction,
    },
    /// Manage delivery addresses
    Address {
        #[command(subcommand)]
        action: commands::address::AddressAction,
    },
    /// Place and track orders
    Order {
        #[command(subcommand)]
        action: commands::order::OrderAction,
    },
    /// Provider administration
    Panel {
        #[command(subcommand)]
        action: commands::panel::PanelAction,
    },
    /// Image cache
    Image {
        #[command(subcommand)]
        action: commands::image::ImageAction,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "petmart_client=info,petmart_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Sentry must be initialized before the tracing subscriber
    let config = ClientConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result = match config {
        Ok(mut config) => {
            if let Some(lang) = cli.lang {
                config.language = lang;
            }
            run(&config, cli.command).await
        }
        Err(e) => Err(CliError::from(e)),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(config: &ClientConfig, command: Commands) -> Result<(), CliError> {
    let client = PetmartClient::new(config)?;

    match command {
        Commands::Auth { action } => commands::auth::run(&client, action).await,
        Commands::Lang { action } => commands::lang::run(&client, action).await,
        Commands::Catalog { action } => commands::catalog::run(&client, action).await,
        Commands::Cart { action } => commands::cart::run(&client, action).await,
        Commands::Address { action } => commands::address::run(&client, action).await,
        Commands::Order { action } => commands::order::run(&client, action).await,
        Commands::Panel { action } => commands::panel::run(&client, action).await,
        Commands::Image { action } => commands::image::run(&client, action).await,
    }
}
