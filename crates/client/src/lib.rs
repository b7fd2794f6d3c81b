//! Petmart Client - Typed SDK for the Petmart marketplace REST API.
//!
//! The client owns everything a front end needs to talk to the marketplace:
//! the signed-in session (with proactive and reactive token refresh), the
//! content language, a cached catalog, an optimistic per-provider cart
//! mirror and a disk cache for images.
//!
//! # Example
//!
//! ```rust,ignore
//! use petmart_client::{ClientConfig, PetmartClient, ProductQuery};
//!
//! let config = ClientConfig::from_env()?;
//! let client = PetmartClient::new(&config)?;
//!
//! let page = client.products(&ProductQuery::default()).await?;
//! for product in page.items {
//!     println!("{} - {}", product.name, product.price);
//! }
//! ```
//!
//! # Modules
//!
//! - [`session`] - Token storage, expiry checks and single-flight refresh
//! - [`config`] - Environment-driven configuration
//! - [`image_cache`] - Disk cache for remote images
//!
//! Endpoint groups (`auth`, `catalog`, `cart`, `addresses`, `orders`,
//! `panel`) are methods on [`PetmartClient`].

#![cfg_attr(not(test), forbid(unsafe_code))]

mod addresses;
mod auth;
mod cart;
pub mod catalog;
mod client;
pub mod config;
mod error;
mod http;
pub mod image_cache;
mod orders;
mod panel;
pub mod session;
mod types;

pub use client::PetmartClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, Result};
pub use http::REQUEST_ID_HEADER;
pub use image_cache::{ImageCache, ImageCacheError};
pub use session::{SessionManager, SessionStorage, SessionTokens, TokenStatus};
pub use types::*;
