//! Petmart Core - Shared domain types.
//!
//! This crate provides the types shared by every Petmart component:
//! - `client` - Typed SDK for the marketplace REST API
//! - `cli` - Command-line front end over the SDK
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, phone numbers, languages and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
