//! Core types for Petmart.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod language;
pub mod phone;
pub mod price;
pub mod status;

pub use id::*;
pub use language::{Language, LanguageError};
pub use phone::{PhoneError, PhoneNumber};
pub use price::{CurrencyCode, Price};
pub use status::*;
