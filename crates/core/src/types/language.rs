//! Display language preference.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a language code is not supported.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported language: {0} (expected en or ar)")]
pub struct LanguageError(pub String);

/// Languages the marketplace serves content in.
///
/// Sent to the backend as the `Accept-Language` header on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
}

impl Language {
    /// Value for the `Accept-Language` header.
    #[must_use]
    pub const fn as_header(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ar => "ar",
        }
    }

    /// Whether text in this language reads right to left.
    #[must_use]
    pub const fn is_rtl(&self) -> bool {
        matches!(self, Self::Ar)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_header())
    }
}

impl std::str::FromStr for Language {
    type Err = LanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en-gb" | "english" => Ok(Self::En),
            "ar" | "ar-ae" | "ar-sa" | "arabic" => Ok(Self::Ar),
            other => Err(LanguageError(other.to_owned())),
        }
    }
}
