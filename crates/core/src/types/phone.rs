//! Phone number type used for OTP login.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PhoneNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input string is empty.
    #[error("phone number cannot be empty")]
    Empty,
    /// The input contains something other than digits, separators or a leading +.
    #[error("phone number contains invalid character '{0}'")]
    InvalidCharacter(char),
    /// Too few or too many digits.
    #[error("phone number must have between {min} and {max} digits (got {got})")]
    InvalidLength {
        /// Minimum digit count.
        min: usize,
        /// Maximum digit count.
        max: usize,
        /// Digits found.
        got: usize,
    },
}

/// A normalized phone number.
///
/// Spaces, dashes and parentheses are stripped; a single leading `+` is
/// kept. The remaining digits must number between 7 and 15 (E.164 limit).
///
/// ## Examples
///
/// ```
/// use petmart_core::PhoneNumber;
///
/// let phone = PhoneNumber::parse("+971 50-123 4567").unwrap();
/// assert_eq!(phone.as_str(), "+971501234567");
///
/// assert!(PhoneNumber::parse("").is_err());
/// assert!(PhoneNumber::parse("12ab").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Minimum digit count.
    pub const MIN_DIGITS: usize = 7;
    /// Maximum digit count (E.164).
    pub const MAX_DIGITS: usize = 15;

    /// Parse and normalize a phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, contains characters other than
    /// digits and separators, or has an invalid number of digits.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PhoneError::Empty);
        }

        let mut normalized = String::with_capacity(trimmed.len());
        let mut digits = 0;
        for (i, c) in trimmed.chars().enumerate() {
            match c {
                '+' if i == 0 => normalized.push(c),
                '0'..='9' => {
                    digits += 1;
                    normalized.push(c);
                }
                ' ' | '-' | '(' | ')' => {}
                other => return Err(PhoneError::InvalidCharacter(other)),
            }
        }

        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits) {
            return Err(PhoneError::InvalidLength {
                min: Self::MIN_DIGITS,
                max: Self::MAX_DIGITS,
                got: digits,
            });
        }

        Ok(Self(normalized))
    }

    /// Returns the normalized number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `PhoneNumber` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_separators() {
        let phone = PhoneNumber::parse(" +1 (555) 010-9999 ").unwrap();
        assert_eq!(phone.as_str(), "+15550109999");
    }

    #[test]
    fn test_parse_without_plus() {
        assert_eq!(PhoneNumber::parse("0501234567").unwrap().as_str(), "0501234567");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(PhoneNumber::parse("   "), Err(PhoneError::Empty));
    }

    #[test]
    fn test_plus_only_allowed_first() {
        assert_eq!(
            PhoneNumber::parse("050+1234567"),
            Err(PhoneError::InvalidCharacter('+'))
        );
    }

    #[test]
    fn test_parse_letters() {
        assert!(matches!(
            PhoneNumber::parse("050abc4567"),
            Err(PhoneError::InvalidCharacter('a'))
        ));
    }

    #[test]
    fn test_digit_bounds() {
        assert!(matches!(
            PhoneNumber::parse("123456"),
            Err(PhoneError::InvalidLength { got: 6, .. })
        ));
        assert!(PhoneNumber::parse("1234567").is_ok());
        assert!(PhoneNumber::parse(&"9".repeat(15)).is_ok());
        assert!(PhoneNumber::parse(&"9".repeat(16)).is_err());
    }
}
