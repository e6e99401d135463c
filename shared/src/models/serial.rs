//! Serial number tokens

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single serial identifier
///
/// Tokens made only of ASCII digits are stored as numbers, so "007" and "7"
/// name the same unit. Everything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Serial {
    Number(u64),
    Text(String),
}

impl Serial {
    /// Normalize a raw token
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = token.parse::<u64>() {
                return Serial::Number(n);
            }
        }
        Serial::Text(token.to_string())
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            Serial::Number(n) => Some(*n),
            Serial::Text(_) => None,
        }
    }
}

impl From<u64> for Serial {
    fn from(n: u64) -> Self {
        Serial::Number(n)
    }
}

impl From<&str> for Serial {
    fn from(s: &str) -> Self {
        Serial::parse(s)
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Serial::Number(n) => write!(f, "{}", n),
            Serial::Text(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_tokens_normalize() {
        assert_eq!(Serial::parse("007"), Serial::Number(7));
        assert_eq!(Serial::parse("7"), Serial::Number(7));
    }

    #[test]
    fn test_text_tokens_verbatim() {
        assert_eq!(Serial::parse("A-1"), Serial::Text("A-1".to_string()));
        assert_eq!(Serial::parse("1.5"), Serial::Text("1.5".to_string()));
    }

    #[test]
    fn test_oversized_number_is_text() {
        let huge = "99999999999999999999999";
        assert_eq!(Serial::parse(huge), Serial::Text(huge.to_string()));
    }
}
