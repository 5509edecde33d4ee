//! Identifier validation
//!
//! Database, table and column names arrive as untrusted strings and are
//! embedded into generated statements, so every one of them is checked here
//! first.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest identifier accepted (MariaDB's limit for database, table and column names)
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// A validated SQL identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validate a name: ASCII letters, digits and underscores, not starting with a digit
    pub fn parse(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
            return Err(Error::InvalidIdentifier(name.to_string()));
        }

        Ok(Self(name.to_string()))
    }

    /// Backtick-quoted form for statement text
    pub fn quoted(&self) -> String {
        format!("`{}`", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        for name in ["users", "_tmp", "Order_Items2", "a"] {
            assert_eq!(Identifier::parse(name).unwrap().as_str(), name);
        }
        assert!(Identifier::parse(&"x".repeat(MAX_IDENTIFIER_LEN)).is_ok());
    }

    #[test]
    fn test_rejects_injection_and_oddities() {
        for name in [
            "",
            "1abc",
            "users; DROP TABLE x",
            "a`b",
            "a]b",
            "naïve",
            "with space",
            "semi;",
        ] {
            assert!(
                matches!(Identifier::parse(name), Err(Error::InvalidIdentifier(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(Identifier::parse(&"x".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }

    #[test]
    fn test_quoted() {
        assert_eq!(Identifier::parse("t1").unwrap().quoted(), "`t1`");
    }
}
