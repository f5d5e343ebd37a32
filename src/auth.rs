use std::fmt;

use crate::error::{CiWaitError, Result};

/// CircleCI personal API token.
///
/// The value never shows up in `Debug` output so configs can be logged safely.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Validates that the token is non-empty after trimming whitespace.
    pub fn new(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CiWaitError::Config("api token has to be set".into()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_rejects_blank() {
        let err = Token::new("   ").unwrap_err();
        assert!(err.to_string().contains("api token"));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::new("secret-value").unwrap();
        assert_eq!(token.as_str(), "secret-value");
        assert!(!format!("{token:?}").contains("secret"));
    }
}
