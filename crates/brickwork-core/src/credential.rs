//! Bearer credentials.
//!
//! A [`BearerToken`] is an immutable value. Managers that need to act as a
//! different identity take a new token and hand back a new handle instead
//! of swapping a header on a shared instance.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// An opaque bearer token for the workspace control plane.
#[derive(Clone)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Returns the raw token for placing in an `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Returns true when the token is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

impl From<String> for BearerToken {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl From<&str> for BearerToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let token = BearerToken::new("dapi-secret-value");
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("dapi-secret-value"));
        assert!(rendered.contains("REDACTED"));
        assert_eq!(token.expose(), "dapi-secret-value");
    }

    #[test]
    fn blank_detection() {
        assert!(BearerToken::new("  ").is_blank());
        assert!(!BearerToken::new("x").is_blank());
    }
}
