//! Bearer tokens and the providers that mint them.

mod oauth;

use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};

use crate::response::ApiResponse;

pub use oauth::{Credentials, OAuthTokenProvider};

/// An access token and what is known about its lifetime.
///
/// Replaced wholesale on refresh, never edited in place.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    access_token: String,
    token_type: String,
    expires_at: Option<Instant>,
}

impl AuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_at: None,
        }
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Expire the token `ttl` from now.
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_at = Instant::now().checked_add(ttl);
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Usable for a request: non-empty and not yet expired.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    /// Value for the `Authorization` header. Always uses the bearer scheme.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Short form safe for logs.
    pub(crate) fn masked(&self) -> String {
        mask(&self.access_token)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &self.masked())
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub(crate) fn mask(secret: &str) -> String {
    let head: String = secret.chars().take(4).collect();
    format!("{}*********", head)
}

/// Acquires a fresh token from the auth endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> ApiResponse<AuthToken>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_validity() {
        assert!(AuthToken::new("abc").is_valid());
        assert!(!AuthToken::new("").is_valid());
        assert!(AuthToken::new("abc").expires_in(Duration::from_secs(60)).is_valid());
        assert!(!AuthToken::new("abc").expires_in(Duration::ZERO).is_valid());
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(AuthToken::new("abc").authorization(), "Bearer abc");
        let token = AuthToken::new("abc").with_token_type("BearerToken");
        assert_eq!(token.token_type(), "BearerToken");
        assert_eq!(token.authorization(), "Bearer abc");
    }

    #[test]
    fn test_debug_masks_secret() {
        let debug = format!("{:?}", AuthToken::new("supersecretvalue"));
        assert!(!debug.contains("supersecretvalue"));
        assert!(debug.contains("supe*********"));
    }
}
