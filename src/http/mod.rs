//! Transport seam: the request envelope and the `Requester` that performs one exchange.

mod retry;

use async_trait::async_trait;
use std::fmt;

use crate::response::TransportResponse;
use crate::session::Session;

pub use retry::{DEFAULT_RETRIES, RETRY_DELAY_MS, RETRYABLE_ERROR_CODES, should_retry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpVerb> for reqwest::Method {
    fn from(verb: HttpVerb) -> Self {
        match verb {
            HttpVerb::Get => reqwest::Method::GET,
            HttpVerb::Post => reqwest::Method::POST,
            HttpVerb::Put => reqwest::Method::PUT,
            HttpVerb::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One attempt's request envelope. Built fresh for every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub verb: HttpVerb,
    pub uri: String,
    pub body: serde_json::Value,
    /// Send `body` even though the verb is DELETE.
    pub delete_body: bool,
    /// Value of the `Authorization` header, e.g. `Bearer <token>`.
    pub authorization: String,
}

impl ApiRequest {
    /// Whether the transport should put `body` on the wire.
    pub fn has_body(&self) -> bool {
        match self.verb {
            HttpVerb::Post | HttpVerb::Put => true,
            HttpVerb::Delete => self.delete_body,
            HttpVerb::Get => false,
        }
    }
}

/// Performs a single HTTP exchange for the dispatcher.
///
/// Implementations report every outcome, including network failures, as a
/// `TransportResponse`; the dispatcher decides what to retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Requester: Send + Sync {
    async fn execute(&self, request: &ApiRequest, session: &Session) -> TransportResponse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(verb: HttpVerb, delete_body: bool) -> ApiRequest {
        ApiRequest {
            verb,
            uri: "/shippingservices/v1/shipments".to_string(),
            body: json!({}),
            delete_body,
            authorization: "Bearer t".to_string(),
        }
    }

    #[test]
    fn test_has_body() {
        assert!(!request(HttpVerb::Get, false).has_body());
        assert!(!request(HttpVerb::Get, true).has_body());
        assert!(request(HttpVerb::Post, false).has_body());
        assert!(request(HttpVerb::Put, false).has_body());
        assert!(!request(HttpVerb::Delete, false).has_body());
        assert!(request(HttpVerb::Delete, true).has_body());
    }

    #[test]
    fn test_verb_display_and_method() {
        assert_eq!(HttpVerb::Delete.to_string(), "DELETE");
        assert_eq!(reqwest::Method::from(HttpVerb::Put), reqwest::Method::PUT);
    }
}
