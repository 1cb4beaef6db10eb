//! Request dispatch for the shipping service API.
//!
//! Every resource call funnels through [`dispatch::request`], which turns a
//! typed payload into an authenticated exchange on the session's
//! [`Requester`], refreshes the bearer token when needed, retries throttled
//! calls within a count and a wall-clock budget, and reports the outcome as
//! an [`ApiResponse`]. [`ShippingApi`] adds a default session and the
//! optional raise-on-failure policy.

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod response;
pub mod runtime;
pub mod session;

pub use auth::{AuthToken, Credentials, OAuthTokenProvider, TokenProvider};
pub use client::ShippingApi;
pub use config::{AuthConfig, SessionConfig};
pub use http::{ApiRequest, HttpVerb, Requester};
pub use response::{ApiError, ApiResponse, ErrorDetail, Outcome, TransportResponse};
pub use session::{EndpointStats, Session};

/// User agent sent to the auth endpoint.
pub const USER_AGENT: &str = concat!("shipping-api-rs/", env!("SHIPPING_API_VERSION"));

/// Test doubles shared by the unit tests.
#[cfg(test)]
pub mod test_utils {
    use crate::auth::{AuthToken, TokenProvider};
    use crate::config::SessionConfig;
    use crate::http::{ApiRequest, Requester};
    use crate::response::{ApiResponse, ErrorDetail, TransportResponse};
    use crate::session::Session;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Config with no pause between attempts and a generous budget.
    pub fn fast_config() -> SessionConfig {
        SessionConfig::default()
            .with_retry_delay(Duration::ZERO)
            .with_timeout(Duration::from_secs(30))
    }

    /// A gateway throttling response.
    pub fn throttled() -> TransportResponse {
        TransportResponse::failure(
            StatusCode::TOO_MANY_REQUESTS,
            vec![ErrorDetail::new("PB-APIM-ERR-1003", "Spike arrest violation")],
        )
    }

    /// Replays `responses` in order, repeating the last one once exhausted.
    /// Records every request it sees.
    pub struct ScriptedRequester {
        responses: Mutex<VecDeque<TransportResponse>>,
        pub requests: Mutex<Vec<ApiRequest>>,
    }

    impl ScriptedRequester {
        pub fn new(responses: Vec<TransportResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Requester for ScriptedRequester {
        async fn execute(&self, request: &ApiRequest, _session: &Session) -> TransportResponse {
            self.requests.lock().unwrap().push(request.clone());
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses
                    .front()
                    .cloned()
                    .unwrap_or_else(|| TransportResponse::ok(serde_json::Value::Null))
            }
        }
    }

    /// Replays token responses the same way.
    pub struct ScriptedTokenProvider {
        responses: Mutex<VecDeque<ApiResponse<AuthToken>>>,
    }

    impl ScriptedTokenProvider {
        pub fn new(responses: Vec<ApiResponse<AuthToken>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl TokenProvider for ScriptedTokenProvider {
        async fn fetch_token(&self) -> ApiResponse<AuthToken> {
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap_or_else(|| {
                    ApiResponse::success(StatusCode::OK, AuthToken::new("scripted-token"))
                })
            }
        }
    }

    /// Session over scripted doubles.
    pub fn session_with(
        config: SessionConfig,
        responses: Vec<TransportResponse>,
        tokens: Vec<ApiResponse<AuthToken>>,
    ) -> Session {
        Session::new(
            config,
            Arc::new(ScriptedRequester::new(responses)),
            Arc::new(ScriptedTokenProvider::new(tokens)),
        )
    }
}
