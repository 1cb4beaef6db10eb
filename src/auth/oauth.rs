//! OAuth client-credentials token provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;

use super::{AuthToken, TokenProvider, mask};
use crate::response::{ApiResponse, ErrorDetail, TRANSPORT_ERROR};

/// Auth endpoint response types (internal).
mod api {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    pub struct TokenResponse {
        pub access_token: String,
        #[serde(rename = "tokenType", alias = "token_type", default)]
        pub token_type: Option<String>,
        /// Seconds; the endpoint sends either a number or a numeric string.
        #[serde(rename = "expiresIn", alias = "expires_in", default)]
        pub expires_in: Option<serde_json::Value>,
    }

    impl TokenResponse {
        pub fn expires_in_secs(&self) -> Option<u64> {
            match self.expires_in.as_ref()? {
                serde_json::Value::Number(n) => n.as_u64(),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
        }
    }
}

/// API key and secret used for the client-credentials grant.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &"*********")
            .finish()
    }
}

/// Fetches tokens from `{base_url}/oauth/token`.
pub struct OAuthTokenProvider {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl OAuthTokenProvider {
    /// Create a provider with its own HTTP client.
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .context("Failed to build HTTP client for the auth endpoint")?;
        Ok(Self::with_client(client, base_url, credentials))
    }

    /// Create from an existing reqwest Client.
    pub fn with_client(client: Client, base_url: &str, credentials: Credentials) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }

    fn transport_failure(status: StatusCode, error: &reqwest::Error) -> ApiResponse<AuthToken> {
        ApiResponse::failure(status, vec![ErrorDetail::new(TRANSPORT_ERROR, error.to_string())])
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    #[tracing::instrument(skip(self))]
    async fn fetch_token(&self) -> ApiResponse<AuthToken> {
        let url = self.token_url();
        debug!(
            "Requesting access token from {} for key {}...",
            url,
            mask(&self.credentials.api_key)
        );

        let response = match self
            .client
            .post(&url)
            .basic_auth(&self.credentials.api_key, Some(&self.credentials.api_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Token request to {} failed: {}", url, e);
                return Self::transport_failure(StatusCode::SERVICE_UNAVAILABLE, &e);
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read token response body: {}", e);
                return Self::transport_failure(status, &e);
            }
        };

        if !status.is_success() {
            debug!("Token endpoint answered HTTP {}", status.as_u16());
            return ApiResponse::failure(status, ErrorDetail::parse_body(status, &body));
        }

        let parsed = match serde_json::from_str::<api::TokenResponse>(&body) {
            Ok(parsed) => parsed,
            Err(e) => return ApiResponse::deserialization_error(e),
        };

        let mut token = AuthToken::new(parsed.access_token.clone());
        if let Some(token_type) = &parsed.token_type {
            token = token.with_token_type(token_type.clone());
        }
        if let Some(secs) = parsed.expires_in_secs() {
            token = token.expires_in(Duration::from_secs(secs));
        }

        debug!("Obtained access token {}", token.masked());
        ApiResponse::success(status, token)
    }
}
