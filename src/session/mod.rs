//! Caller-owned call context.
//!
//! A `Session` bundles the retry/timeout policy, the transport, the token
//! provider, the cached bearer token and per-endpoint counters. It is shared
//! by reference across calls; the token and counters use interior mutability
//! so concurrent calls can refresh and tally without `&mut`.

mod counters;

use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::auth::{AuthToken, OAuthTokenProvider, TokenProvider};
use crate::config::{AuthConfig, SessionConfig};
use crate::http::Requester;
use crate::runtime::Runtime;

pub use counters::EndpointStats;
use counters::Counters;

pub struct Session {
    config: SessionConfig,
    requester: Arc<dyn Requester>,
    token_provider: Arc<dyn TokenProvider>,
    token: RwLock<Option<AuthToken>>,
    counters: Counters,
}

impl Session {
    /// Session with no cached token and empty counters.
    pub fn new(
        config: SessionConfig,
        requester: Arc<dyn Requester>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            config,
            requester,
            token_provider,
            token: RwLock::new(None),
            counters: Counters::default(),
        }
    }

    /// Build a session from the environment, fetching tokens over OAuth.
    pub fn from_runtime<R: Runtime>(runtime: &R, requester: Arc<dyn Requester>) -> Result<Self> {
        let config = SessionConfig::from_runtime(runtime)?;
        let auth = AuthConfig::from_runtime(runtime)?;
        let provider = OAuthTokenProvider::new(&auth.base_url, auth.credentials)?;
        Ok(Self::new(config, requester, Arc::new(provider)))
    }

    /// Start with a token already cached.
    pub fn with_token(self, token: AuthToken) -> Self {
        self.set_token(token);
        self
    }

    /// Retry, timeout and failure policy.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Transport that performs the exchanges.
    pub fn requester(&self) -> &dyn Requester {
        self.requester.as_ref()
    }

    /// Source of fresh bearer tokens.
    pub fn token_provider(&self) -> &dyn TokenProvider {
        self.token_provider.as_ref()
    }

    /// The cached token, valid or not.
    pub fn token(&self) -> Option<AuthToken> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The cached token if it can be used for a request.
    pub fn valid_token(&self) -> Option<AuthToken> {
        self.token().filter(AuthToken::is_valid)
    }

    /// Cache `token`, replacing any previous one.
    pub fn set_token(&self, token: AuthToken) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Forget the cached token.
    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Drop the cached token, unless another call already replaced it.
    pub(crate) fn invalidate_token(&self, stale: &AuthToken) -> bool {
        let mut token = self.token.write().unwrap_or_else(PoisonError::into_inner);
        if token.as_ref() == Some(stale) {
            *token = None;
            true
        } else {
            false
        }
    }

    /// Tally one finished call against `uri`.
    pub(crate) fn update_counters(&self, uri: &str, success: bool, elapsed: Duration) {
        self.counters.record(uri, success, elapsed);
    }

    /// Statistics for `uri`, if it was ever called.
    pub fn endpoint_stats(&self, uri: &str) -> Option<EndpointStats> {
        self.counters.get(uri)
    }

    /// Statistics for every endpoint called so far.
    pub fn counters(&self) -> BTreeMap<String, EndpointStats> {
        self.counters.snapshot()
    }

    /// Zero all statistics.
    pub fn reset_counters(&self) {
        self.counters.reset();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("token", &self.token())
            .field("counters", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}
