//! Core request dispatch: token refresh, the transport call, bounded retry
//! and the time budget.
//!
//! Everything here returns an `ApiResponse`; raising on failure is left to
//! the `client` boundary.

use log::{debug, warn};
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

use crate::auth::AuthToken;
use crate::config::SessionConfig;
use crate::http::{ApiRequest, HttpVerb, should_retry};
use crate::response::{ApiResponse, ErrorDetail, INVALID_TOKEN, SERIALIZATION_ERROR};
use crate::session::Session;

/// GET `uri`; the payload still goes through serialization.
pub async fn get<T, R>(session: &Session, uri: &str, request: &R) -> ApiResponse<T>
where
    T: DeserializeOwned,
    R: Serialize + ?Sized,
{
    self::request(session, uri, HttpVerb::Get, request, false).await
}

/// POST the serialized payload to `uri`.
pub async fn post<T, R>(session: &Session, uri: &str, request: &R) -> ApiResponse<T>
where
    T: DeserializeOwned,
    R: Serialize + ?Sized,
{
    self::request(session, uri, HttpVerb::Post, request, false).await
}

/// PUT the serialized payload to `uri`.
pub async fn put<T, R>(session: &Session, uri: &str, request: &R) -> ApiResponse<T>
where
    T: DeserializeOwned,
    R: Serialize + ?Sized,
{
    self::request(session, uri, HttpVerb::Put, request, false).await
}

/// DELETE `uri` without a body on the wire.
pub async fn delete<T, R>(session: &Session, uri: &str, request: &R) -> ApiResponse<T>
where
    T: DeserializeOwned,
    R: Serialize + ?Sized,
{
    self::request(session, uri, HttpVerb::Delete, request, false).await
}

/// DELETE that still puts the serialized payload on the wire.
pub async fn delete_with_body<T, R>(session: &Session, uri: &str, request: &R) -> ApiResponse<T>
where
    T: DeserializeOwned,
    R: Serialize + ?Sized,
{
    self::request(session, uri, HttpVerb::Delete, request, true).await
}

/// Runs one logical call and records it in the session's counters.
#[tracing::instrument(skip(session, request))]
pub async fn request<T, R>(
    session: &Session,
    uri: &str,
    verb: HttpVerb,
    request: &R,
    delete_body: bool,
) -> ApiResponse<T>
where
    T: DeserializeOwned,
    R: Serialize + ?Sized,
{
    let started = Instant::now();

    let mut response = match serde_json::to_value(request) {
        Ok(body) => with_retry(session, uri, verb, body, delete_body, started).await,
        Err(e) => ApiResponse::failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            vec![ErrorDetail::new(SERIALIZATION_ERROR, e.to_string())],
        ),
    };

    let elapsed = started.elapsed();
    response.set_elapsed(elapsed);
    session.update_counters(uri, response.is_success(), elapsed);

    debug!(
        "{} {} finished with HTTP {} in {}ms",
        verb,
        uri,
        response.status().as_u16(),
        elapsed.as_millis()
    );
    response
}

/// The attempt loop. Counts down from the configured retries to 1.
///
/// No attempt starts once the time budget is spent: a pause that would
/// overrun it ends the call with `Client Timeout` instead.
async fn with_retry<T: DeserializeOwned>(
    session: &Session,
    uri: &str,
    verb: HttpVerb,
    body: serde_json::Value,
    delete_body: bool,
    started: Instant,
) -> ApiResponse<T> {
    let config = session.config();
    let retries = config.retries.max(1);
    let mut last: Option<ApiResponse<T>> = None;

    for remaining in (1..=retries).rev() {
        let attempt = retries - remaining + 1;

        if let Some(previous) = last.take() {
            if over_budget(started, config, Duration::ZERO) {
                warn!("{} {}: time budget exceeded before attempt {}", verb, uri, attempt);
                return previous.into_client_timeout();
            }
        }

        let token = match session.valid_token() {
            Some(token) => token,
            None => match refresh_token(session).await {
                Ok(token) => token,
                Err(failure) => {
                    let failure = failure.into_failure::<T>();
                    if remaining == 1 {
                        return failure;
                    }
                    if over_budget(started, config, config.retry_delay) {
                        warn!("{} {}: time budget exceeded while authenticating", verb, uri);
                        return failure.into_client_timeout();
                    }
                    warn!(
                        "{} {}: token refresh failed on attempt {}/{} (HTTP {}), retrying...",
                        verb,
                        uri,
                        attempt,
                        retries,
                        failure.status().as_u16()
                    );
                    pause(config.retry_delay).await;
                    last = Some(failure);
                    continue;
                }
            },
        };

        let request = ApiRequest {
            verb,
            uri: uri.to_string(),
            body: body.clone(),
            delete_body,
            authorization: token.authorization(),
        };
        let raw = session.requester().execute(&request, session).await;
        let response = ApiResponse::<T>::from_transport(raw);

        if response.is_success() {
            return response;
        }

        if response.is_deserialization_error() {
            debug!("{} {}: response could not be deserialized", verb, uri);
            return response;
        }

        if response.status() == StatusCode::UNAUTHORIZED && session.invalidate_token(&token) {
            debug!("{} {}: token rejected, cleared for the next call", verb, uri);
        }

        if !should_retry(response.status(), response.errors()) {
            debug!(
                "{} {}: non-retryable failure (HTTP {})",
                verb,
                uri,
                response.status().as_u16()
            );
            return response;
        }

        let upcoming = if remaining > 1 {
            config.retry_delay
        } else {
            Duration::ZERO
        };
        if over_budget(started, config, upcoming) {
            warn!("{} {}: time budget exceeded after {} attempts", verb, uri, attempt);
            return response.into_client_timeout();
        }

        if remaining > 1 {
            warn!(
                "{} {}: attempt {}/{} throttled, retrying in {}ms...",
                verb,
                uri,
                attempt,
                retries,
                config.retry_delay.as_millis()
            );
            pause(config.retry_delay).await;
        }
        last = Some(response);
    }

    // Only reachable once every attempt was throttled
    last.unwrap_or_else(|| ApiResponse::failure(StatusCode::TOO_MANY_REQUESTS, Vec::new()))
}

/// Whether waiting `upcoming` more would leave no budget for another attempt.
fn over_budget(started: Instant, config: &SessionConfig, upcoming: Duration) -> bool {
    started.elapsed() + upcoming > config.timeout
}

/// Fetches a token and caches it on the session; clears the cache on failure.
async fn refresh_token(session: &Session) -> Result<AuthToken, ApiResponse<AuthToken>> {
    debug!("No valid token cached, fetching a new one...");
    let response = session.token_provider().fetch_token().await;
    if !response.is_success() {
        session.clear_token();
        return Err(response);
    }

    match response.into_payload() {
        Some(token) if token.is_valid() => {
            debug!("Cached new token {}", token.masked());
            session.set_token(token.clone());
            Ok(token)
        }
        _ => {
            session.clear_token();
            Err(ApiResponse::failure(
                StatusCode::UNAUTHORIZED,
                vec![ErrorDetail::new(
                    INVALID_TOKEN,
                    "Token endpoint returned an empty or expired token",
                )],
            ))
        }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
