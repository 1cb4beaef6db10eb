//! Response envelope shared by every call, plus the error raised at the boundary.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Error code of the entry added when the time budget runs out.
pub const CLIENT_TIMEOUT: &str = "Client Timeout";
/// Error code of the entry added when a payload cannot be materialized.
pub const DESERIALIZATION_ERROR: &str = "Deserialization error";
/// Error code of the entry added when a request payload cannot be serialized.
pub const SERIALIZATION_ERROR: &str = "Serialization error";
/// Error code of the entry added when the token endpoint hands out an unusable token.
pub const INVALID_TOKEN: &str = "Invalid token";
/// Error code of the entry added when the exchange itself failed.
pub const TRANSPORT_ERROR: &str = "Transport error";

/// A single error entry, as reported by the remote service or synthesized locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "errorCode", alias = "code")]
    pub code: String,
    #[serde(alias = "errorDescription", default)]
    pub message: String,
    #[serde(
        rename = "additionalInfo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_info: Option<String>,
}

impl ErrorDetail {
    /// Entry without additional info.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            additional_info: None,
        }
    }

    /// The entry appended when the time budget runs out.
    pub fn client_timeout() -> Self {
        Self::new(CLIENT_TIMEOUT, CLIENT_TIMEOUT)
    }

    /// Entry standing in for a failure that came without any.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(
            status.as_u16().to_string(),
            status.canonical_reason().unwrap_or("Unknown status"),
        )
    }

    /// Parses an error body returned by the remote service.
    ///
    /// Accepts a bare array of entries, an `{"errors": [...]}` envelope, or an
    /// OAuth style `{"error": .., "error_description": ..}` object. Anything
    /// else non-empty becomes a single entry keyed by the status code.
    pub fn parse_body(status: StatusCode, body: &str) -> Vec<ErrorDetail> {
        #[derive(Deserialize)]
        struct Envelope {
            errors: Vec<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct OAuthError {
            error: String,
            #[serde(default)]
            error_description: Option<String>,
        }

        let body = body.trim();
        if body.is_empty() {
            return Vec::new();
        }

        if let Ok(errors) = serde_json::from_str::<Vec<ErrorDetail>>(body) {
            return errors;
        }
        if let Ok(envelope) = serde_json::from_str::<Envelope>(body) {
            return envelope.errors;
        }
        if let Ok(oauth) = serde_json::from_str::<OAuthError>(body) {
            let message = oauth.error_description.unwrap_or_else(|| oauth.error.clone());
            return vec![ErrorDetail::new(oauth.error, message)];
        }

        vec![ErrorDetail::new(status.as_u16().to_string(), body)]
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Result of a single physical exchange, before the payload is materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Option<serde_json::Value>,
    pub errors: Vec<ErrorDetail>,
}

impl TransportResponse {
    /// A 200 carrying `body`.
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
            errors: Vec::new(),
        }
    }

    /// A 204 without a body.
    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
            errors: Vec::new(),
        }
    }

    /// A failed exchange as reported by the remote side.
    pub fn failure(status: StatusCode, errors: Vec<ErrorDetail>) -> Self {
        Self {
            status,
            body: None,
            errors,
        }
    }
}

/// Outcome of a call: the typed payload, or the error entries explaining the failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(Vec<ErrorDetail>),
}

/// Response envelope returned for every call.
///
/// `is_success()` is decided by the outcome alone. A `Success` outcome is only
/// built from a 2xx status without error entries, so the status and the error
/// list cannot disagree.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    status: StatusCode,
    outcome: Outcome<T>,
    elapsed: Duration,
    cause: Option<Arc<serde_json::Error>>,
}

impl<T> ApiResponse<T> {
    /// Builds a successful response. Non-2xx statuses are coerced to 200.
    pub fn success(status: StatusCode, payload: T) -> Self {
        let status = if status.is_success() {
            status
        } else {
            StatusCode::OK
        };
        Self {
            status,
            outcome: Outcome::Success(payload),
            elapsed: Duration::ZERO,
            cause: None,
        }
    }

    /// Builds a failed response.
    ///
    /// A 2xx status is replaced by 500, and an empty entry list gets one entry
    /// keyed by the status, so a failure never looks like a success.
    pub fn failure(status: StatusCode, mut errors: Vec<ErrorDetail>) -> Self {
        let status = if status.is_success() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            status
        };
        if errors.is_empty() {
            errors.push(ErrorDetail::from_status(status));
        }
        Self {
            status,
            outcome: Outcome::Failure(errors),
            elapsed: Duration::ZERO,
            cause: None,
        }
    }

    pub(crate) fn deserialization_error(error: serde_json::Error) -> Self {
        let mut response = Self::failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            vec![ErrorDetail::new(DESERIALIZATION_ERROR, error.to_string())],
        );
        response.cause = Some(Arc::new(error));
        response
    }

    /// Outcome code of the call.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// True iff the outcome carries a payload.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// The tagged outcome.
    pub fn outcome(&self) -> &Outcome<T> {
        &self.outcome
    }

    /// The payload on success.
    pub fn payload(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Success(payload) => Some(payload),
            Outcome::Failure(_) => None,
        }
    }

    /// Consumes the response, keeping only the payload.
    pub fn into_payload(self) -> Option<T> {
        match self.outcome {
            Outcome::Success(payload) => Some(payload),
            Outcome::Failure(_) => None,
        }
    }

    /// Error entries in insertion order; empty on success.
    pub fn errors(&self) -> &[ErrorDetail] {
        match &self.outcome {
            Outcome::Success(_) => &[],
            Outcome::Failure(errors) => errors,
        }
    }

    /// Wall-clock time of the whole call, retries included.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The serde error behind a deserialization failure, if any.
    pub fn cause(&self) -> Option<&serde_json::Error> {
        self.cause.as_deref()
    }

    pub(crate) fn is_deserialization_error(&self) -> bool {
        self.cause.is_some()
    }

    pub(crate) fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Replaces the status with 408 and appends the synthetic timeout entry.
    pub(crate) fn into_client_timeout(self) -> Self {
        let mut errors = match self.outcome {
            Outcome::Success(_) => Vec::new(),
            Outcome::Failure(errors) => errors,
        };
        errors.push(ErrorDetail::client_timeout());
        Self {
            status: StatusCode::REQUEST_TIMEOUT,
            outcome: Outcome::Failure(errors),
            elapsed: self.elapsed,
            cause: None,
        }
    }

    /// Re-types a failed response, keeping status, entries and cause.
    pub(crate) fn into_failure<U>(self) -> ApiResponse<U> {
        let errors = match self.outcome {
            Outcome::Success(_) => Vec::new(),
            Outcome::Failure(errors) => errors,
        };
        let mut response = ApiResponse::failure(self.status, errors);
        response.elapsed = self.elapsed;
        response.cause = self.cause;
        response
    }

    /// Converts a failed response into an `Err`, passing successes through.
    pub fn into_result(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_response(self))
        }
    }
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Materializes the typed payload from a transport result.
    pub(crate) fn from_transport(raw: TransportResponse) -> Self {
        if !raw.status.is_success() || !raw.errors.is_empty() {
            return Self::failure(raw.status, raw.errors);
        }

        let body = raw.body.unwrap_or(serde_json::Value::Null);
        match serde_json::from_value::<T>(body) {
            Ok(payload) => Self::success(raw.status, payload),
            Err(e) => Self::deserialization_error(e),
        }
    }
}

/// A failed call, raised instead of returned when the session asks for it.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    errors: Vec<ErrorDetail>,
    elapsed: Duration,
    cause: Option<Arc<serde_json::Error>>,
}

impl ApiError {
    /// Captures everything a failed response carries.
    pub(crate) fn from_response<T>(response: ApiResponse<T>) -> Self {
        let errors = response.errors().to_vec();
        Self {
            status: response.status,
            errors,
            elapsed: response.elapsed,
            cause: response.cause,
        }
    }

    /// Outcome code of the failed call.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Error entries in insertion order.
    pub fn errors(&self) -> &[ErrorDetail] {
        &self.errors
    }

    /// Wall-clock time of the whole call.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether the payload could not be materialized.
    pub fn is_deserialization_error(&self) -> bool {
        self.cause.is_some()
    }

    /// Whether the call ran out of its time budget.
    pub fn is_client_timeout(&self) -> bool {
        self.status == StatusCode::REQUEST_TIMEOUT
            && self.errors.iter().any(|e| e.code == CLIENT_TIMEOUT)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cause.is_some() {
            write!(f, "Deserialization error (HTTP {})", self.status.as_u16())?;
        } else {
            write!(f, "Shipping API call failed (HTTP {})", self.status.as_u16())?;
        }
        for (i, error) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
