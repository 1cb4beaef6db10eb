//! Public entry point: a default session plus the raising policy.

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::dispatch;
use crate::http::{HttpVerb, Requester};
use crate::response::{ApiError, ApiResponse};
use crate::runtime::Runtime;
use crate::session::Session;

/// Client for the shipping service.
///
/// Every call takes an optional session; `None` uses the default session
/// this client was built with. Whether a failed call comes back as
/// `Ok(response)` or `Err(ApiError)` is decided by the effective session's
/// `throw_on_failure` flag, once, after all retries.
#[derive(Clone, Debug)]
pub struct ShippingApi {
    default_session: Arc<Session>,
}

impl ShippingApi {
    pub fn new(default_session: Arc<Session>) -> Self {
        Self { default_session }
    }

    /// Build the default session from `SHIPPING_API_*` variables.
    pub fn from_runtime<R: Runtime>(runtime: &R, requester: Arc<dyn Requester>) -> Result<Self> {
        let session = Session::from_runtime(runtime, requester)?;
        Ok(Self::new(Arc::new(session)))
    }

    pub fn default_session(&self) -> &Arc<Session> {
        &self.default_session
    }

    pub async fn get<T, R>(
        &self,
        uri: &str,
        request: &R,
        session: Option<&Session>,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        R: Serialize + ?Sized,
    {
        self.call(uri, HttpVerb::Get, request, false, session).await
    }

    pub async fn post<T, R>(
        &self,
        uri: &str,
        request: &R,
        session: Option<&Session>,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        R: Serialize + ?Sized,
    {
        self.call(uri, HttpVerb::Post, request, false, session).await
    }

    pub async fn put<T, R>(
        &self,
        uri: &str,
        request: &R,
        session: Option<&Session>,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        R: Serialize + ?Sized,
    {
        self.call(uri, HttpVerb::Put, request, false, session).await
    }

    pub async fn delete<T, R>(
        &self,
        uri: &str,
        request: &R,
        session: Option<&Session>,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        R: Serialize + ?Sized,
    {
        self.call(uri, HttpVerb::Delete, request, false, session).await
    }

    pub async fn delete_with_body<T, R>(
        &self,
        uri: &str,
        request: &R,
        session: Option<&Session>,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        R: Serialize + ?Sized,
    {
        self.call(uri, HttpVerb::Delete, request, true, session).await
    }

    async fn call<T, R>(
        &self,
        uri: &str,
        verb: HttpVerb,
        request: &R,
        delete_body: bool,
        session: Option<&Session>,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        R: Serialize + ?Sized,
    {
        let session = session.unwrap_or(self.default_session.as_ref());
        let response = dispatch::request(session, uri, verb, request, delete_body).await;
        apply_policy(session, response)
    }
}

/// Raise the failure if the session asks for it.
pub fn apply_policy<T>(
    session: &Session,
    response: ApiResponse<T>,
) -> Result<ApiResponse<T>, ApiError> {
    if session.config().throw_on_failure {
        response.into_result()
    } else {
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthToken;
    use crate::config::SessionConfig;
    use crate::response::{CLIENT_TIMEOUT, ErrorDetail, TransportResponse};
    use crate::test_utils::{fast_config, session_with, throttled};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::time::Duration;

    fn client_with(config: SessionConfig, responses: Vec<TransportResponse>) -> ShippingApi {
        let session =
            session_with(config, responses, vec![]).with_token(AuthToken::new("cached"));
        ShippingApi::new(Arc::new(session))
    }

    fn not_found() -> TransportResponse {
        TransportResponse::failure(
            StatusCode::NOT_FOUND,
            vec![ErrorDetail::new("1002", "Shipment not found")],
        )
    }

    #[tokio::test]
    async fn test_failure_returned_when_not_throwing() {
        let api = client_with(fast_config(), vec![not_found()]);

        let response: ApiResponse<serde_json::Value> =
            api.get("/shipments/1", &json!({}), None).await.unwrap();

        assert!(!response.is_success());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_throw_mode_raises_identical_response() {
        let quiet = client_with(fast_config(), vec![not_found()]);
        let loud = client_with(fast_config().with_throw_on_failure(true), vec![not_found()]);

        let returned: ApiResponse<serde_json::Value> =
            quiet.get("/shipments/1", &json!({}), None).await.unwrap();
        let raised = loud
            .get::<serde_json::Value, _>("/shipments/1", &json!({}), None)
            .await
            .unwrap_err();

        assert_eq!(raised.status(), returned.status());
        assert_eq!(raised.errors(), returned.errors());
        assert!(!raised.is_deserialization_error());
    }

    #[tokio::test]
    async fn test_throw_mode_passes_success_through() {
        let api = client_with(
            fast_config().with_throw_on_failure(true),
            vec![TransportResponse::ok(json!(42))],
        );
        let response: ApiResponse<u32> = api.post("/rates", &json!({}), None).await.unwrap();
        assert_eq!(response.payload(), Some(&42));
    }

    #[tokio::test]
    async fn test_throw_mode_client_timeout() {
        let config = fast_config()
            .with_throw_on_failure(true)
            .with_timeout(Duration::ZERO);
        let api = client_with(config, vec![throttled()]);

        let err = api
            .put::<serde_json::Value, _>("/pickups", &json!({}), None)
            .await
            .unwrap_err();

        assert!(err.is_client_timeout());
        assert_eq!(err.errors().last().unwrap().code, CLIENT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_throw_mode_deserialization_keeps_origin() {
        let api = client_with(
            fast_config().with_throw_on_failure(true),
            vec![TransportResponse::ok(json!("not a number"))],
        );
        let err = api.get::<u32, _>("/count", &json!({}), None).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_deserialization_error());
        assert!(std::error::Error::source(&err).is_some());

        // Converts into anyhow like any other error
        let err: anyhow::Error = err.into();
        assert!(err.to_string().contains("Deserialization error"));
    }

    #[tokio::test]
    async fn test_explicit_session_overrides_default() {
        let api = client_with(fast_config(), vec![TransportResponse::ok(json!(1))]);
        let explicit = session_with(
            fast_config().with_throw_on_failure(true),
            vec![not_found()],
            vec![],
        )
        .with_token(AuthToken::new("other"));

        let result = api
            .delete::<serde_json::Value, _>("/pickups/9", &json!({}), Some(&explicit))
            .await;

        // The explicit session's policy and transport were used
        assert!(result.is_err());
        assert_eq!(explicit.endpoint_stats("/pickups/9").unwrap().failures, 1);
        assert!(api.default_session().endpoint_stats("/pickups/9").is_none());
    }

    #[tokio::test]
    async fn test_delete_and_delete_with_body_match() {
        let api = client_with(
            fast_config(),
            vec![TransportResponse::no_content(), TransportResponse::no_content()],
        );

        let plain: ApiResponse<()> = api.delete("/manifests/1", &json!({}), None).await.unwrap();
        let with_body: ApiResponse<()> = api
            .delete_with_body("/manifests/1", &json!({}), None)
            .await
            .unwrap();

        assert_eq!(plain.status(), with_body.status());
        assert_eq!(plain.outcome(), with_body.outcome());
        assert_eq!(plain.errors(), with_body.errors());
    }
}
