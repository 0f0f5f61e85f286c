//! Request handler mapping admission verdicts onto HTTP responses.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::rate_limit::{AdmissionController, Verdict};

/// Reason reported with every rejected request.
pub const TOO_MANY_REQUESTS: &str = "Too Many Requests";

/// Body of an admitted response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    /// Success message configured on the gateway
    pub message: String,
}

/// Body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason
    pub error: String,
}

impl ErrorBody {
    /// Create an error body with the given reason.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Body sent when a client is rate limited.
    pub fn too_many_requests() -> Self {
        Self::new(TOO_MANY_REQUESTS)
    }
}

/// Shared state for the request handler.
#[derive(Debug)]
pub(crate) struct GatewayState {
    pub controller: AdmissionController,
    pub limit: u32,
    pub success_message: String,
    /// Parent of every per-request cancellation token
    pub shutdown: CancellationToken,
}

/// Derive the client key from the peer address, dropping the port.
fn client_key(connect_info: Option<ConnectInfo<SocketAddr>>) -> Result<String, GatewayError> {
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or(GatewayError::ClientKey)
}

/// Admit or reject a request for its client.
///
/// The per-request token is cancelled when this future is dropped (the client
/// went away) or when the gateway shuts down.
pub(crate) async fn admit_request(
    State(state): State<Arc<GatewayState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Response, GatewayError> {
    let key = client_key(connect_info).inspect_err(|e| {
        tracing::warn!(error = %e, "rejecting request without client key");
    })?;

    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    // No verdict means shutdown; a disconnected client drops this future instead
    let Some(verdict) = state.controller.admit(&key, state.limit, &cancel).await else {
        return Ok(StatusCode::SERVICE_UNAVAILABLE.into_response());
    };
    tracing::debug!(client = %key, %verdict, "admission decided");

    let response = match verdict {
        Verdict::Admitted => {
            let body = MessageBody {
                message: state.success_message.clone(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Verdict::Rejected => {
            let body = ErrorBody::too_many_requests();
            (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
        }
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::rate_limit::RateLimitConfig;

    fn state(limit: u32) -> Arc<GatewayState> {
        Arc::new(GatewayState {
            controller: AdmissionController::new(&RateLimitConfig::default()),
            limit,
            success_message: "ok".to_string(),
            shutdown: CancellationToken::new(),
        })
    }

    fn router(state: Arc<GatewayState>, peer: SocketAddr) -> Router {
        Router::new()
            .fallback(admit_request)
            .with_state(state)
            .layer(MockConnectInfo(peer))
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_client_key_drops_port() {
        let peer = ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 51234)));
        assert_eq!(client_key(Some(peer)).unwrap(), "192.168.1.7");
    }

    #[test]
    fn test_client_key_missing() {
        assert!(matches!(client_key(None), Err(GatewayError::ClientKey)));
    }

    #[tokio::test]
    async fn test_mock_peer_address_is_used_as_key() {
        let state = state(1);
        let first = SocketAddr::from(([10, 0, 0, 3], 40000));
        let second = SocketAddr::from(([10, 0, 0, 4], 40000));

        for peer in [first, second] {
            let response = router(state.clone(), peer)
                .oneshot(Request::get("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(state.controller.store().tracked_clients().await, 2);
    }

    #[tokio::test]
    async fn test_missing_peer_address_is_server_error() {
        let app = Router::new().fallback(admit_request).with_state(state(1));

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.error, "Internal Server Error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_then_rejects_with_default_policy() {
        let state = state(2);
        let peer = SocketAddr::from(([10, 0, 0, 1], 40000));

        for _ in 0..2 {
            let response = router(state.clone(), peer)
                .oneshot(Request::get("/anything").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body: MessageBody = body_json(response).await;
            assert_eq!(body.message, "ok");
        }

        let response = router(state.clone(), peer)
            .oneshot(Request::post("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body, ErrorBody::too_many_requests());

        // Rejection took 30s of backoff; the window ends at 60s
        tokio::time::advance(Duration::from_secs(31)).await;
        let response = router(state, peer)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_waiting_request() {
        let state = state(1);
        let peer = SocketAddr::from(([10, 0, 0, 2], 40000));

        router(state.clone(), peer)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let request = Request::get("/").body(Body::empty()).unwrap();
        let pending = tokio::spawn(router(state.clone(), peer).oneshot(request));

        tokio::time::sleep(Duration::from_millis(100)).await;
        state.shutdown.cancel();

        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
