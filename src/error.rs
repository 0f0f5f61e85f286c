//! Error types for the admission gateway.
//!
//! Overload is not an error: a client over its limit gets
//! [`Verdict::Rejected`](crate::rate_limit::Verdict::Rejected), and a cancelled
//! admission simply produces no verdict. The errors here are the gateway's own
//! faults around the admission core.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::gateway::ErrorBody;

/// The main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Binding or serving the listener failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client key could not be derived from the connection
    #[error("Could not determine client address")]
    ClientKey,
}

impl GatewayError {
    /// HTTP status reported to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Io(_) | GatewayError::ClientKey => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let reason = status.canonical_reason().unwrap_or("Internal Server Error");
        (status, Json(ErrorBody::new(reason))).into_response()
    }
}
