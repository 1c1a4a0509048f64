//! HTTP error responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gridline_core::ErrorKind;
use serde_json::json;

use crate::rpc::RpcError;

/// Error returned by REST handlers.
///
/// Rendered as `{"error": <message>, "code": <kind code>}` with the status
/// mapped from the kind.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RpcError> for GatewayError {
    fn from(err: RpcError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::BadRequest => Self::BadRequest(message),
            ErrorKind::Internal => {
                tracing::error!(error = %message, "Domain call failed");
                Self::Internal(message)
            }
        }
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.kind().code();
        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));
        (status, body).into_response()
    }
}
