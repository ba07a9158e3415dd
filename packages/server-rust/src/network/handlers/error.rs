//! JSON error bodies and status mapping for the RPC surface.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use netplane_core::{ErrorKind, ServiceError};
use serde_json::{json, Value};
use tracing::error;

/// A [`ServiceError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

pub type ApiResult<T> = Result<Json<T>, ApiError>;

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ServiceError::invalid_argument(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);
        if status.is_server_error() && self.0.kind != ErrorKind::Unimplemented {
            error!(kind = %self.0.kind, message = %self.0.message, "request failed");
        }
        (status, error_body(self.0.kind, &self.0.message)).into_response()
    }
}

#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `{"kind": ..., "message": ...}`
#[must_use]
pub fn error_body(kind: ErrorKind, message: &str) -> Json<Value> {
    Json(json!({ "kind": kind.as_str(), "message": message }))
}

/// `{"ok": true}`, the body of every mutation without a result.
#[must_use]
pub fn ok() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Unwraps a JSON body, turning a malformed one into `InvalidArgument`.
///
/// # Errors
///
/// The rejection as an [`ApiError`].
pub fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(ApiError::from)
}
