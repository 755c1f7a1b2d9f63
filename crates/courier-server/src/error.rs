use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use courier_core::DispatchError;

/// Errors surfaced by HTTP handlers, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DispatchError> for ServerError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(msg) => Self::BadRequest(msg),
            DispatchError::Audit(e) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
