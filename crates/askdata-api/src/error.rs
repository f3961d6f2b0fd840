//! HTTP error mapping.

use axum::{http::StatusCode, response::IntoResponse, Json};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Cancelled(String),
    Internal(String),
}

impl From<askdata_core::Error> for ApiError {
    fn from(err: askdata_core::Error) -> Self {
        match err {
            askdata_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            askdata_core::Error::Cancelled(msg) => ApiError::Cancelled(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Cancelled(msg) => (StatusCode::REQUEST_TIMEOUT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
