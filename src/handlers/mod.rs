pub mod cache;
pub mod orders;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Redis(String),
    BadRequest(String),
    Internal(String),
    /// A backing service is not configured.
    Unavailable(&'static str),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Redis(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Redis: {msg}"))
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::Unavailable(what) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{what} is not configured"),
            ),
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), %message, "request failed");
        }

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        Self::Redis(e.to_string())
    }
}

// ─── GET /api/boom ───────────────────────────────────────────────

/// Always fails; exercises the error metric.
pub async fn boom() -> Result<(), AppError> {
    Err(AppError::Internal("deliberate failure".into()))
}
