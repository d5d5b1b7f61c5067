use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::video_service::VideoError;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<VideoError> for AppError {
    fn from(err: VideoError) -> Self {
        match err {
            VideoError::InvalidRequest(msg) => AppError::new(StatusCode::BAD_REQUEST, msg),
            VideoError::Unauthenticated(msg) => AppError::new(StatusCode::UNAUTHORIZED, msg),
            VideoError::Forbidden(msg) => AppError::new(StatusCode::FORBIDDEN, msg),
            VideoError::NotFound(msg) => AppError::new(StatusCode::NOT_FOUND, msg),
            VideoError::Internal { context, source } => {
                // Cause stays in the logs only.
                tracing::error!(error = ?source, "{}", context);
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, context)
            }
        }
    }
}
