//! Defines routes for the video service.
//!
//! ## Structure
//! - `GET  /healthz`, `GET /readyz`: health probes
//! - `GET  /api/videos/{video_id}`: fetch a video record
//! - `POST /api/video_upload/{video_id}`: multipart upload of the video file
//!   (body capped at 1 GiB)
//! - `GET  /assets/*`: static files from the assets root

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        video_handlers::{get_video, upload_video},
    },
    services::video_service::VideoService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::path::Path;
use tower_http::services::ServeDir;

/// Build the router; it carries `VideoService` as shared state.
/// `max_upload_bytes` caps the upload request body.
pub fn routes(assets_root: &Path, max_upload_bytes: usize) -> Router<VideoService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/videos/{video_id}", get(get_video))
        .route(
            "/api/video_upload/{video_id}",
            post(upload_video).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .nest_service("/assets", ServeDir::new(assets_root))
}
