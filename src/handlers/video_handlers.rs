//! HTTP handlers for video records and uploads.
//! Request parsing stays here; the pipeline itself lives in `VideoService`.

use crate::{errors::AppError, models::video::Video, services::video_service::VideoService};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::HeaderMap,
};
use uuid::Uuid;

/// `POST /api/video_upload/{video_id}`: multipart upload of the video file.
///
/// Expects a `video` file field with `Content-Type: video/mp4` and an
/// `Authorization: Bearer <token>` header belonging to the video's owner.
/// Responds with the updated record.
pub async fn upload_video(
    State(service): State<VideoService>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let video = service.upload_video(video_id, &headers, multipart).await?;
    Ok(Json(video))
}

/// `GET /api/videos/{video_id}`
pub async fn get_video(
    State(service): State<VideoService>,
    Path(video_id): Path<String>,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    Ok(Json(service.get_video(video_id).await?))
}

fn parse_video_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request("Invalid ID"))
}
