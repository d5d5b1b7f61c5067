//! src/services/video_service.rs
//!
//! VideoService: video records in SQLite plus the authenticated upload
//! pipeline: authenticate, check ownership, stage the multipart file to a
//! temporary file, verify the MP4 container, probe dimensions, upload to the
//! object store under an aspect-ratio prefixed key, then link the URL.

use crate::{
    models::video::Video,
    services::{
        assets::{parse_media_type, storage_key, verify_mp4},
        auth::{get_bearer_token, validate_jwt},
        object_storage::VideoStorage,
        probe::{AspectRatio, VideoProbe},
    },
};
use axum::{
    extract::{
        Multipart,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::{io::SeekFrom, path::PathBuf, sync::Arc};
use tempfile::TempPath;
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Multipart field carrying the video.
pub const VIDEO_FORM_FIELD: &str = "video";

/// The only media type accepted for uploads.
pub const ACCEPTED_MEDIA_TYPE: &str = "video/mp4";

/// Cap on the whole request body (1 GiB).
pub const MAX_UPLOAD_BYTES: usize = 1 << 30;

/// Cap on the combined size of non-file form fields (10 MiB).
pub const MAX_FORM_MEMORY_BYTES: usize = 10 << 20;

const VIDEO_COLUMNS: &str =
    "id, created_at, updated_at, title, description, thumbnail_url, video_url, user_id";

/// Failure taxonomy for video operations. Messages are safe to show to
/// clients; `Internal` keeps its cause out of the message.
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{context}")]
    Internal {
        context: &'static str,
        source: anyhow::Error,
    },
}

impl VideoError {
    fn invalid(msg: impl Into<String>) -> Self {
        VideoError::InvalidRequest(msg.into())
    }

    fn internal(context: &'static str, source: impl Into<anyhow::Error>) -> Self {
        VideoError::Internal {
            context,
            source: source.into(),
        }
    }
}

pub type VideoResult<T> = Result<T, VideoError>;

/// The uploaded bytes on local disk. The file is deleted when this value
/// is dropped, whichever way the request ends.
pub struct StagedUpload {
    file: File,
    path: TempPath,
    media_type: String,
    size_bytes: u64,
}

#[derive(Clone)]
pub struct VideoService {
    /// Shared SQLite connection pool holding video records.
    pub db: Arc<SqlitePool>,

    /// Directory where uploads are staged before validation.
    pub staging_dir: PathBuf,

    storage: VideoStorage,
    probe: Arc<dyn VideoProbe>,
    jwt_secret: Arc<str>,
}

impl VideoService {
    pub fn new(
        db: Arc<SqlitePool>,
        storage: VideoStorage,
        probe: Arc<dyn VideoProbe>,
        jwt_secret: &str,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            db,
            staging_dir: staging_dir.into(),
            storage,
            probe,
            jwt_secret: Arc::from(jwt_secret),
        }
    }

    /// Fetch a video record by id.
    pub async fn get_video(&self, id: Uuid) -> VideoResult<Video> {
        sqlx::query_as::<_, Video>(&format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?"))
            .bind(id)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => VideoError::NotFound("Couldn't find video".into()),
                other => VideoError::internal("Couldn't get video", other),
            })
    }

    /// Insert a new, empty video record owned by `user_id`.
    #[cfg(test)]
    pub async fn create_video(
        &self,
        user_id: Uuid,
        title: &str,
        description: &str,
    ) -> VideoResult<Video> {
        let now = Utc::now();
        sqlx::query_as::<_, Video>(&format!(
            "INSERT INTO videos ({VIDEO_COLUMNS}) VALUES (?, ?, ?, ?, ?, NULL, NULL, ?)
             RETURNING {VIDEO_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(title)
        .bind(description)
        .bind(user_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| VideoError::internal("Couldn't create video", err))
    }

    /// Persist the full record and bump `updated_at`.
    pub async fn update_video(&self, video: &Video) -> VideoResult<Video> {
        sqlx::query_as::<_, Video>(&format!(
            "UPDATE videos
             SET title = ?, description = ?, thumbnail_url = ?, video_url = ?, updated_at = ?
             WHERE id = ?
             RETURNING {VIDEO_COLUMNS}"
        ))
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_url)
        .bind(&video.video_url)
        .bind(Utc::now())
        .bind(video.id)
        .fetch_optional(&*self.db)
        .await
        .map_err(|err| VideoError::internal("Couldn't update video", err))?
        .ok_or_else(|| VideoError::NotFound("Couldn't find video".into()))
    }

    /// Run the whole upload pipeline for `video_id`.
    ///
    /// Every step returns early on failure. The record is only written
    /// after the object store accepted the bytes.
    #[tracing::instrument(skip_all, fields(video_id = %video_id))]
    pub async fn upload_video(
        &self,
        video_id: Uuid,
        headers: &HeaderMap,
        multipart: Result<Multipart, MultipartRejection>,
    ) -> VideoResult<Video> {
        let video = self.authorize_owner(headers, video_id).await?;

        let mut multipart = multipart.map_err(|rejection| {
            debug!(error = %rejection, "multipart rejected");
            VideoError::invalid("Bad form input")
        })?;
        let staged = self.stage_upload(&mut multipart).await?;

        self.publish(video, staged).await
    }

    async fn authorize_owner(&self, headers: &HeaderMap, video_id: Uuid) -> VideoResult<Video> {
        let token = get_bearer_token(headers).map_err(|err| {
            debug!(error = %err, "no bearer token");
            VideoError::Unauthenticated("Couldn't find JWT".into())
        })?;
        let user_id = validate_jwt(token, &self.jwt_secret).map_err(|err| {
            debug!(error = %err, "token rejected");
            VideoError::Unauthenticated("Couldn't validate JWT".into())
        })?;

        let video = self.get_video(video_id).await?;
        if video.user_id != user_id {
            warn!(%user_id, owner_id = %video.user_id, "upload attempted by non-owner");
            return Err(VideoError::Forbidden(
                "Not authorized to update this video".into(),
            ));
        }
        Ok(video)
    }

    /// Find the video field, check its media type and copy it to disk.
    /// Other fields are drained within the form memory budget.
    async fn stage_upload(&self, multipart: &mut Multipart) -> VideoResult<StagedUpload> {
        let mut form_bytes = 0usize;

        while let Some(mut field) = multipart.next_field().await.map_err(form_error)? {
            if field.name() != Some(VIDEO_FORM_FIELD) {
                while let Some(chunk) = field.chunk().await.map_err(form_error)? {
                    form_bytes += chunk.len();
                    if form_bytes > MAX_FORM_MEMORY_BYTES {
                        return Err(VideoError::invalid("Form fields too large"));
                    }
                }
                continue;
            }

            let media_type = field
                .content_type()
                .and_then(parse_media_type)
                .ok_or_else(|| VideoError::invalid("Unable to parse Content-Type for video"))?;
            if media_type != ACCEPTED_MEDIA_TYPE {
                return Err(VideoError::invalid("Invalid Content-Type for video"));
            }

            return self.stage_field(field, media_type).await;
        }

        Err(VideoError::invalid("Unable to parse form file"))
    }

    async fn stage_field(
        &self,
        mut field: Field<'_>,
        media_type: String,
    ) -> VideoResult<StagedUpload> {
        let (std_file, path) = tempfile::Builder::new()
            .prefix("video-upload-")
            .suffix(".mp4")
            .tempfile_in(&self.staging_dir)
            .map_err(|err| VideoError::internal("Couldn't create temporary file", err))?
            .into_parts();
        let mut file = File::from_std(std_file);

        let mut size_bytes: u64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(form_error)? {
            size_bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|err| VideoError::internal("Couldn't write file", err))?;
        }
        file.flush()
            .await
            .map_err(|err| VideoError::internal("Couldn't write file", err))?;
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|err| VideoError::internal("Couldn't reset file pointer", err))?;

        debug!(path = %path.display(), size_bytes, "upload staged");
        Ok(StagedUpload {
            file,
            path,
            media_type,
            size_bytes,
        })
    }

    async fn publish(&self, mut video: Video, mut staged: StagedUpload) -> VideoResult<Video> {
        verify_mp4(&mut staged.file).await.map_err(|err| {
            debug!(error = %err, "container check failed");
            VideoError::invalid("Unable to verify mp4 file type")
        })?;

        let dimensions = self
            .probe
            .probe(&staged.path)
            .await
            .map_err(|err| VideoError::internal("Unable to get video aspect ratio", err))?;
        let aspect_ratio = AspectRatio::classify(dimensions)
            .map_err(|err| VideoError::internal("Unable to get video aspect ratio", err))?;

        let key = storage_key(aspect_ratio, &staged.media_type);

        let url = self
            .storage
            .put_video(&key, &mut staged.file, &staged.media_type)
            .await
            .map_err(|err| VideoError::internal("Error while uploading video", err))?;

        video.video_url = Some(url);
        let updated = self.update_video(&video).await.inspect_err(|_| {
            error!(key = %key, "stored object is not linked to any video record");
        })?;

        info!(
            key = %key,
            size_bytes = staged.size_bytes,
            aspect_ratio = aspect_ratio.label(),
            width = dimensions.width,
            height = dimensions.height,
            "video uploaded"
        );
        Ok(updated)
    }
}

/// Map multipart failures to client errors; an exceeded body limit
/// reads as "File too large".
fn form_error(err: MultipartError) -> VideoError {
    debug!(error = %err, "multipart read failed");
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        VideoError::invalid("File too large")
    } else {
        VideoError::invalid("Bad form input")
    }
}
