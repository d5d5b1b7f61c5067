//! A video record owned by a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted video metadata. The binary itself lives in the object store;
/// `video_url` points at it once an upload has completed.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Video {
    pub id: Uuid,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub title: String,

    pub description: String,

    /// Public URL of the thumbnail, if one was uploaded.
    pub thumbnail_url: Option<String>,

    /// Public URL of the stored video, set only after the object store
    /// accepted the bytes.
    pub video_url: Option<String>,

    /// Owner; only this user may upload the video's content.
    pub user_id: Uuid,
}
