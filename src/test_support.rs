//! Shared fixtures: in-memory SQLite, in-memory object store and a fake probe.

use crate::{
    models::video::Video,
    routes::routes::routes,
    run_migrations,
    services::{
        auth::make_jwt,
        object_storage::{ObjectUrlBase, VideoStorage},
        probe::{ProbeError, VideoDimensions, VideoProbe},
        video_service::{MAX_UPLOAD_BYTES, VideoService},
    },
};
use async_trait::async_trait;
use axum_test::{TestServer, multipart::Part};
use futures::TryStreamExt;
use object_store::{ObjectStore, memory::InMemory};
use sqlx::sqlite::SqlitePoolOptions;
use std::{path::Path, sync::Arc};
use tempfile::TempDir;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_CDN: &str = "https://cdn.example.com";

const LANDSCAPE: VideoDimensions = VideoDimensions {
    width: 1920,
    height: 1080,
};

/// Returns fixed dimensions, or fails like a probe that found no streams.
pub struct FixedProbe(pub Option<VideoDimensions>);

#[async_trait]
impl VideoProbe for FixedProbe {
    async fn probe(&self, path: &Path) -> Result<VideoDimensions, ProbeError> {
        assert!(path.exists(), "probe must see the staged file");
        self.0.ok_or(ProbeError::NoStreams)
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub service: VideoService,
    pub store: Arc<InMemory>,
    pub staging: TempDir,
    pub assets: TempDir,
}

impl TestApp {
    pub async fn with_probe(probe: FixedProbe) -> Self {
        Self::build(probe, MAX_UPLOAD_BYTES).await
    }

    /// Landscape app whose upload route accepts at most `limit` body bytes.
    pub async fn with_body_limit(limit: usize) -> Self {
        Self::build(FixedProbe(Some(LANDSCAPE)), limit).await
    }

    async fn build(probe: FixedProbe, max_upload_bytes: usize) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        run_migrations(&pool).await.expect("migrations");

        let store = Arc::new(InMemory::new());
        let storage = VideoStorage::new(
            store.clone(),
            ObjectUrlBase::Distribution(TEST_CDN.to_string()),
        );
        let staging = TempDir::new().expect("staging dir");
        let assets = TempDir::new().expect("assets dir");

        let service = VideoService::new(
            Arc::new(pool),
            storage,
            Arc::new(probe),
            TEST_JWT_SECRET,
            staging.path(),
        );
        let app = routes(assets.path(), max_upload_bytes).with_state(service.clone());
        let server = TestServer::new(app).expect("test server");

        Self {
            server,
            service,
            store,
            staging,
            assets,
        }
    }

    pub async fn with_dimensions(dimensions: VideoDimensions) -> Self {
        Self::with_probe(FixedProbe(Some(dimensions))).await
    }

    pub async fn landscape() -> Self {
        Self::with_dimensions(LANDSCAPE).await
    }

    pub async fn failing_probe() -> Self {
        Self::with_probe(FixedProbe(None)).await
    }

    pub async fn seed_video(&self, user_id: Uuid) -> Video {
        self.service
            .create_video(user_id, "Test video", "uploaded in tests")
            .await
            .expect("seed video")
    }

    pub async fn stored_keys(&self) -> Vec<String> {
        self.store
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .expect("list objects")
    }

    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging.path())
            .expect("read staging dir")
            .count()
    }
}

pub fn bearer(user_id: Uuid) -> String {
    let token = make_jwt(user_id, TEST_JWT_SECRET, chrono::Duration::hours(1)).expect("jwt");
    format!("Bearer {}", token)
}

/// Smallest byte sequence the container check accepts.
pub fn mp4_bytes() -> Vec<u8> {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x20];
    bytes.extend_from_slice(b"ftypisom");
    bytes.extend_from_slice(&[0x00, 0x00, 0x02, 0x00]);
    bytes.extend_from_slice(b"isomiso2avc1mp41");
    bytes.extend_from_slice(&[0u8; 64]);
    bytes
}

pub fn video_part(bytes: Vec<u8>) -> Part {
    Part::bytes(bytes)
        .file_name("clip.mp4")
        .mime_type("video/mp4")
}
