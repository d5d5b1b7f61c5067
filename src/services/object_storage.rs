//! Remote object storage for uploaded videos.
//!
//! Wraps any `ObjectStore`: `AmazonS3` in production, `InMemory` in tests.
//! Object URLs are derived from configuration alone.

use bytes::BytesMut;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMultipartOptions, WriteMultipart,
    aws::AmazonS3Builder, path::Path,
};
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::AppConfig;

/// Size of each part sent to the store. S3 needs at least 5 MiB for every
/// part but the last.
pub const UPLOAD_PART_BYTES: usize = 8 << 20;

/// Parts allowed in flight at once; bounds memory per upload.
const MAX_PARTS_IN_FLIGHT: usize = 2;

const READ_BUFFER_BYTES: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum ObjectStorageError {
    #[error("object store configuration error: {0}")]
    Config(#[source] object_store::Error),
    #[error("reading upload body for `{key}` failed: {source}")]
    ReadFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("upload of `{key}` failed: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: object_store::Error,
    },
}

/// Where public links to stored objects point.
#[derive(Debug, Clone)]
pub enum ObjectUrlBase {
    /// CDN distribution in front of the bucket, e.g. `https://d123.cloudfront.net`.
    Distribution(String),
    /// Path-style URL on an S3-compatible endpoint.
    Endpoint { endpoint: String, bucket: String },
    /// Virtual-hosted AWS S3 URL.
    Bucket { bucket: String, region: String },
}

impl ObjectUrlBase {
    pub fn from_config(cfg: &AppConfig) -> Self {
        if let Some(distribution) = &cfg.s3_cf_distribution {
            ObjectUrlBase::Distribution(distribution.clone())
        } else if let Some(endpoint) = &cfg.s3_endpoint {
            ObjectUrlBase::Endpoint {
                endpoint: endpoint.clone(),
                bucket: cfg.s3_bucket.clone(),
            }
        } else {
            ObjectUrlBase::Bucket {
                bucket: cfg.s3_bucket.clone(),
                region: cfg.s3_region.clone(),
            }
        }
    }

    pub fn object_url(&self, key: &str) -> String {
        match self {
            ObjectUrlBase::Distribution(base) => {
                format!("{}/{}", base.trim_end_matches('/'), key)
            }
            ObjectUrlBase::Endpoint { endpoint, bucket } => {
                format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
            }
            ObjectUrlBase::Bucket { bucket, region } => {
                format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
            }
        }
    }
}

#[derive(Clone)]
pub struct VideoStorage {
    store: Arc<dyn ObjectStore>,
    url_base: ObjectUrlBase,
}

impl VideoStorage {
    pub fn new(store: Arc<dyn ObjectStore>, url_base: ObjectUrlBase) -> Self {
        Self { store, url_base }
    }

    /// Build an S3 client from config; credentials come from the AWS environment.
    pub fn s3(cfg: &AppConfig) -> Result<Self, ObjectStorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(cfg.s3_region.clone())
            .with_bucket_name(cfg.s3_bucket.clone());

        if let Some(endpoint) = &cfg.s3_endpoint {
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder.build().map_err(ObjectStorageError::Config)?;
        Ok(Self::new(Arc::new(store), ObjectUrlBase::from_config(cfg)))
    }

    pub fn object_url(&self, key: &str) -> String {
        self.url_base.object_url(key)
    }

    /// Stream `body` to `key` as a multipart upload tagged with
    /// `content_type`; returns the object URL. A failed upload is aborted.
    pub async fn put_video<R>(
        &self,
        key: &str,
        body: &mut R,
        content_type: &str,
    ) -> Result<String, ObjectStorageError>
    where
        R: AsyncRead + Unpin,
    {
        let location = Path::from(key);
        let start = Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutMultipartOptions {
            attributes,
            ..Default::default()
        };

        let upload = self
            .store
            .put_multipart_opts(&location, opts)
            .await
            .map_err(|source| upload_failed(key, source))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, UPLOAD_PART_BYTES);

        let result = match write_parts(key, body, &mut writer).await {
            Ok(size) => writer
                .finish()
                .await
                .map(|_| size)
                .map_err(|source| upload_failed(key, source)),
            Err(err) => {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!(error = %abort_err, key = %key, "aborting upload failed");
                }
                Err(err)
            }
        };

        let size = result.inspect_err(|err| {
            tracing::error!(
                error = %err,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "object upload failed"
            );
        })?;

        tracing::info!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "object upload successful"
        );

        Ok(self.object_url(key))
    }
}

/// Copy `body` into `writer`, waiting for in-flight parts before buffering more.
async fn write_parts<R>(
    key: &str,
    body: &mut R,
    writer: &mut WriteMultipart,
) -> Result<u64, ObjectStorageError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_BUFFER_BYTES);
    let mut size: u64 = 0;

    loop {
        buf.reserve(READ_BUFFER_BYTES);
        let read = body
            .read_buf(&mut buf)
            .await
            .map_err(|source| ObjectStorageError::ReadFailed {
                key: key.to_string(),
                source,
            })?;
        if read == 0 {
            return Ok(size);
        }
        size += read as u64;

        writer
            .wait_for_capacity(MAX_PARTS_IN_FLIGHT)
            .await
            .map_err(|source| upload_failed(key, source))?;
        writer.put(buf.split().freeze());
    }
}

fn upload_failed(key: &str, source: object_store::Error) -> ObjectStorageError {
    ObjectStorageError::UploadFailed {
        key: key.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::{ObjectStoreExt, memory::InMemory};
    use std::io::Cursor;

    #[test]
    fn distribution_urls() {
        let base = ObjectUrlBase::Distribution("https://d111.cloudfront.net/".into());
        assert_eq!(
            base.object_url("landscape/abc.mp4"),
            "https://d111.cloudfront.net/landscape/abc.mp4"
        );
    }

    #[test]
    fn endpoint_urls_are_path_style() {
        let base = ObjectUrlBase::Endpoint {
            endpoint: "http://localhost:9000".into(),
            bucket: "videos".into(),
        };
        assert_eq!(
            base.object_url("other/abc.mp4"),
            "http://localhost:9000/videos/other/abc.mp4"
        );
    }

    #[test]
    fn bucket_urls_are_virtual_hosted() {
        let base = ObjectUrlBase::Bucket {
            bucket: "videos".into(),
            region: "eu-west-1".into(),
        };
        assert_eq!(
            base.object_url("portrait/abc.mp4"),
            "https://videos.s3.eu-west-1.amazonaws.com/portrait/abc.mp4"
        );
    }

    fn cdn_storage(store: Arc<InMemory>) -> VideoStorage {
        VideoStorage::new(
            store,
            ObjectUrlBase::Distribution("https://cdn.example.com".into()),
        )
    }

    async fn stored(store: &InMemory, key: &str) -> (Option<String>, Vec<u8>) {
        let result = store.get(&Path::from(key)).await.unwrap();
        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| AsRef::<str>::as_ref(value).to_string());
        (content_type, result.bytes().await.unwrap().to_vec())
    }

    #[tokio::test]
    async fn put_video_stores_bytes_with_content_type() {
        let store = Arc::new(InMemory::new());
        let storage = cdn_storage(store.clone());

        let mut body = Cursor::new(b"payload".to_vec());
        let url = storage
            .put_video("other/abc.mp4", &mut body, "video/mp4")
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/other/abc.mp4");

        let (content_type, data) = stored(&store, "other/abc.mp4").await;
        assert_eq!(content_type.as_deref(), Some("video/mp4"));
        assert_eq!(data, b"payload");
    }

    #[tokio::test]
    async fn put_video_streams_bodies_spanning_several_parts() {
        let store = Arc::new(InMemory::new());
        let storage = cdn_storage(store.clone());

        let payload: Vec<u8> = (0..UPLOAD_PART_BYTES * 2 + 4096)
            .map(|i| (i % 251) as u8)
            .collect();
        let mut body = Cursor::new(payload.clone());
        storage
            .put_video("landscape/big.mp4", &mut body, "video/mp4")
            .await
            .unwrap();

        let (content_type, data) = stored(&store, "landscape/big.mp4").await;
        assert_eq!(content_type.as_deref(), Some("video/mp4"));
        assert_eq!(data.len(), payload.len());
        assert!(data == payload, "stored bytes differ from the body");
    }

    #[tokio::test]
    async fn put_video_reports_read_failures_and_stores_nothing() {
        let store = Arc::new(InMemory::new());
        let storage = cdn_storage(store.clone());

        let mut body = truncated_body();
        let err = storage
            .put_video("other/broken.mp4", &mut body, "video/mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStorageError::ReadFailed { .. }), "{err}");
        assert!(store.head(&Path::from("other/broken.mp4")).await.is_err());
    }

    /// Yields some bytes, then fails.
    fn truncated_body() -> impl AsyncRead + Unpin {
        Cursor::new(vec![1u8; 16]).chain(FailingReader)
    }

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("disk went away")))
        }
    }
}
