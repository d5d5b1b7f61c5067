//! Media-type helpers, storage key generation and the MP4 container check.

use rand::Rng;
use std::io::{self, SeekFrom};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::services::probe::AspectRatio;

/// Random bytes behind every storage key (256 bits).
const KEY_ENTROPY_BYTES: usize = 32;

/// Extension used when the media type cannot be split into type/subtype.
const FALLBACK_EXTENSION: &str = ".bin";

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("file is shorter than an mp4 header")]
    TooShort,
    #[error("file type is not mp4")]
    NotMp4,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Parse a `Content-Type` value down to its lowercase `type/subtype`.
///
/// Parameters such as `; codecs=...` are dropped. Returns `None` when the
/// value is not a well-formed media type.
pub fn parse_media_type(value: &str) -> Option<String> {
    let essence = value.split(';').next()?.trim();
    let (kind, subtype) = essence.split_once('/')?;
    if !is_token(kind) || !is_token(subtype) {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}

fn is_token(part: &str) -> bool {
    !part.is_empty()
        && part.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#' | b'$' | b'&' | b'-' | b'^' | b'_' | b'.' | b'+'
                )
        })
}

/// `video/mp4` -> `.mp4`; anything that isn't `type/subtype` -> `.bin`.
pub fn media_type_to_ext(media_type: &str) -> String {
    let parts: Vec<&str> = media_type.split('/').collect();
    match parts.as_slice() {
        [_, subtype] => format!(".{}", subtype),
        _ => FALLBACK_EXTENSION.to_string(),
    }
}

/// Build `<prefix><64 hex chars><ext>` from a fresh 256-bit random identifier.
pub fn storage_key(aspect_ratio: AspectRatio, media_type: &str) -> String {
    let random_bytes: [u8; KEY_ENTROPY_BYTES] = rand::rng().random();
    format!(
        "{}{}{}",
        aspect_ratio.key_prefix(),
        hex::encode(random_bytes),
        media_type_to_ext(media_type)
    )
}

/// Check the ISO base media `ftyp` box signature at bytes 4..8.
///
/// The reader is rewound to the start on success so it can be reused.
pub async fn verify_mp4<R>(reader: &mut R) -> Result<(), ContainerError>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let mut header = [0u8; 12];
    reader.read_exact(&mut header).await.map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ContainerError::TooShort
        } else {
            ContainerError::Io(err)
        }
    })?;

    if &header[4..8] != b"ftyp" {
        return Err(ContainerError::NotMp4);
    }

    reader.seek(SeekFrom::Start(0)).await?;
    Ok(())
}
