//! Video metadata probing and aspect-ratio classification.
//!
//! The probe is a trait so the pipeline can run against a fake in tests;
//! production uses `ffprobe` as a subprocess.

use async_trait::async_trait;
use serde::Deserialize;
use std::{io, path::Path, process::ExitStatus};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[source] io::Error),
    #[error("ffprobe exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("malformed ffprobe output: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("no video streams found")]
    NoStreams,
    #[error("video stream has no usable dimensions")]
    MissingDimensions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait VideoProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<VideoDimensions, ProbeError>;
}

/// Runs `ffprobe` against the file and reads the first video stream.
pub struct FfprobeProbe {
    program: String,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl VideoProbe for FfprobeProbe {
    #[tracing::instrument(skip(self), fields(program = %self.program))]
    async fn probe(&self, path: &Path) -> Result<VideoDimensions, ProbeError> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-print_format",
                "json",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe_output(&output.stdout)
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

/// Extract the first stream's dimensions from ffprobe's JSON output.
pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoDimensions, ProbeError> {
    let output: ProbeOutput = serde_json::from_slice(stdout)?;
    let stream = output.streams.first().ok_or(ProbeError::NoStreams)?;
    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            Ok(VideoDimensions { width, height })
        }
        _ => Err(ProbeError::MissingDimensions),
    }
}

/// Coarse orientation bucket, used as the storage key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    Portrait,
    Landscape,
    Other,
}

impl AspectRatio {
    /// Only near-exact 9:16 and 16:9 are recognised.
    pub fn classify(dimensions: VideoDimensions) -> Result<Self, ProbeError> {
        if dimensions.width == 0 || dimensions.height == 0 {
            return Err(ProbeError::MissingDimensions);
        }
        let ratio = f64::from(dimensions.width) / f64::from(dimensions.height);
        Ok(if 0.55 < ratio && ratio < 0.575 {
            AspectRatio::Portrait
        } else if 1.75 < ratio && ratio < 1.8 {
            AspectRatio::Landscape
        } else {
            AspectRatio::Other
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            AspectRatio::Portrait => "9:16",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Other => "other",
        }
    }

    pub fn key_prefix(self) -> &'static str {
        match self {
            AspectRatio::Portrait => "portrait/",
            AspectRatio::Landscape => "landscape/",
            AspectRatio::Other => "other/",
        }
    }
}
