//! Media error types.

use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg is not installed or not on PATH")]
    FfmpegNotFound,

    #[error("ffprobe is not installed or not on PATH")]
    FfprobeNotFound,

    #[error("ffmpeg failed: {message}")]
    FfmpegFailed {
        message: String,
        /// Tail of ffmpeg's stderr
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("ffprobe failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("input does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    /// The source exists but cannot be used, e.g. it has no video stream.
    #[error("unusable source: {0}")]
    UnusableSource(String),

    #[error("overlay rejected: {0}")]
    InvalidOverlay(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unreadable ffprobe output: {0}")]
    ProbeOutput(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_overlay(message: impl Into<String>) -> Self {
        Self::InvalidOverlay(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True when ffmpeg ran to completion and reported failure.
    pub fn is_nonzero_exit(&self) -> bool {
        matches!(self, MediaError::FfmpegFailed { exit_code: Some(code), .. } if *code != 0)
    }
}
