//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving the external engines.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Unparsable probe output: {0}")]
    ProbeParse(String),

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Output not created: {0}")]
    OutputNotCreated(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
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

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::DownloadFailed { .. } | MediaError::Timeout(_) | MediaError::Io(_)
        ) && !self.is_permanent_failure()
    }

    /// Sources the platform will never serve (private, removed, region
    /// blocked, live).
    pub fn is_permanent_failure(&self) -> bool {
        let MediaError::DownloadFailed { message } = self else {
            return false;
        };
        let msg = message.to_lowercase();

        if msg.contains("private video") || msg.contains("video is private") {
            return true;
        }

        if msg.contains("video unavailable")
            || msg.contains("video is unavailable")
            || msg.contains("video has been removed")
        {
            return true;
        }

        if msg.contains("not available in your country") || msg.contains("blocked in your country")
        {
            return true;
        }

        msg.contains("live stream") || msg.contains("live event")
    }
}
