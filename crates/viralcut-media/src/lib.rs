#![deny(unreachable_patterns)]
//! External media engine boundary.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with timeouts
//! - FFprobe metadata probing
//! - Silence, loudness, energy and scene-change detectors
//! - The clip transcoder
//! - yt-dlp source resolution
//!
//! All parsing of engine text output lives here, behind the
//! [`MediaAnalyzer`], [`Transcoder`] and [`SourceResolver`] traits.

pub mod analyzer;
pub mod command;
pub mod download;
pub mod error;
pub mod filters;
pub mod probe;
pub mod signals;
pub mod transcode;

pub use analyzer::{FfmpegAnalyzer, MediaAnalyzer};
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use download::{extract_video_id, is_supported_url, SourceResolver, YtDlpResolver};
pub use error::{MediaError, MediaResult};
pub use probe::probe_video;
pub use transcode::{FfmpegTranscoder, TranscodeOutput, TranscodeRequest, Transcoder};
