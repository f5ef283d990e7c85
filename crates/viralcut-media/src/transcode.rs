//! Clip transcoding.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

use viralcut_models::EncodingConfig;

use crate::command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::build_clip_filter;

/// One bounded segment to cut out of a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub source: PathBuf,
    pub start: f64,
    pub duration: f64,
    pub output: PathBuf,
    pub vertical_crop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeOutput {
    pub size_bytes: u64,
}

/// Produces a clip file for a request.
///
/// `Ok` means the output file exists. An engine that exits cleanly without
/// writing the file yields [`MediaError::OutputNotCreated`].
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<TranscodeOutput>;
}

/// [`Transcoder`] that shells out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
}

impl FfmpegTranscoder {
    pub fn new(runner: FfmpegRunner, encoding: EncodingConfig) -> Self {
        Self { runner, encoding }
    }

    /// Use the discovered ffmpeg with default encoding.
    pub fn discover() -> MediaResult<Self> {
        Ok(Self::new(
            FfmpegRunner::new(check_ffmpeg()?),
            EncodingConfig::default(),
        ))
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    /// The command a request turns into.
    pub fn build_command(&self, request: &TranscodeRequest) -> FfmpegCommand {
        FfmpegCommand::new(&request.source, &request.output)
            .seek(request.start)
            .duration(request.duration)
            .video_filter(build_clip_filter(
                request.vertical_crop,
                self.encoding.frame_rate,
            ))
            .output_args(self.encoding.to_ffmpeg_args())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<TranscodeOutput> {
        if !request.source.exists() {
            return Err(MediaError::FileNotFound(request.source.clone()));
        }

        let cmd = self.build_command(request);
        debug!(
            output = %request.output.display(),
            start = request.start,
            duration = request.duration,
            "Transcoding clip"
        );
        self.runner.run(&cmd).await?;

        match tokio::fs::metadata(&request.output).await {
            Ok(meta) => {
                info!(
                    output = %request.output.display(),
                    size_bytes = meta.len(),
                    "Clip written"
                );
                Ok(TranscodeOutput {
                    size_bytes: meta.len(),
                })
            }
            Err(_) => Err(MediaError::OutputNotCreated(request.output.clone())),
        }
    }
}
