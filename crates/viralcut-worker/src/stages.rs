//! Stage execution.
//!
//! [`StageRunner`] turns an [`AgentRequest`] into an [`AgentOutput`]. The
//! coordinator calls it directly in inline mode; the agent binary calls it
//! for the one request it receives on stdin.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use viralcut_media::{
    FfmpegAnalyzer, FfmpegRunner, FfmpegTranscoder, MediaAnalyzer, SourceResolver, Transcoder,
    YtDlpResolver,
};
use viralcut_models::{
    AgentOutput, AgentRequest, AnalysisReport, CandidateWindow, EncodingConfig, ExtractionReport,
    SourceInfo,
};

use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::extraction::ExtractionOrchestrator;
use crate::logging::JobLogger;
use crate::metrics;
use crate::scoring::HighlightScorer;
use crate::signal_extractor::{SignalExtractor, SignalSettings};

/// Collaborators a runner drives.
#[derive(Clone)]
pub struct StageServices {
    pub analyzer: Arc<dyn MediaAnalyzer>,
    pub transcoder: Arc<dyn Transcoder>,
    pub resolver: Arc<dyn SourceResolver>,
}

impl StageServices {
    /// Real engines located through env overrides or `PATH`.
    pub fn discover(config: &PipelineConfig) -> WorkerResult<Self> {
        let analyzer = FfmpegAnalyzer::discover()?.with_timeout(config.analysis_timeout.as_secs());
        let ffmpeg = viralcut_media::check_ffmpeg()?;
        let transcoder = FfmpegTranscoder::new(
            FfmpegRunner::new(ffmpeg).with_timeout(config.transcode_timeout.as_secs()),
            EncodingConfig::default(),
        );
        // Only remote sources need yt-dlp; a missing binary surfaces at download time
        let resolver = YtDlpResolver::discover()
            .unwrap_or_else(|e| {
                warn!(error = %e, "yt-dlp not found, remote sources will fail");
                YtDlpResolver::new("yt-dlp")
            })
            .with_delay_range(config.download_min_delay_ms, config.download_max_delay_ms)
            .with_retries(config.download_retries, config.download_retry_delay_ms)
            .with_cookies_file(config.cookies_file.clone());

        Ok(Self {
            analyzer: Arc::new(analyzer),
            transcoder: Arc::new(transcoder),
            resolver: Arc::new(resolver),
        })
    }
}

pub struct StageRunner {
    config: PipelineConfig,
    services: StageServices,
    scorer: HighlightScorer,
}

impl StageRunner {
    pub fn new(config: PipelineConfig, services: StageServices) -> Self {
        let scorer = HighlightScorer::from(&config);
        Self {
            config,
            services,
            scorer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scorer(&self) -> &HighlightScorer {
        &self.scorer
    }

    /// Run one stage.
    pub async fn execute(&self, request: AgentRequest) -> WorkerResult<AgentOutput> {
        let logger = JobLogger::new(uuid::Uuid::new_v4().to_string()).for_stage(request.stage());
        let span = logger.create_span();
        async move {
            logger.log_start("stage request received");
            let output = match request {
                AgentRequest::Download { source, output_dir } => AgentOutput::Download {
                    source: self.download(&source, &output_dir).await?,
                },
                AgentRequest::Analyze {
                    video_path,
                    clip_duration,
                    max_clips,
                } => AgentOutput::Analyze {
                    report: self.analyze(&video_path, clip_duration, max_clips).await?,
                },
                AgentRequest::Extract {
                    source_path,
                    windows,
                    output_dir,
                    vertical_crop,
                    batch_size,
                } => AgentOutput::Extract {
                    report: self
                        .extract(
                            &source_path,
                            &windows,
                            &output_dir,
                            vertical_crop,
                            batch_size.unwrap_or(self.config.batch_size),
                        )
                        .await?,
                },
            };
            logger.log_completion("stage finished");
            Ok::<_, WorkerError>(output)
        }
        .instrument(span)
        .await
    }

    /// Fetch a remote source into `output_dir`.
    pub async fn download(&self, source: &str, output_dir: &Path) -> WorkerResult<SourceInfo> {
        Ok(self.services.resolver.resolve(source, output_dir).await?)
    }

    /// Extract signals, score, and fall back to the whole video when
    /// nothing scores high enough. At most `max_clips` windows are kept.
    pub async fn analyze(
        &self,
        video_path: &Path,
        clip_duration: f64,
        max_clips: usize,
    ) -> WorkerResult<AnalysisReport> {
        let extractor = SignalExtractor::new(
            Arc::clone(&self.services.analyzer),
            SignalSettings::from(&self.config),
        );
        let (metadata, signals) = extractor.extract(video_path).await?;

        let mut windows = self.scorer.select_moments(
            metadata.duration_secs,
            &signals.silence,
            &signals.energy_peaks,
            clip_duration,
        );
        windows.truncate(max_clips.max(1));

        let used_fallback = windows.is_empty();
        if used_fallback {
            info!(
                duration_secs = metadata.duration_secs,
                "No window scored above base, using whole video"
            );
            metrics::record_scoring_fallback();
            windows.push(self.scorer.fallback_window(metadata.duration_secs));
        }

        Ok(AnalysisReport {
            metadata,
            signals,
            windows,
            used_fallback,
        })
    }

    pub async fn extract(
        &self,
        source_path: &Path,
        windows: &[CandidateWindow],
        output_dir: &Path,
        vertical_crop: bool,
        batch_size: usize,
    ) -> WorkerResult<ExtractionReport> {
        if !source_path.exists() {
            return Err(WorkerError::invalid_source(format!(
                "source file not found: {}",
                source_path.display()
            )));
        }
        ExtractionOrchestrator::new(Arc::clone(&self.services.transcoder))
            .with_batch_size(batch_size)
            .with_vertical_crop(vertical_crop)
            .extract(source_path, windows, output_dir)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal_extractor::tests::FakeAnalyzer;
    use async_trait::async_trait;
    use viralcut_media::{MediaError, MediaResult, TranscodeOutput, TranscodeRequest};
    use viralcut_models::{EnergyPeak, WindowType};

    struct WritingTranscoder;

    #[async_trait]
    impl Transcoder for WritingTranscoder {
        async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<TranscodeOutput> {
            tokio::fs::write(&request.output, b"clip").await?;
            Ok(TranscodeOutput { size_bytes: 4 })
        }
    }

    struct NoResolver;

    #[async_trait]
    impl SourceResolver for NoResolver {
        async fn resolve(&self, source: &str, _output_dir: &Path) -> MediaResult<SourceInfo> {
            Err(MediaError::InvalidUrl(source.to_string()))
        }
    }

    fn runner(analyzer: FakeAnalyzer) -> StageRunner {
        StageRunner::new(
            PipelineConfig::default(),
            StageServices {
                analyzer: Arc::new(analyzer),
                transcoder: Arc::new(WritingTranscoder),
                resolver: Arc::new(NoResolver),
            },
        )
    }

    #[tokio::test]
    async fn test_analyze_falls_back_to_whole_video() {
        let runner = runner(FakeAnalyzer::with_duration(300.0, true));
        let report = runner.analyze(Path::new("in.mp4"), 60.0, 5).await.unwrap();
        assert!(report.used_fallback);
        assert_eq!(report.windows.len(), 1);
        assert_eq!(report.windows[0].window_type, WindowType::Clip);
        assert_eq!((report.windows[0].start, report.windows[0].end), (0.0, 300.0));
    }

    #[tokio::test]
    async fn test_analyze_truncates_to_requested_count() {
        let mut analyzer = FakeAnalyzer::with_duration(3600.0, true);
        analyzer.peaks = (0..20)
            .map(|i| EnergyPeak {
                ordinal_index: i * 5,
                rms: 0.5,
            })
            .collect();
        let runner = runner(analyzer);
        let report = runner.analyze(Path::new("in.mp4"), 30.0, 3).await.unwrap();
        assert!(!report.used_fallback);
        assert_eq!(report.windows.len(), 3);
    }

    #[tokio::test]
    async fn test_execute_extract_request() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("talk.mp4");
        std::fs::write(&source, b"video").unwrap();
        let runner = runner(FakeAnalyzer::with_duration(300.0, true));

        let request = AgentRequest::Extract {
            source_path: source,
            windows: vec![CandidateWindow::new(0.0, 30.0, 80.0, "x", WindowType::EnergyPeak)],
            output_dir: dir.path().join("clips"),
            vertical_crop: false,
            batch_size: None,
        };
        match runner.execute(request).await.unwrap() {
            AgentOutput::Extract { report } => {
                assert_eq!(report.succeeded.len(), 1);
                assert!(report.succeeded[0].path.ends_with("talk_clip_1.mp4"));
                assert!(report.succeeded[0].path.exists());
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_error_propagates() {
        let runner = runner(FakeAnalyzer::with_duration(300.0, true));
        let err = runner
            .execute(AgentRequest::Download {
                source: "nope".to_string(),
                output_dir: "/tmp".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Media(MediaError::InvalidUrl(_))));
    }
}
