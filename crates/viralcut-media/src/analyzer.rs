//! Media analysis behind a trait so the pipeline can be driven by a fake.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use viralcut_models::{EnergyPeak, LoudnessSample, SceneChange, SilenceInterval, VideoMetadata};

use crate::command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::filters::{filter_scdet, filter_silencedetect, FILTER_ASTATS_RMS, FILTER_VOLUMEDETECT};
use crate::probe::probe_video;
use crate::signals::{parse_energy_peaks, parse_loudness, parse_scene_changes, parse_silence};

/// Detector operations over a local video file.
#[async_trait]
pub trait MediaAnalyzer: Send + Sync {
    /// Container metadata. Failure here is fatal for analysis.
    async fn probe(&self, path: &Path) -> MediaResult<VideoMetadata>;

    async fn detect_silence(
        &self,
        path: &Path,
        noise_db: f64,
        min_duration: f64,
    ) -> MediaResult<Vec<SilenceInterval>>;

    async fn detect_loudness(&self, path: &Path) -> MediaResult<Option<LoudnessSample>>;

    async fn detect_energy_peaks(
        &self,
        path: &Path,
        threshold: f64,
        max_results: usize,
    ) -> MediaResult<Vec<EnergyPeak>>;

    async fn detect_scene_changes(&self, path: &Path, threshold: f64)
        -> MediaResult<Vec<SceneChange>>;
}

/// [`MediaAnalyzer`] backed by the ffmpeg and ffprobe executables.
#[derive(Debug, Clone)]
pub struct FfmpegAnalyzer {
    runner: FfmpegRunner,
    ffprobe: PathBuf,
}

impl FfmpegAnalyzer {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            runner: FfmpegRunner::new(ffmpeg),
            ffprobe: ffprobe.into(),
        }
    }

    /// Locate both executables via env overrides or `PATH`.
    pub fn discover() -> MediaResult<Self> {
        Ok(Self::new(check_ffmpeg()?, check_ffprobe()?))
    }

    /// Bound the probe and every analysis pass.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    async fn audio_pass(&self, path: &Path, filter: &str) -> MediaResult<String> {
        let cmd = FfmpegCommand::analysis(path).audio_filter(filter).no_video();
        self.runner.capture(&cmd).await
    }
}

#[async_trait]
impl MediaAnalyzer for FfmpegAnalyzer {
    async fn probe(&self, path: &Path) -> MediaResult<VideoMetadata> {
        probe_video(&self.ffprobe, path, self.runner.timeout_secs()).await
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn detect_silence(
        &self,
        path: &Path,
        noise_db: f64,
        min_duration: f64,
    ) -> MediaResult<Vec<SilenceInterval>> {
        let output = self
            .audio_pass(path, &filter_silencedetect(noise_db, min_duration))
            .await?;
        let silence = parse_silence(&output);
        debug!(count = silence.len(), "Silence intervals detected");
        Ok(silence)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn detect_loudness(&self, path: &Path) -> MediaResult<Option<LoudnessSample>> {
        let output = self.audio_pass(path, FILTER_VOLUMEDETECT).await?;
        Ok(parse_loudness(&output))
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn detect_energy_peaks(
        &self,
        path: &Path,
        threshold: f64,
        max_results: usize,
    ) -> MediaResult<Vec<EnergyPeak>> {
        let output = self.audio_pass(path, FILTER_ASTATS_RMS).await?;
        let peaks = parse_energy_peaks(&output, threshold, max_results);
        debug!(count = peaks.len(), "Energy peaks detected");
        Ok(peaks)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn detect_scene_changes(
        &self,
        path: &Path,
        threshold: f64,
    ) -> MediaResult<Vec<SceneChange>> {
        let cmd = FfmpegCommand::analysis(path)
            .video_filter(filter_scdet(threshold))
            .no_audio();
        let output = self.runner.capture(&cmd).await?;
        let scenes = parse_scene_changes(&output);
        debug!(count = scenes.len(), "Scene changes detected");
        Ok(scenes)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use std::os::unix::fs::PermissionsExt;

    fn fake_engine(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_detectors_parse_engine_output() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_engine(
            dir.path(),
            "ffmpeg",
            "cat >&2 <<'OUT'\n\
silence_start: 4\n\
silence_end: 9 | silence_duration: 5\n\
mean_volume: -20.5 dB\n\
max_volume: -0.3 dB\n\
lavfi.astats.Overall.RMS_level=-3.0\n\
lavfi.scd.time: 42.0\n\
OUT",
        );
        let analyzer = FfmpegAnalyzer::new(&ffmpeg, "ffprobe");
        let input = dir.path().join("in.mp4");

        let silence = analyzer.detect_silence(&input, -30.0, 2.0).await.unwrap();
        assert_eq!(silence, vec![SilenceInterval::new(4.0, 9.0)]);

        let loudness = analyzer.detect_loudness(&input).await.unwrap().unwrap();
        assert!((loudness.max_db + 0.3).abs() < 1e-9);

        let peaks = analyzer.detect_energy_peaks(&input, 0.1, 20).await.unwrap();
        assert_eq!(peaks.len(), 1);

        let scenes = analyzer.detect_scene_changes(&input, 0.5).await.unwrap();
        assert_eq!(scenes.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_bounds_probe_and_passes() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_engine(dir.path(), "ffmpeg", "exec sleep 10");
        let ffprobe = fake_engine(dir.path(), "ffprobe", "exec sleep 10");
        let analyzer = FfmpegAnalyzer::new(&ffmpeg, &ffprobe).with_timeout(1);
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"video").unwrap();

        let started = std::time::Instant::now();
        assert!(matches!(
            analyzer.probe(&input).await,
            Err(MediaError::Timeout(1))
        ));
        assert!(matches!(
            analyzer.detect_silence(&input, -30.0, 2.0).await,
            Err(MediaError::Timeout(1))
        ));
        assert!(started.elapsed() < std::time::Duration::from_secs(8));
    }
}
