//! Signal extraction.
//!
//! Wraps a [`MediaAnalyzer`] with the pipeline's failure policy: the probe
//! is fatal, every detector degrades to an empty signal.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use viralcut_media::MediaAnalyzer;
use viralcut_models::{
    EnergyPeak, LoudnessSample, SceneChange, SignalSet, SilenceInterval, VideoMetadata,
};

use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};

/// Detector parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSettings {
    pub noise_floor_db: f64,
    pub min_silence_secs: f64,
    pub rms_threshold: f64,
    pub max_energy_peaks: usize,
    /// `None` skips scene detection.
    pub scene_threshold: Option<f64>,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            noise_floor_db: -30.0,
            min_silence_secs: 2.0,
            rms_threshold: 0.1,
            max_energy_peaks: 20,
            scene_threshold: Some(0.5),
        }
    }
}

impl From<&PipelineConfig> for SignalSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            noise_floor_db: config.silence_noise_db,
            min_silence_secs: config.silence_min_duration,
            rms_threshold: config.rms_threshold,
            max_energy_peaks: config.max_energy_peaks,
            scene_threshold: (config.scene_threshold > 0.0).then_some(config.scene_threshold),
        }
    }
}

pub struct SignalExtractor {
    analyzer: Arc<dyn MediaAnalyzer>,
    settings: SignalSettings,
}

impl SignalExtractor {
    pub fn new(analyzer: Arc<dyn MediaAnalyzer>, settings: SignalSettings) -> Self {
        Self { analyzer, settings }
    }

    pub fn settings(&self) -> &SignalSettings {
        &self.settings
    }

    /// Container metadata; any failure aborts the run.
    pub async fn probe(&self, path: &Path) -> WorkerResult<VideoMetadata> {
        self.analyzer
            .probe(path)
            .await
            .map_err(|e| WorkerError::ProbeFailed(e.to_string()))
    }

    pub async fn detect_silence(&self, path: &Path) -> Vec<SilenceInterval> {
        self.analyzer
            .detect_silence(
                path,
                self.settings.noise_floor_db,
                self.settings.min_silence_secs,
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Silence detection failed, continuing without it");
                Vec::new()
            })
    }

    pub async fn detect_loudness(&self, path: &Path) -> Option<LoudnessSample> {
        self.analyzer
            .detect_loudness(path)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Loudness measurement failed, continuing without it");
                None
            })
    }

    pub async fn detect_energy_peaks(&self, path: &Path) -> Vec<EnergyPeak> {
        self.analyzer
            .detect_energy_peaks(
                path,
                self.settings.rms_threshold,
                self.settings.max_energy_peaks,
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Energy detection failed, continuing without it");
                Vec::new()
            })
    }

    pub async fn detect_scene_changes(&self, path: &Path) -> Vec<SceneChange> {
        let Some(threshold) = self.settings.scene_threshold else {
            return Vec::new();
        };
        self.analyzer
            .detect_scene_changes(path, threshold)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Scene detection failed, continuing without it");
                Vec::new()
            })
    }

    /// Probe, then run every applicable detector concurrently.
    pub async fn extract(&self, path: &Path) -> WorkerResult<(VideoMetadata, SignalSet)> {
        let metadata = self.probe(path).await?;

        let signals = if metadata.has_audio {
            let (silence, loudness, energy_peaks, scene_changes) = tokio::join!(
                self.detect_silence(path),
                self.detect_loudness(path),
                self.detect_energy_peaks(path),
                self.detect_scene_changes(path),
            );
            SignalSet {
                silence,
                loudness,
                energy_peaks,
                scene_changes,
            }
        } else {
            info!("Source has no audio stream, skipping audio detectors");
            SignalSet {
                scene_changes: self.detect_scene_changes(path).await,
                ..SignalSet::default()
            }
        };

        info!(
            duration_secs = metadata.duration_secs,
            silence = signals.silence.len(),
            energy_peaks = signals.energy_peaks.len(),
            scene_changes = signals.scene_changes.len(),
            has_loudness = signals.loudness.is_some(),
            "Signals extracted"
        );

        Ok((metadata, signals))
    }
}
