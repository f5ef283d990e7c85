//! Highlight scoring.
//!
//! A stride sweep over the timeline. Cost is proportional to
//! `duration / STRIDE_SECS` and the result depends only on the inputs.

use tracing::debug;

use viralcut_models::{CandidateWindow, EnergyPeak, SilenceInterval, WindowType};

use crate::config::PipelineConfig;

/// Distance between candidate points, also the first point.
pub const STRIDE_SECS: f64 = 30.0;
/// Half-width of the silence guard around a candidate point.
pub const SILENCE_GUARD_SECS: f64 = 5.0;
/// Lead-in before the candidate point.
pub const LEAD_IN_SECS: f64 = 5.0;
pub const BASE_SCORE: f64 = 50.0;
pub const ENERGY_BONUS: f64 = 30.0;
pub const SILENCE_PENALTY: f64 = 40.0;
/// A silence midpoint closer than this to the point is penalised.
pub const SILENCE_RADIUS_SECS: f64 = 15.0;
/// Peak and point agree when their residues mod 100 are closer than this.
pub const ENERGY_MATCH_DISTANCE: f64 = 10.0;
/// Hard cap on returned windows.
pub const MAX_WINDOWS: usize = 10;

const ENERGY_REASON: &str = "High energy segment";
const FALLBACK_REASON: &str = "Full video";

/// Pure scorer over duration and signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightScorer {
    min_clip_secs: f64,
    max_clip_secs: f64,
}

impl Default for HighlightScorer {
    fn default() -> Self {
        Self::new(30.0, 60.0)
    }
}

impl From<&PipelineConfig> for HighlightScorer {
    fn from(config: &PipelineConfig) -> Self {
        Self::new(config.min_clip_secs, config.max_clip_secs)
    }
}

impl HighlightScorer {
    pub fn new(min_clip_secs: f64, max_clip_secs: f64) -> Self {
        let min_clip_secs = min_clip_secs.max(1.0);
        Self {
            min_clip_secs,
            max_clip_secs: max_clip_secs.max(min_clip_secs),
        }
    }

    /// Clip length clamped into the configured band.
    pub fn clip_duration(&self, requested: f64) -> f64 {
        if requested.is_finite() {
            requested.clamp(self.min_clip_secs, self.max_clip_secs)
        } else {
            self.max_clip_secs
        }
    }

    /// Score of the candidate point `t`, or `None` when silence sits within
    /// the guard band around it.
    ///
    /// The energy bonus compares `ordinal_index mod 100` with `t mod 100`;
    /// the ordinal is a measurement counter, not a timestamp.
    pub fn score_candidate(
        &self,
        t: f64,
        silence: &[SilenceInterval],
        peaks: &[EnergyPeak],
    ) -> Option<f64> {
        if silence
            .iter()
            .any(|s| s.overlaps(t - SILENCE_GUARD_SECS, t + SILENCE_GUARD_SECS))
        {
            return None;
        }

        let mut score = BASE_SCORE;

        let t_residue = t % 100.0;
        if peaks
            .iter()
            .any(|p| ((p.ordinal_index % 100) as f64 - t_residue).abs() < ENERGY_MATCH_DISTANCE)
        {
            score += ENERGY_BONUS;
        }

        if silence
            .iter()
            .any(|s| (s.midpoint() - t).abs() < SILENCE_RADIUS_SECS)
        {
            score -= SILENCE_PENALTY;
        }

        Some(score.clamp(0.0, 100.0))
    }

    /// Ranked windows above the base score, best first, at most
    /// [`MAX_WINDOWS`]. An empty result is left to the caller; see
    /// [`HighlightScorer::fallback_window`].
    pub fn select_moments(
        &self,
        duration: f64,
        silence: &[SilenceInterval],
        peaks: &[EnergyPeak],
        clip_duration: f64,
    ) -> Vec<CandidateWindow> {
        if !duration.is_finite() || duration <= 0.0 {
            return Vec::new();
        }
        let clip = self.clip_duration(clip_duration);

        let mut windows = Vec::new();
        let mut t = STRIDE_SECS;
        while t < duration - clip {
            if let Some(score) = self.score_candidate(t, silence, peaks) {
                if score > BASE_SCORE {
                    let start = (t - LEAD_IN_SECS).max(0.0);
                    let end = (t + clip - LEAD_IN_SECS).min(duration);
                    windows.push(CandidateWindow::new(
                        start,
                        end,
                        score,
                        ENERGY_REASON,
                        WindowType::EnergyPeak,
                    ));
                }
            }
            t += STRIDE_SECS;
        }

        // Stable: equal scores keep timeline order
        windows.sort_by(|a, b| b.score.total_cmp(&a.score));
        windows.truncate(MAX_WINDOWS);

        debug!(
            duration,
            clip_duration = clip,
            selected = windows.len(),
            "Scored candidate windows"
        );
        windows
    }

    /// The whole video as a single window.
    pub fn fallback_window(&self, duration: f64) -> CandidateWindow {
        CandidateWindow::new(
            0.0,
            duration.max(0.0),
            BASE_SCORE,
            FALLBACK_REASON,
            WindowType::Clip,
        )
    }
}
