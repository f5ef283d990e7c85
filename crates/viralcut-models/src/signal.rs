//! Signals measured from a source video.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A silent stretch of audio, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SilenceInterval {
    pub start: f64,
    pub end: f64,
}

impl SilenceInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Midpoint of the interval.
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }

    /// Whether the interval intersects `[from, to]` (inclusive on both ends).
    pub fn overlaps(&self, from: f64, to: f64) -> bool {
        self.start <= to && self.end >= from
    }
}

/// Whole-file loudness aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoudnessSample {
    pub mean_db: f64,
    pub max_db: f64,
}

/// A loud measurement reported by the energy meter.
///
/// `ordinal_index` is the position of the measurement in the meter's
/// output stream, not a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnergyPeak {
    pub ordinal_index: u64,
    pub rms: f64,
}

/// A detected shot boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneChange {
    pub timestamp_secs: f64,
}

/// Every signal gathered for one source. Missing signals are empty or `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SignalSet {
    #[serde(default)]
    pub silence: Vec<SilenceInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loudness: Option<LoudnessSample>,
    #[serde(default)]
    pub energy_peaks: Vec<EnergyPeak>,
    #[serde(default)]
    pub scene_changes: Vec<SceneChange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_overlap_is_inclusive() {
        let silence = SilenceInterval::new(100.0, 110.0);
        assert!(silence.overlaps(100.0, 110.0));
        assert!(silence.overlaps(110.0, 120.0));
        assert!(silence.overlaps(90.0, 100.0));
        assert!(!silence.overlaps(110.5, 120.0));
        assert!((silence.midpoint() - 105.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_signal_set_deserializes() {
        let set: SignalSet = serde_json::from_str("{}").unwrap();
        assert!(set.silence.is_empty());
        assert!(set.loudness.is_none());
    }
}
