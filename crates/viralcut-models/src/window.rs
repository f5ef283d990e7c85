//! Candidate window models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{SignalSet, VideoMetadata};

/// Why a window was proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    Hook,
    EnergyPeak,
    SceneChange,
    Clip,
}

impl WindowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowType::Hook => "hook",
            WindowType::EnergyPeak => "energy_peak",
            WindowType::SceneChange => "scene_change",
            WindowType::Clip => "clip",
        }
    }
}

impl std::fmt::Display for WindowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time range of the source being considered for extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CandidateWindow {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Length in seconds
    pub duration_secs: f64,
    /// Score in [0, 100]
    pub score: f64,
    /// Human-readable reason for the pick
    pub reason: String,
    #[serde(rename = "type")]
    pub window_type: WindowType,
}

impl CandidateWindow {
    pub fn new(
        start: f64,
        end: f64,
        score: f64,
        reason: impl Into<String>,
        window_type: WindowType,
    ) -> Self {
        Self {
            start,
            end,
            duration_secs: end - start,
            score,
            reason: reason.into(),
            window_type,
        }
    }
}

/// Output of the analyze stage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisReport {
    pub metadata: VideoMetadata,
    pub signals: SignalSet,
    /// Ranked windows, best first
    pub windows: Vec<CandidateWindow>,
    /// True when scoring produced nothing and the whole-video window was used
    #[serde(default)]
    pub used_fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_serializes_type_field() {
        let window = CandidateWindow::new(25.0, 85.0, 80.0, "High energy segment", WindowType::EnergyPeak);
        assert!((window.duration_secs - 60.0).abs() < f64::EPSILON);

        let json = serde_json::to_value(&window).unwrap();
        assert_eq!(json["type"], "energy_peak");
        assert_eq!(json["reason"], "High energy segment");
    }
}
