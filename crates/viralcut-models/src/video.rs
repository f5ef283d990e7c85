//! Video metadata models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Snapshot of a source file taken from a single probe call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    /// Duration in seconds
    pub duration_secs: f64,
    /// Width of the first video stream in pixels
    pub width: u32,
    /// Height of the first video stream in pixels
    pub height: u32,
    /// Whether the container carries at least one audio stream
    pub has_audio: bool,
    /// Container format name as reported by the probe (e.g. "mov,mp4,m4a")
    pub format_name: String,
}

impl VideoMetadata {
    /// Whether the frame is wider than it is tall.
    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation() {
        let meta = VideoMetadata {
            duration_secs: 10.0,
            width: 1920,
            height: 1080,
            has_audio: true,
            format_name: "mp4".to_string(),
        };
        assert!(meta.is_landscape());

        let portrait = VideoMetadata {
            width: 1080,
            height: 1920,
            ..meta
        };
        assert!(!portrait.is_landscape());
    }
}
