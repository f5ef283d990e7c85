//! Resolved source video.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A remote video fetched into a local file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SourceInfo {
    pub local_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
}

impl SourceInfo {
    /// Describe a file that is already on disk.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let local_path = path.into();
        let title = local_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            local_path,
            video_id: None,
            title,
            duration_secs: None,
            uploader: None,
            view_count: None,
        }
    }
}
