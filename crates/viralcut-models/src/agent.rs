//! Agent process contract.
//!
//! A supervisor writes one [`AgentRequest`] as a single JSON line to the
//! agent's stdin. The agent answers with [`AgentMessage`] values, one JSON
//! object per stdout line, ending with exactly one `completed` or `failed`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{AnalysisReport, CandidateWindow, ExtractionReport, SourceInfo};

/// Unique key for a task in the agent pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Pipeline stage an agent executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    Download,
    Analyze,
    Extract,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Download => "download",
            StageType::Analyze => "analyze",
            StageType::Extract => "extract",
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "download" => Ok(StageType::Download),
            "analyze" => Ok(StageType::Analyze),
            "extract" => Ok(StageType::Extract),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

/// Typed parameters for one stage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum AgentRequest {
    Download {
        source: String,
        output_dir: PathBuf,
    },
    Analyze {
        video_path: PathBuf,
        clip_duration: f64,
        max_clips: usize,
    },
    Extract {
        source_path: PathBuf,
        windows: Vec<CandidateWindow>,
        output_dir: PathBuf,
        #[serde(default)]
        vertical_crop: bool,
        /// Concurrent transcodes; the agent's own setting when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_size: Option<usize>,
    },
}

impl AgentRequest {
    pub fn stage(&self) -> StageType {
        match self {
            AgentRequest::Download { .. } => StageType::Download,
            AgentRequest::Analyze { .. } => StageType::Analyze,
            AgentRequest::Extract { .. } => StageType::Extract,
        }
    }
}

/// Typed result of one stage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum AgentOutput {
    Download { source: SourceInfo },
    Analyze { report: AnalysisReport },
    Extract { report: ExtractionReport },
}

impl AgentOutput {
    pub fn stage(&self) -> StageType {
        match self {
            AgentOutput::Download { .. } => StageType::Download,
            AgentOutput::Analyze { .. } => StageType::Analyze,
            AgentOutput::Extract { .. } => StageType::Extract,
        }
    }
}

/// One line of agent stdout.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    Log { message: String },
    Completed { output: AgentOutput },
    Failed { error: String },
}

impl AgentMessage {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    /// Encode as a single line (no trailing newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a stdout line. Anything that is not a message yields `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    /// Whether this message ends the conversation.
    pub fn is_final(&self) -> bool {
        matches!(self, AgentMessage::Completed { .. } | AgentMessage::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tagged_by_stage() {
        let request = AgentRequest::Analyze {
            video_path: PathBuf::from("/tmp/source.mp4"),
            clip_duration: 60.0,
            max_clips: 5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stage"], "analyze");
        assert_eq!(request.stage(), StageType::Analyze);

        let back: AgentRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.stage(), StageType::Analyze);
    }

    #[test]
    fn test_extract_request_batch_size_optional() {
        let json = r#"{"stage":"extract","source_path":"/tmp/a.mp4","windows":[],"output_dir":"/tmp/out"}"#;
        match serde_json::from_str::<AgentRequest>(json).unwrap() {
            AgentRequest::Extract { batch_size, vertical_crop, .. } => {
                assert_eq!(batch_size, None);
                assert!(!vertical_crop);
            }
            other => panic!("unexpected request: {:?}", other),
        }

        let request = AgentRequest::Extract {
            source_path: PathBuf::from("/tmp/a.mp4"),
            windows: Vec::new(),
            output_dir: PathBuf::from("/tmp/out"),
            vertical_crop: false,
            batch_size: Some(1),
        };
        assert_eq!(serde_json::to_value(&request).unwrap()["batch_size"], 1);
    }

    #[test]
    fn test_parse_completed_line() {
        let line = r#"{"type":"completed","output":{"stage":"download","source":{"local_path":"/tmp/a.mp4","title":"a"}}}"#;
        let msg = AgentMessage::parse_line(line).unwrap();
        assert!(msg.is_final());
        match msg {
            AgentMessage::Completed { output } => assert_eq!(output.stage(), StageType::Download),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_free_text_is_not_a_message() {
        assert!(AgentMessage::parse_line("ffmpeg version 6.1").is_none());
        assert!(AgentMessage::parse_line("{not json").is_none());
        assert!(!AgentMessage::log("hello").is_final());
    }

    #[test]
    fn test_stage_from_str() {
        assert_eq!("extract".parse::<StageType>().unwrap(), StageType::Extract);
        assert!("upload".parse::<StageType>().is_err());
    }
}
