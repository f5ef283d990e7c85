//! Extraction job definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{CandidateWindow, WindowType};

/// Why a single transcode did not produce a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionErrorKind {
    /// The transcoding engine exited non-zero
    EngineError {
        exit_code: Option<i32>,
        message: String,
    },
    /// The engine exited zero but the output file is missing
    OutputNotCreated,
    /// The engine was killed after exceeding the per-job timeout
    TimedOut { secs: u64 },
    /// The engine could not be started at all
    LaunchFailed { message: String },
}

impl ExtractionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionErrorKind::EngineError { .. } => "engine_error",
            ExtractionErrorKind::OutputNotCreated => "output_not_created",
            ExtractionErrorKind::TimedOut { .. } => "timed_out",
            ExtractionErrorKind::LaunchFailed { .. } => "launch_failed",
        }
    }
}

impl std::fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionErrorKind::EngineError { exit_code, message } => match exit_code {
                Some(code) => write!(f, "engine error (exit {}): {}", code, message),
                None => write!(f, "engine error: {}", message),
            },
            ExtractionErrorKind::OutputNotCreated => f.write_str("output file not created"),
            ExtractionErrorKind::TimedOut { secs } => write!(f, "timed out after {}s", secs),
            ExtractionErrorKind::LaunchFailed { message } => {
                write!(f, "engine launch failed: {}", message)
            }
        }
    }
}

/// Lifecycle of an extraction job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Queued,
    Running,
    Succeeded {
        size_bytes: u64,
        duration_secs: f64,
    },
    Failed {
        error: ExtractionErrorKind,
    },
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded { .. } => "succeeded",
            JobState::Failed { .. } => "failed",
        }
    }
}

/// One transcode of one window.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionJob {
    /// Position of the window in the caller's list
    pub index: usize,
    /// Batch this job runs in
    pub batch_index: usize,
    pub source_path: PathBuf,
    pub window: CandidateWindow,
    pub output_path: PathBuf,
    #[serde(default)]
    pub state: JobState,
}

impl ExtractionJob {
    pub fn new(
        index: usize,
        batch_index: usize,
        source_path: impl Into<PathBuf>,
        window: CandidateWindow,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            index,
            batch_index,
            source_path: source_path.into(),
            window,
            output_path: output_path.into(),
            state: JobState::Queued,
        }
    }
}

/// A clip that was written successfully.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResult {
    pub index: usize,
    pub path: PathBuf,
    pub start: f64,
    pub end: f64,
    pub duration_secs: f64,
    pub size_bytes: u64,
    pub score: f64,
    pub reason: String,
    #[serde(rename = "type")]
    pub window_type: WindowType,
}

/// A window that could not be extracted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionFailure {
    pub index: usize,
    pub error: ExtractionErrorKind,
}

/// Partitioned outcome of an extraction run.
///
/// Both lists are ordered by `index`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionReport {
    pub succeeded: Vec<ExtractionResult>,
    pub failed: Vec<ExtractionFailure>,
}

impl ExtractionReport {
    /// Number of windows accounted for.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}
