//! Shared data models for the ViralCut clip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Source video metadata and the signals measured from it
//! - Candidate windows produced by the highlight scorer
//! - Extraction jobs, results and failures
//! - Encoding configuration for clip transcodes
//! - The typed request/response contract spoken by agent processes

pub mod agent;
pub mod encoding;
pub mod job;
pub mod signal;
pub mod source;
pub mod video;
pub mod window;

// Re-export common types
pub use agent::{AgentMessage, AgentOutput, AgentRequest, StageType, TaskId};
pub use encoding::EncodingConfig;
pub use job::{
    ExtractionErrorKind, ExtractionFailure, ExtractionJob, ExtractionReport, ExtractionResult,
    JobState,
};
pub use signal::{EnergyPeak, LoudnessSample, SceneChange, SignalSet, SilenceInterval};
pub use source::SourceInfo;
pub use video::VideoMetadata;
pub use window::{AnalysisReport, CandidateWindow, WindowType};
