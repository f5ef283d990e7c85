//! Clip pipeline core.
//!
//! This crate provides:
//! - Signal extraction over a [`viralcut_media::MediaAnalyzer`]
//! - The highlight scorer
//! - Batched clip extraction
//! - A bounded pool of agent processes
//! - The coordinator sequencing download, analysis and extraction

pub mod agent_pool;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod scoring;
pub mod signal_extractor;
pub mod stages;

pub use agent_pool::{AgentLauncher, AgentPool, BinaryLauncher, TaskCompletion, TaskHandle, TaskInfo, TaskStatus};
pub use config::{ExecutionMode, PipelineConfig};
pub use coordinator::{Coordinator, PipelineReport};
pub use error::{PoolError, PoolResult, WorkerError, WorkerResult};
pub use extraction::ExtractionOrchestrator;
pub use logging::JobLogger;
pub use scoring::HighlightScorer;
pub use signal_extractor::{SignalExtractor, SignalSettings};
pub use stages::{StageRunner, StageServices};
