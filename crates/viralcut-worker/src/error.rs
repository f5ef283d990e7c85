//! Worker error types.

use thiserror::Error;

use viralcut_models::{StageType, TaskId};

pub type WorkerResult<T> = Result<T, WorkerError>;
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised by the agent pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Pool at capacity ({active}/{max} agents)")]
    SpawnRejected { active: usize, max: usize },

    #[error("Task already active: {0}")]
    DuplicateTask(TaskId),

    #[error("Pool is shut down")]
    ShutDown,

    #[error("Request stage {request} does not match spawn stage {stage}")]
    StageMismatch { stage: StageType, request: StageType },

    #[error("Failed to launch agent: {0}")]
    Launch(String),

    #[error("Agent {task_id} reported failure: {message}")]
    StageFailed { task_id: TaskId, message: String },

    #[error("Agent {task_id} exited ({code:?}) without a result")]
    Exited { task_id: TaskId, code: Option<i32> },

    #[error("Agent {task_id} timed out after {secs}s")]
    TimedOut { task_id: TaskId, secs: u64 },

    #[error("Agent {task_id} was killed")]
    Killed { task_id: TaskId },

    #[error("Agent protocol error: {0}")]
    Protocol(String),
}

impl PoolError {
    /// Whether the caller may try the same spawn again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::SpawnRejected { .. })
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Stage failed: {0}")]
    StageFailed(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Media error: {0}")]
    Media(#[from] viralcut_media::MediaError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn stage_failed(msg: impl Into<String>) -> Self {
        Self::StageFailed(msg.into())
    }

    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_spawn_rejection_is_retryable() {
        assert!(PoolError::SpawnRejected { active: 4, max: 4 }.is_retryable());
        assert!(!PoolError::ShutDown.is_retryable());
        assert!(!PoolError::Killed {
            task_id: TaskId::from("t")
        }
        .is_retryable());
    }

    #[test]
    fn test_pool_error_converts() {
        let err: WorkerError = PoolError::SpawnRejected { active: 4, max: 4 }.into();
        assert_eq!(err.to_string(), "Pool error: Pool at capacity (4/4 agents)");
    }
}
