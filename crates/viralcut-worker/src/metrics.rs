//! Pipeline counters.
//!
//! No recorder is installed here; without one every call is a no-op.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const EXTRACTION_JOBS_SUCCEEDED: &str = "viralcut_extraction_jobs_succeeded_total";
    pub const EXTRACTION_JOBS_FAILED: &str = "viralcut_extraction_jobs_failed_total";
    pub const AGENT_SPAWNS_TOTAL: &str = "viralcut_agent_spawns_total";
    pub const AGENT_SPAWNS_REJECTED: &str = "viralcut_agent_spawns_rejected_total";
    pub const SCORING_FALLBACKS_TOTAL: &str = "viralcut_scoring_fallbacks_total";
}

pub fn record_job_succeeded() {
    counter!(names::EXTRACTION_JOBS_SUCCEEDED).increment(1);
}

/// Record a failed transcode labelled with its error kind.
pub fn record_job_failed(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::EXTRACTION_JOBS_FAILED, &labels).increment(1);
}

pub fn record_agent_spawned(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::AGENT_SPAWNS_TOTAL, &labels).increment(1);
}

pub fn record_spawn_rejected(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::AGENT_SPAWNS_REJECTED, &labels).increment(1);
}

pub fn record_scoring_fallback() {
    counter!(names::SCORING_FALLBACKS_TOTAL).increment(1);
}
