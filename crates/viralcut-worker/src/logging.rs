//! Tracing setup and structured run logging.

use tracing::{error, info, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use viralcut_models::StageType;

/// Initialise the global subscriber.
///
/// `LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` overrides the
/// default `viralcut=info` directive. Output goes to stderr so an agent's
/// stdout stays reserved for protocol messages.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("viralcut=info,viralcut_worker=info,viralcut_media=info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // try_init: a subscriber may already be installed (tests, embedding)
    if use_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .ok();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

/// Lifecycle logger for one pipeline run and stage.
#[derive(Debug, Clone)]
pub struct JobLogger {
    run_id: String,
    stage: Option<StageType>,
}

impl JobLogger {
    /// Logger for a whole pipeline run.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            stage: None,
        }
    }

    /// Same run, narrowed to one stage.
    pub fn for_stage(&self, stage: StageType) -> Self {
        Self {
            run_id: self.run_id.clone(),
            stage: Some(stage),
        }
    }

    fn stage_name(&self) -> &'static str {
        self.stage.map(|s| s.as_str()).unwrap_or("pipeline")
    }

    pub fn log_start(&self, message: &str) {
        info!(run_id = %self.run_id, stage = self.stage_name(), "Started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(run_id = %self.run_id, stage = self.stage_name(), "Progress: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(run_id = %self.run_id, stage = self.stage_name(), "Error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(run_id = %self.run_id, stage = self.stage_name(), "Completed: {}", message);
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stage(&self) -> Option<StageType> {
        self.stage
    }

    /// Span carrying the run and stage as fields.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("stage", run_id = %self.run_id, stage = self.stage_name())
    }
}
