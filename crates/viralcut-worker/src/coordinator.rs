//! Pipeline coordinator.
//!
//! Sequences download, analysis and extraction for one source. Each stage
//! runs inline or in an agent process, per [`ExecutionMode`].

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use viralcut_models::{
    AgentOutput, AgentRequest, AnalysisReport, ExtractionReport, SourceInfo, StageType, TaskId,
};

use crate::agent_pool::{AgentLauncher, AgentPool, BinaryLauncher};
use crate::config::{ExecutionMode, PipelineConfig};
use crate::error::{PoolError, WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::retry::{retry_async, RetryConfig};
use crate::stages::{StageRunner, StageServices};

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub source: SourceInfo,
    pub analysis: AnalysisReport,
    pub extraction: ExtractionReport,
}

pub struct Coordinator {
    config: PipelineConfig,
    runner: StageRunner,
    pool: Option<AgentPool>,
}

impl Coordinator {
    /// Build from config. Pooled mode launches the configured agent binary.
    pub fn new(config: PipelineConfig, services: StageServices) -> Self {
        let pool = match config.execution_mode {
            ExecutionMode::Inline => None,
            ExecutionMode::Pooled => {
                let launcher = match &config.agent_binary {
                    Some(path) => BinaryLauncher::new(path),
                    None => BinaryLauncher::sibling_of_current_exe(),
                };
                // Agents read their stage settings from the environment
                let launcher: Arc<dyn AgentLauncher> =
                    Arc::new(launcher.with_envs(config.to_env_vars()));
                Some(
                    AgentPool::new(launcher, config.max_agents)
                        .with_task_timeout(config.agent_timeout),
                )
            }
        };
        Self {
            runner: StageRunner::new(config.clone(), services),
            config,
            pool,
        }
    }

    /// Run every stage through `pool`.
    pub fn with_pool(mut self, pool: AgentPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn pool(&self) -> Option<&AgentPool> {
        self.pool.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Produce up to `clip_count` clips from `source`, a local path or a URL.
    pub async fn process(
        &self,
        source: &str,
        clip_count: Option<usize>,
    ) -> WorkerResult<PipelineReport> {
        let logger = JobLogger::new(uuid::Uuid::new_v4().to_string());
        let max_clips = self.config.clip_count(clip_count);
        logger.log_start(&format!("processing {} ({} clips)", source, max_clips));

        let source_info = if Path::new(source).is_file() {
            debug!(source, "Local source, skipping download");
            SourceInfo::local(source)
        } else {
            let request = AgentRequest::Download {
                source: source.to_string(),
                output_dir: self.config.work_dir.clone(),
            };
            match self.run_stage(&logger, request).await? {
                AgentOutput::Download { source } => source,
                other => return Err(unexpected(StageType::Download, &other)),
            }
        };

        let request = AgentRequest::Analyze {
            video_path: source_info.local_path.clone(),
            clip_duration: self.config.max_clip_secs,
            max_clips,
        };
        let analysis = match self.run_stage(&logger, request).await? {
            AgentOutput::Analyze { report } => report,
            other => return Err(unexpected(StageType::Analyze, &other)),
        };

        let request = AgentRequest::Extract {
            source_path: source_info.local_path.clone(),
            windows: analysis.windows.clone(),
            output_dir: self.config.output_dir.clone(),
            vertical_crop: self.config.vertical_crop,
            batch_size: Some(self.config.batch_size),
        };
        let extraction = match self.run_stage(&logger, request).await? {
            AgentOutput::Extract { report } => report,
            other => return Err(unexpected(StageType::Extract, &other)),
        };

        logger.log_completion(&format!(
            "{} clips written, {} failed",
            extraction.succeeded.len(),
            extraction.failed.len()
        ));

        Ok(PipelineReport {
            run_id: logger.run_id().to_string(),
            source: source_info,
            analysis,
            extraction,
        })
    }

    async fn run_stage(&self, logger: &JobLogger, request: AgentRequest) -> WorkerResult<AgentOutput> {
        let stage_logger = logger.for_stage(request.stage());
        stage_logger.log_progress("starting");
        let output = match &self.pool {
            Some(pool) => self.run_pooled(pool, &request).await,
            None => self.runner.execute(request).await,
        };
        if let Err(e) = &output {
            stage_logger.log_error(&e.to_string());
        }
        output
    }

    /// Spawn an agent, retrying while the pool is full.
    async fn run_pooled(&self, pool: &AgentPool, request: &AgentRequest) -> WorkerResult<AgentOutput> {
        let stage = request.stage();
        let retry = RetryConfig::new(format!("spawn_{}", stage))
            .with_max_retries(self.config.spawn_retries)
            .with_base_delay(self.config.spawn_retry_delay);

        let handle = retry_async(&retry, PoolError::is_retryable, || {
            pool.spawn(stage, TaskId::new(), request)
        })
        .await?;

        let completion = handle.wait().await;
        for line in &completion.output_lines {
            debug!(task_id = %completion.id, stage = %stage, "agent: {}", line);
        }
        info!(
            task_id = %completion.id,
            stage = %stage,
            status = ?completion.status,
            "Agent stage finished"
        );
        Ok(completion.into_output()?)
    }

    /// Kill any running agents.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.shutdown().await;
        }
    }
}

fn unexpected(expected: StageType, output: &AgentOutput) -> WorkerError {
    WorkerError::stage_failed(format!(
        "expected {} output, got {}",
        expected,
        output.stage()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal_extractor::tests::FakeAnalyzer;
    use async_trait::async_trait;
    use viralcut_media::{
        MediaResult, SourceResolver, TranscodeOutput, TranscodeRequest, Transcoder,
    };
    use viralcut_models::{EnergyPeak, WindowType};

    struct WritingTranscoder;

    #[async_trait]
    impl Transcoder for WritingTranscoder {
        async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<TranscodeOutput> {
            tokio::fs::write(&request.output, b"clip").await?;
            Ok(TranscodeOutput { size_bytes: 4 })
        }
    }

    /// Pretends to download by copying a fixture into the output dir.
    struct CopyResolver {
        fixture: std::path::PathBuf,
    }

    #[async_trait]
    impl SourceResolver for CopyResolver {
        async fn resolve(&self, _source: &str, output_dir: &Path) -> MediaResult<SourceInfo> {
            tokio::fs::create_dir_all(output_dir).await?;
            let local = output_dir.join("dQw4w9WgXcQ.mp4");
            tokio::fs::copy(&self.fixture, &local).await?;
            Ok(SourceInfo {
                video_id: Some("dQw4w9WgXcQ".to_string()),
                ..SourceInfo::local(local)
            })
        }
    }

    fn coordinator(dir: &Path, analyzer: FakeAnalyzer) -> Coordinator {
        let fixture = dir.join("fixture.mp4");
        std::fs::write(&fixture, b"video").unwrap();
        let config = PipelineConfig {
            output_dir: dir.join("output"),
            work_dir: dir.join("temp"),
            ..PipelineConfig::default()
        };
        Coordinator::new(
            config,
            StageServices {
                analyzer: Arc::new(analyzer),
                transcoder: Arc::new(WritingTranscoder),
                resolver: Arc::new(CopyResolver { fixture }),
            },
        )
    }

    #[tokio::test]
    async fn test_remote_source_runs_all_stages() {
        let dir = tempfile::tempdir().unwrap();
        let mut analyzer = FakeAnalyzer::with_duration(600.0, true);
        analyzer.peaks = vec![EnergyPeak {
            ordinal_index: 85,
            rms: 0.6,
        }];
        let coordinator = coordinator(dir.path(), analyzer);
        assert!(coordinator.pool().is_none());

        let report = coordinator
            .process("https://youtu.be/dQw4w9WgXcQ", Some(2))
            .await
            .unwrap();

        assert_eq!(report.source.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert!(!report.analysis.used_fallback);
        assert_eq!(report.analysis.windows.len(), 2);
        assert_eq!(report.extraction.succeeded.len(), 2);
        assert!(dir.path().join("output/dQw4w9WgXcQ_clip_1.mp4").exists());
        assert!(dir.path().join("output/dQw4w9WgXcQ_clip_2.mp4").exists());
    }

    #[tokio::test]
    async fn test_local_source_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), FakeAnalyzer::with_duration(300.0, true));
        let local = dir.path().join("fixture.mp4");

        let report = coordinator
            .process(local.to_str().unwrap(), None)
            .await
            .unwrap();

        assert_eq!(report.source.local_path, local);
        assert!(report.analysis.used_fallback);
        assert_eq!(report.analysis.windows[0].window_type, WindowType::Clip);
        assert_eq!(report.extraction.succeeded.len(), 1);
        assert!(dir.path().join("output/fixture_clip_1.mp4").exists());
    }
}
