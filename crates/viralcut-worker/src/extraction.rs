//! Batched clip extraction.
//!
//! Windows are cut in consecutive batches. Jobs inside a batch run
//! concurrently; the next batch starts only after the whole batch settles,
//! so at most `batch_size` transcodes are in flight.

use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use viralcut_media::{MediaError, TranscodeRequest, Transcoder};
use viralcut_models::{
    CandidateWindow, ExtractionErrorKind, ExtractionFailure, ExtractionJob, ExtractionReport,
    ExtractionResult, JobState,
};

use crate::error::WorkerResult;
use crate::metrics;

pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Classify a transcode failure.
pub fn classify_error(err: &MediaError) -> ExtractionErrorKind {
    match err {
        MediaError::OutputNotCreated(_) => ExtractionErrorKind::OutputNotCreated,
        MediaError::Timeout(secs) => ExtractionErrorKind::TimedOut { secs: *secs },
        MediaError::FfmpegFailed {
            message, exit_code, ..
        } => ExtractionErrorKind::EngineError {
            exit_code: *exit_code,
            message: message.clone(),
        },
        MediaError::FfmpegNotFound | MediaError::Io(_) => ExtractionErrorKind::LaunchFailed {
            message: err.to_string(),
        },
        other => ExtractionErrorKind::EngineError {
            exit_code: None,
            message: other.to_string(),
        },
    }
}

/// `<stem>_clip_<n>.mp4`, numbered from 1.
pub fn clip_output_path(source: &Path, out_dir: &Path, index: usize) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string());
    out_dir.join(format!("{}_clip_{}.mp4", stem, index + 1))
}

pub struct ExtractionOrchestrator {
    transcoder: Arc<dyn Transcoder>,
    batch_size: usize,
    vertical_crop: bool,
}

impl ExtractionOrchestrator {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            transcoder,
            batch_size: DEFAULT_BATCH_SIZE,
            vertical_crop: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_vertical_crop(mut self, vertical_crop: bool) -> Self {
        self.vertical_crop = vertical_crop;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Lay out one job per window, in window order.
    pub fn plan(&self, source: &Path, windows: &[CandidateWindow], out_dir: &Path) -> Vec<ExtractionJob> {
        windows
            .iter()
            .enumerate()
            .map(|(index, window)| {
                ExtractionJob::new(
                    index,
                    index / self.batch_size,
                    source,
                    window.clone(),
                    clip_output_path(source, out_dir, index),
                )
            })
            .collect()
    }

    /// Cut every window.
    ///
    /// Only a failure to create `out_dir` is an error. Per-job failures
    /// land in the report's `failed` list; both lists are in index order.
    pub async fn extract(
        &self,
        source: &Path,
        windows: &[CandidateWindow],
        out_dir: &Path,
    ) -> WorkerResult<ExtractionReport> {
        tokio::fs::create_dir_all(out_dir).await?;

        let mut jobs = self.plan(source, windows, out_dir);
        let batch_count = jobs.len().div_ceil(self.batch_size);

        for (batch_index, batch) in jobs.chunks_mut(self.batch_size).enumerate() {
            info!(
                batch = batch_index + 1,
                batch_count,
                jobs = batch.len(),
                "Starting extraction batch"
            );
            join_all(batch.iter_mut().map(|job| self.run_job(job))).await;
        }

        let report = collect_report(jobs);
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Extraction finished"
        );
        Ok(report)
    }

    async fn run_job(&self, job: &mut ExtractionJob) {
        job.state = JobState::Running;

        let request = TranscodeRequest {
            source: job.source_path.clone(),
            start: job.window.start,
            duration: job.window.duration_secs,
            output: job.output_path.clone(),
            vertical_crop: self.vertical_crop,
        };

        job.state = match self.transcoder.transcode(&request).await {
            Ok(output) => {
                metrics::record_job_succeeded();
                JobState::Succeeded {
                    size_bytes: output.size_bytes,
                    duration_secs: job.window.duration_secs,
                }
            }
            Err(e) => {
                let error = classify_error(&e);
                warn!(index = job.index, error = %e, "Clip extraction failed");
                metrics::record_job_failed(error.as_str());
                JobState::Failed { error }
            }
        };
    }
}

fn collect_report(jobs: Vec<ExtractionJob>) -> ExtractionReport {
    let mut report = ExtractionReport::default();
    for job in jobs {
        match job.state {
            JobState::Succeeded {
                size_bytes,
                duration_secs,
            } => report.succeeded.push(ExtractionResult {
                index: job.index,
                path: job.output_path,
                start: job.window.start,
                end: job.window.end,
                duration_secs,
                size_bytes,
                score: job.window.score,
                reason: job.window.reason,
                window_type: job.window.window_type,
            }),
            JobState::Failed { error } => report.failed.push(ExtractionFailure {
                index: job.index,
                error,
            }),
            // Not reachable once every batch has settled
            JobState::Queued | JobState::Running => report.failed.push(ExtractionFailure {
                index: job.index,
                error: ExtractionErrorKind::LaunchFailed {
                    message: "job never ran".to_string(),
                },
            }),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use viralcut_media::{MediaResult, TranscodeOutput};
    use viralcut_models::WindowType;

    /// Records concurrency and finishes later windows first.
    #[derive(Default)]
    struct RecordingTranscoder {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        started: Mutex<Vec<PathBuf>>,
        fail_outputs: Vec<usize>,
        missing_outputs: Vec<usize>,
    }

    fn clip_number(path: &Path) -> usize {
        let name = path.file_stem().unwrap().to_string_lossy().to_string();
        name.rsplit('_').next().unwrap().parse().unwrap()
    }

    #[async_trait]
    impl Transcoder for RecordingTranscoder {
        async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<TranscodeOutput> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.started.lock().unwrap().push(request.output.clone());

            let n = clip_number(&request.output);
            // Reverse completion order within a batch
            tokio::time::sleep(Duration::from_millis(40 - (n as u64 % 3) * 15)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_outputs.contains(&n) {
                return Err(MediaError::ffmpeg_failed("Invalid data", None, Some(1)));
            }
            if self.missing_outputs.contains(&n) {
                return Err(MediaError::OutputNotCreated(request.output.clone()));
            }
            Ok(TranscodeOutput { size_bytes: 1000 + n as u64 })
        }
    }

    fn windows(n: usize) -> Vec<CandidateWindow> {
        (0..n)
            .map(|i| {
                let start = i as f64 * 60.0;
                CandidateWindow::new(start, start + 30.0, 80.0, "High energy segment", WindowType::EnergyPeak)
            })
            .collect()
    }

    #[test]
    fn test_plan_batches_and_names() {
        let orchestrator = ExtractionOrchestrator::new(Arc::new(RecordingTranscoder::default()));
        let jobs = orchestrator.plan(Path::new("/v/talk.mkv"), &windows(7), Path::new("/out"));
        let batches: Vec<usize> = jobs.iter().map(|j| j.batch_index).collect();
        assert_eq!(batches, vec![0, 0, 0, 1, 1, 1, 2]);
        assert_eq!(jobs[0].output_path, PathBuf::from("/out/talk_clip_1.mp4"));
        assert_eq!(jobs[6].output_path, PathBuf::from("/out/talk_clip_7.mp4"));
        assert!(jobs.iter().all(|j| j.state == JobState::Queued));
    }

    #[tokio::test]
    async fn test_seven_windows_run_in_three_batches() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(RecordingTranscoder::default());
        let orchestrator = ExtractionOrchestrator::new(transcoder.clone()).with_batch_size(3);

        let report = orchestrator
            .extract(Path::new("talk.mp4"), &windows(7), dir.path())
            .await
            .unwrap();

        assert_eq!(report.total(), 7);
        let indices: Vec<usize> = report.succeeded.iter().map(|r| r.index).collect();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
        assert_eq!(transcoder.max_in_flight.load(Ordering::SeqCst), 3);

        // A batch starts only after the previous one has finished
        let started: Vec<usize> = transcoder
            .started
            .lock()
            .unwrap()
            .iter()
            .map(|p| clip_number(p))
            .collect();
        let mut first_batch = started[..3].to_vec();
        first_batch.sort();
        assert_eq!(first_batch, vec![1, 2, 3]);
        assert_eq!(started[6], 7);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(RecordingTranscoder {
            fail_outputs: vec![2],
            missing_outputs: vec![5],
            ..Default::default()
        });
        let orchestrator = ExtractionOrchestrator::new(transcoder);

        let report = orchestrator
            .extract(Path::new("talk.mp4"), &windows(6), dir.path())
            .await
            .unwrap();

        assert_eq!(report.total(), 6);
        let ok: Vec<usize> = report.succeeded.iter().map(|r| r.index).collect();
        assert_eq!(ok, vec![0, 2, 3, 5]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].index, 1);
        assert!(matches!(
            report.failed[0].error,
            ExtractionErrorKind::EngineError { exit_code: Some(1), .. }
        ));
        assert_eq!(report.failed[1].index, 4);
        assert_eq!(report.failed[1].error, ExtractionErrorKind::OutputNotCreated);

        let first = &report.succeeded[0];
        assert_eq!(first.size_bytes, 1001);
        assert_eq!(first.window_type, WindowType::EnergyPeak);
        assert_eq!(first.duration_secs, 30.0);
    }

    #[tokio::test]
    async fn test_no_windows_is_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let orchestrator = ExtractionOrchestrator::new(Arc::new(RecordingTranscoder::default()));
        let report = orchestrator.extract(Path::new("a.mp4"), &[], &out).await.unwrap();
        assert_eq!(report.total(), 0);
        assert!(out.is_dir());
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_error(&MediaError::Timeout(600)),
            ExtractionErrorKind::TimedOut { secs: 600 }
        );
        assert!(matches!(
            classify_error(&MediaError::FfmpegNotFound),
            ExtractionErrorKind::LaunchFailed { .. }
        ));
    }
}
