//! Bounded pool of agent processes.
//!
//! The pool launches one OS process per task, feeds it a single
//! [`AgentRequest`] line on stdin and supervises it until exit. Spawning at
//! capacity is rejected outright; there is no queue.
//!
//! The registry is owned by the pool instance. Only `spawn`, the per-task
//! supervisor (on exit) and `shutdown` mutate it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use viralcut_models::{AgentMessage, AgentOutput, AgentRequest, StageType, TaskId};

use crate::error::{PoolError, PoolResult};
use crate::metrics;

pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// How long to wait for output pipes to close after the process is gone.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Builds the command for a stage's agent process.
///
/// The pool sets stdio and kill-on-drop itself.
pub trait AgentLauncher: Send + Sync {
    fn command(&self, stage: StageType) -> Command;
}

impl<F> AgentLauncher for F
where
    F: Fn(StageType) -> Command + Send + Sync,
{
    fn command(&self, stage: StageType) -> Command {
        self(stage)
    }
}

/// Launches the agent executable with the stage name as its only argument.
#[derive(Debug, Clone)]
pub struct BinaryLauncher {
    program: PathBuf,
    /// Extra variables set on every agent process
    envs: Vec<(String, String)>,
}

impl BinaryLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            envs: Vec::new(),
        }
    }

    /// Set these variables on every launched agent, overriding inherited ones.
    pub fn with_envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.envs
            .extend(envs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// `viralcut-agent` next to the running executable, else from `PATH`.
    pub fn sibling_of_current_exe() -> Self {
        let name = format!("viralcut-agent{}", std::env::consts::EXE_SUFFIX);
        let program = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
            .filter(|path| path.exists())
            .unwrap_or_else(|| PathBuf::from(name));
        Self::new(program)
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl AgentLauncher for BinaryLauncher {
    fn command(&self, stage: StageType) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(stage.as_str());
        cmd.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Spawned,
    Running,
    Exited { code: Option<i32> },
    Killed,
}

/// Snapshot of an active task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub stage: StageType,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub uptime: Duration,
    pub output_line_count: usize,
}

/// Everything known about a task once its process is gone.
#[derive(Debug)]
pub struct TaskCompletion {
    pub id: TaskId,
    pub stage: StageType,
    pub status: TaskStatus,
    pub output_lines: Vec<String>,
    pub result: PoolResult<AgentOutput>,
}

impl TaskCompletion {
    pub fn into_output(self) -> PoolResult<AgentOutput> {
        self.result
    }
}

/// Returned by [`AgentPool::spawn`]; resolves when the task leaves the pool.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    stage: StageType,
    done: oneshot::Receiver<TaskCompletion>,
}

impl TaskHandle {
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn stage(&self) -> StageType {
        self.stage
    }

    pub async fn wait(self) -> TaskCompletion {
        match self.done.await {
            Ok(completion) => completion,
            // Supervisor task ended without reporting
            Err(_) => TaskCompletion {
                id: self.id.clone(),
                stage: self.stage,
                status: TaskStatus::Killed,
                output_lines: Vec::new(),
                result: Err(PoolError::Killed { task_id: self.id }),
            },
        }
    }
}

struct ActiveTask {
    stage: StageType,
    status: TaskStatus,
    started_at: DateTime<Utc>,
    started: Instant,
    output: Arc<Mutex<Vec<String>>>,
    supervisor: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<TaskId, ActiveTask>,
    closed: bool,
}

/// Process-level concurrency cap over pipeline stages.
pub struct AgentPool {
    max_concurrent: usize,
    launcher: Arc<dyn AgentLauncher>,
    task_timeout: Option<Duration>,
    registry: Arc<Mutex<Registry>>,
    shutdown_tx: watch::Sender<bool>,
}

impl AgentPool {
    pub fn new(launcher: Arc<dyn AgentLauncher>, max_concurrent: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            max_concurrent: max_concurrent.max(1),
            launcher,
            task_timeout: None,
            registry: Arc::new(Mutex::new(Registry::default())),
            shutdown_tx,
        }
    }

    /// Kill any agent still running after `timeout`.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub async fn active_count(&self) -> usize {
        self.registry.lock().await.tasks.len()
    }

    /// Launch an agent for `stage` and hand it `request`.
    ///
    /// Fails with [`PoolError::SpawnRejected`] at capacity, leaving the
    /// registry untouched.
    pub async fn spawn(
        &self,
        stage: StageType,
        task_id: TaskId,
        request: &AgentRequest,
    ) -> PoolResult<TaskHandle> {
        if request.stage() != stage {
            return Err(PoolError::StageMismatch {
                stage,
                request: request.stage(),
            });
        }
        let request_line = serde_json::to_string(request)
            .map_err(|e| PoolError::Protocol(e.to_string()))?;

        let mut registry = self.registry.lock().await;
        if registry.closed {
            return Err(PoolError::ShutDown);
        }
        if registry.tasks.contains_key(&task_id) {
            return Err(PoolError::DuplicateTask(task_id));
        }
        if registry.tasks.len() >= self.max_concurrent {
            metrics::record_spawn_rejected(stage.as_str());
            debug!(task_id = %task_id, stage = %stage, "Spawn rejected, pool at capacity");
            return Err(PoolError::SpawnRejected {
                active: registry.tasks.len(),
                max: self.max_concurrent,
            });
        }

        let mut cmd = self.launcher.command(stage);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.spawn().map_err(|e| PoolError::Launch(e.to_string()))?;

        let output = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = oneshot::channel();

        let supervisor = Supervisor {
            id: task_id.clone(),
            stage,
            output: Arc::clone(&output),
            registry: Arc::clone(&self.registry),
            timeout: self.task_timeout,
            shutdown_rx: self.shutdown_tx.subscribe(),
        };
        // Registry lock is held, so the supervisor cannot deregister first
        let handle = tokio::spawn(supervisor.run(child, request_line, done_tx));

        registry.tasks.insert(
            task_id.clone(),
            ActiveTask {
                stage,
                status: TaskStatus::Spawned,
                started_at: Utc::now(),
                started: Instant::now(),
                output,
                supervisor: Some(handle),
            },
        );
        metrics::record_agent_spawned(stage.as_str());
        info!(
            task_id = %task_id,
            stage = %stage,
            active = registry.tasks.len(),
            "Agent spawned"
        );

        Ok(TaskHandle {
            id: task_id,
            stage,
            done: done_rx,
        })
    }

    /// Active tasks ordered by id.
    pub async fn list_active(&self) -> Vec<TaskInfo> {
        let registry = self.registry.lock().await;
        let mut infos = Vec::with_capacity(registry.tasks.len());
        for (id, task) in registry.tasks.iter() {
            infos.push(TaskInfo {
                id: id.clone(),
                stage: task.stage,
                status: task.status,
                started_at: task.started_at,
                uptime: task.started.elapsed(),
                output_line_count: task.output.lock().await.len(),
            });
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Kill every agent, clear the registry and refuse further spawns.
    pub async fn shutdown(&self) {
        let supervisors: Vec<JoinHandle<()>> = {
            let mut registry = self.registry.lock().await;
            registry.closed = true;
            registry
                .tasks
                .drain()
                .filter_map(|(_, mut task)| task.supervisor.take())
                .collect()
        };

        if !supervisors.is_empty() {
            warn!(count = supervisors.len(), "Killing active agents");
        }
        self.shutdown_tx.send_replace(true);

        for handle in supervisors {
            let _ = handle.await;
        }
        info!("Agent pool shut down");
    }
}

struct Supervisor {
    id: TaskId,
    stage: StageType,
    output: Arc<Mutex<Vec<String>>>,
    registry: Arc<Mutex<Registry>>,
    timeout: Option<Duration>,
    shutdown_rx: watch::Receiver<bool>,
}

enum Ending {
    Exited(Option<i32>),
    TimedOut(u64),
    Shutdown,
    WaitFailed(String),
}

impl Supervisor {
    async fn run(
        self,
        mut child: Child,
        request_line: String,
        done: oneshot::Sender<TaskCompletion>,
    ) {
        if let Some(mut stdin) = child.stdin.take() {
            let written = async {
                stdin.write_all(request_line.as_bytes()).await?;
                stdin.write_all(b"\n").await?;
                stdin.shutdown().await
            }
            .await;
            if let Err(e) = written {
                debug!(task_id = %self.id, error = %e, "Agent did not take its request");
            }
        }
        self.set_status(TaskStatus::Running).await;

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(read_lines(out, Arc::clone(&self.output), true)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(read_lines(err, Arc::clone(&self.output), false)));

        let ending = self.wait(&mut child).await;

        let final_message = match stdout {
            Some(reader) => drain(reader).await,
            None => None,
        };
        if let Some(reader) = stderr {
            drain(reader).await;
        }

        let (status, result) = self.conclude(ending, final_message);

        // Deregister before reporting, so a waiter sees a free slot
        let removed = self.registry.lock().await.tasks.remove(&self.id).is_some();
        info!(
            task_id = %self.id,
            stage = %self.stage,
            status = ?status,
            success = result.is_ok(),
            deregistered = removed,
            "Agent finished"
        );

        let output_lines = std::mem::take(&mut *self.output.lock().await);
        let _ = done.send(TaskCompletion {
            id: self.id,
            stage: self.stage,
            status,
            output_lines,
            result,
        });
    }

    async fn wait(&self, child: &mut Child) -> Ending {
        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending().await,
            }
        };
        let mut shutdown_rx = self.shutdown_rx.clone();
        let shutdown = async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        let ending = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => return Ending::Exited(status.code()),
                Err(e) => Ending::WaitFailed(e.to_string()),
            },
            _ = deadline => Ending::TimedOut(timeout.map(|t| t.as_secs()).unwrap_or_default()),
            _ = shutdown => Ending::Shutdown,
        };

        if let Err(e) = child.kill().await {
            warn!(task_id = %self.id, error = %e, "Failed to kill agent");
        }
        ending
    }

    fn conclude(
        &self,
        ending: Ending,
        final_message: Option<AgentMessage>,
    ) -> (TaskStatus, PoolResult<AgentOutput>) {
        let task_id = self.id.clone();
        match ending {
            Ending::Exited(code) => {
                let status = TaskStatus::Exited { code };
                let result = match final_message {
                    Some(AgentMessage::Completed { output }) if code == Some(0) => {
                        if output.stage() == self.stage {
                            Ok(output)
                        } else {
                            Err(PoolError::Protocol(format!(
                                "agent for {} returned {} output",
                                self.stage,
                                output.stage()
                            )))
                        }
                    }
                    Some(AgentMessage::Failed { error }) => Err(PoolError::StageFailed {
                        task_id,
                        message: error,
                    }),
                    _ => Err(PoolError::Exited { task_id, code }),
                };
                (status, result)
            }
            Ending::TimedOut(secs) => (TaskStatus::Killed, Err(PoolError::TimedOut { task_id, secs })),
            Ending::Shutdown => (TaskStatus::Killed, Err(PoolError::Killed { task_id })),
            Ending::WaitFailed(message) => (TaskStatus::Killed, Err(PoolError::Launch(message))),
        }
    }

    async fn set_status(&self, status: TaskStatus) {
        if let Some(task) = self.registry.lock().await.tasks.get_mut(&self.id) {
            task.status = status;
        }
    }
}

/// Append every line to the task buffer. For stdout, also return the
/// last final protocol message seen.
async fn read_lines<R>(
    reader: R,
    output: Arc<Mutex<Vec<String>>>,
    parse_messages: bool,
) -> Option<AgentMessage>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut final_message = None;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        // Invalid UTF-8 is replaced rather than ending the stream
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        if parse_messages {
            if let Some(message) = AgentMessage::parse_line(&line) {
                if message.is_final() {
                    final_message = Some(message);
                }
            }
        }
        output.lock().await.push(line);
    }
    final_message
}

/// Wait briefly for a reader; a pipe held open by a grandchild is abandoned.
async fn drain(reader: JoinHandle<Option<AgentMessage>>) -> Option<AgentMessage> {
    let abort = reader.abort_handle();
    match tokio::time::timeout(PIPE_DRAIN_GRACE, reader).await {
        Ok(joined) => joined.ok().flatten(),
        Err(_) => {
            abort.abort();
            None
        }
    }
}
