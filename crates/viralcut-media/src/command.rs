//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Output target meaning "decode everything, write nothing".
const NULL_OUTPUT: &str = "-";

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path, or `-` for the null muxer
    output: String,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_string_lossy().to_string(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Create an analysis pass: full decode into the null muxer, filter
    /// reports left on stderr at `info` level.
    pub fn analysis(input: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: NULL_OUTPUT.to_string(),
            input_args: Vec::new(),
            output_args: vec!["-f".to_string(), "null".to_string()],
            overwrite: false,
            log_level: "info".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.2}", seconds))
    }

    /// Set duration (before input).
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.2}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Drop the audio stream.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string(), "-nostats".to_string()];

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        // Filters must precede the null muxer's `-f null`
        let (format_args, rest): (Vec<_>, Vec<_>) = if self.output == NULL_OUTPUT {
            let split = self
                .output_args
                .iter()
                .position(|a| a == "-f")
                .unwrap_or(self.output_args.len());
            (
                self.output_args[split..].to_vec(),
                self.output_args[..split].to_vec(),
            )
        } else {
            (Vec::new(), self.output_args.clone())
        };
        args.extend(rest);
        args.extend(format_args);

        args.push(self.output.clone());

        args
    }
}

/// Runner for FFmpeg commands with an optional timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// FFmpeg executable
    program: PathBuf,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a runner for the given FFmpeg executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout_secs: None,
        }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    /// Run a command that must succeed.
    ///
    /// Stderr is not interpreted; its last line is attached to the error
    /// for diagnostics only.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let (status, stderr) = self.execute(cmd).await?;

        if status.success() {
            Ok(())
        } else {
            let last_line = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("FFmpeg exited with non-zero status")
                .to_string();
            Err(MediaError::ffmpeg_failed(last_line, Some(stderr), status.code()))
        }
    }

    /// Run an analysis command and return its complete stderr.
    ///
    /// A non-zero exit is tolerated: detectors parse whatever the engine
    /// reported before it stopped. Only launch failures and timeouts error.
    pub async fn capture(&self, cmd: &FfmpegCommand) -> MediaResult<String> {
        let (status, stderr) = self.execute(cmd).await?;
        if !status.success() {
            debug!(
                exit_code = ?status.code(),
                "FFmpeg analysis exited non-zero, parsing partial output"
            );
        }
        Ok(stderr)
    }

    async fn execute(&self, cmd: &FfmpegCommand) -> MediaResult<(ExitStatus, String)> {
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;

        // Drain stderr concurrently so a chatty filter never blocks on a full pipe
        let reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let status = self.wait_for_completion(&mut child).await;
        let stderr = reader.await.unwrap_or_default();

        Ok((status?, stderr))
    }

    /// Wait for child process with timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        match self.timeout_secs {
            Some(timeout_secs) => {
                match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
                    Ok(result) => Ok(result?),
                    Err(_) => {
                        warn!("FFmpeg timed out after {} seconds, killing process", timeout_secs);
                        let _ = child.kill().await;
                        Err(MediaError::Timeout(timeout_secs))
                    }
                }
            }
            None => Ok(child.wait().await?),
        }
    }
}

/// Locate a tool: an explicit env override wins, then `PATH`.
fn resolve_tool(env_var: &str, name: &str, not_found: MediaError) -> MediaResult<PathBuf> {
    if let Ok(path) = std::env::var(env_var) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    which::which(name).map_err(|_| not_found)
}

/// Check if FFmpeg is available (honours `FFMPEG_PATH`).
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    resolve_tool("FFMPEG_PATH", "ffmpeg", MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available (honours `FFPROBE_PATH`).
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    resolve_tool("FFPROBE_PATH", "ffprobe", MediaError::FfprobeNotFound)
}

/// Check if yt-dlp is available (honours `YTDLP_PATH`).
pub fn check_ytdlp() -> MediaResult<PathBuf> {
    resolve_tool("YTDLP_PATH", "yt-dlp", MediaError::YtDlpNotFound)
}
