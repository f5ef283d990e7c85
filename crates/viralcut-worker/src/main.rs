//! `viralcut` command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use viralcut_worker::logging::init_tracing;
use viralcut_worker::{Coordinator, ExecutionMode, PipelineConfig, StageRunner, StageServices};

#[derive(Parser, Debug)]
#[command(name = "viralcut", version)]
#[command(about = "Cut ranked short clips out of long videos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch (when remote), analyze and cut clips
    Process(ProcessArgs),
    /// Print scored windows for a local file without cutting
    Analyze {
        file: PathBuf,

        #[arg(short = 'n', long = "clips")]
        clips: Option<usize>,
    },
    /// Check that ffmpeg, ffprobe and yt-dlp are reachable
    Check,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Local file, video URL or bare video id
    source: String,

    #[arg(short = 'n', long = "clips")]
    clips: Option<usize>,

    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    #[arg(long = "work-dir")]
    work_dir: Option<PathBuf>,

    /// Crop clips to 9:16
    #[arg(long = "vertical", default_value_t = false)]
    vertical: bool,

    #[arg(long = "mode", value_enum)]
    mode: Option<ExecutionMode>,

    #[arg(long = "max-agents")]
    max_agents: Option<usize>,

    #[arg(long = "batch-size")]
    batch_size: Option<usize>,

    /// Agent executable for pooled mode
    #[arg(long = "agent-bin")]
    agent_bin: Option<PathBuf>,
}

impl ProcessArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if self.vertical {
            config.vertical_crop = true;
        }
        if let Some(mode) = self.mode {
            config.execution_mode = mode;
        }
        if let Some(n) = self.max_agents {
            config.max_agents = n.max(1);
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n.max(1);
        }
        if let Some(bin) = &self.agent_bin {
            config.agent_binary = Some(bin.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env();

    match cli.command {
        Command::Process(args) => {
            args.apply(&mut config);
            info!(mode = ?config.execution_mode, "Starting viralcut");
            let services = StageServices::discover(&config).context("locating media engines")?;
            let coordinator = Coordinator::new(config, services);

            let report = tokio::select! {
                result = coordinator.process(&args.source, args.clips) => result,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Received shutdown signal");
                    coordinator.shutdown().await;
                    anyhow::bail!("interrupted");
                }
            };
            coordinator.shutdown().await;

            match report {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    if report.extraction.succeeded.is_empty() {
                        anyhow::bail!("no clips were produced");
                    }
                }
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Command::Analyze { file, clips } => {
            let services = StageServices::discover(&config).context("locating media engines")?;
            let max_clips = config.clip_count(clips);
            let clip_duration = config.max_clip_secs;
            let runner = StageRunner::new(config, services);
            let report = runner.analyze(&file, clip_duration, max_clips).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Check => {
            let ffmpeg = viralcut_media::check_ffmpeg()?;
            let ffprobe = viralcut_media::check_ffprobe()?;
            let ytdlp = viralcut_media::check_ytdlp()?;
            tokio::fs::create_dir_all(&config.work_dir).await?;
            tokio::fs::create_dir_all(&config.output_dir).await?;
            println!("ffmpeg:  {}", ffmpeg.display());
            println!("ffprobe: {}", ffprobe.display());
            println!("yt-dlp:  {}", ytdlp.display());
            println!("viralcut check: ok");
        }
    }

    Ok(())
}
