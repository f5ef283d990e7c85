//! Pipeline configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExecutionMode {
    /// Every stage runs inside the calling process.
    #[default]
    Inline,
    /// Every stage runs in an agent process launched by the pool.
    Pooled,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inline" => Ok(ExecutionMode::Inline),
            "pooled" | "pool" => Ok(ExecutionMode::Pooled),
            other => Err(format!("unknown execution mode: {}", other)),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum concurrent agent processes
    pub max_agents: usize,
    /// Transcodes run concurrently within one batch
    pub batch_size: usize,
    /// Shortest clip length in seconds
    pub min_clip_secs: f64,
    /// Longest clip length in seconds
    pub max_clip_secs: f64,
    /// Clips produced when the caller does not ask for a count
    pub default_clip_count: usize,
    /// Where finished clips are written
    pub output_dir: PathBuf,
    /// Where downloaded sources are written
    pub work_dir: PathBuf,
    pub silence_noise_db: f64,
    pub silence_min_duration: f64,
    /// Linear RMS above which a measurement counts as a peak
    pub rms_threshold: f64,
    pub max_energy_peaks: usize,
    pub scene_threshold: f64,
    /// Crop clips to 9:16
    pub vertical_crop: bool,
    /// Kill a single transcode after this long
    pub transcode_timeout: Duration,
    /// Kill a single probe or detector pass after this long
    pub analysis_timeout: Duration,
    /// Kill an agent process after this long
    pub agent_timeout: Duration,
    /// Agent executable; defaults to `viralcut-agent` beside the current binary
    pub agent_binary: Option<PathBuf>,
    pub execution_mode: ExecutionMode,
    /// Retries when the pool rejects a spawn
    pub spawn_retries: u32,
    pub spawn_retry_delay: Duration,
    /// Downloader pacing and retries
    pub download_min_delay_ms: u64,
    pub download_max_delay_ms: u64,
    pub download_retries: u32,
    pub download_retry_delay_ms: u64,
    /// Netscape cookies file handed to the downloader
    pub cookies_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_agents: 4,
            batch_size: 3,
            min_clip_secs: 30.0,
            max_clip_secs: 60.0,
            default_clip_count: 5,
            output_dir: PathBuf::from("./output"),
            work_dir: PathBuf::from("./temp"),
            silence_noise_db: -30.0,
            silence_min_duration: 2.0,
            rms_threshold: 0.1,
            max_energy_peaks: 20,
            scene_threshold: 0.5,
            vertical_crop: false,
            transcode_timeout: Duration::from_secs(600),
            analysis_timeout: Duration::from_secs(1800),
            agent_timeout: Duration::from_secs(3600), // 1 hour
            agent_binary: None,
            execution_mode: ExecutionMode::Inline,
            spawn_retries: 5,
            spawn_retry_delay: Duration::from_millis(500),
            download_min_delay_ms: 1000,
            download_max_delay_ms: 3000,
            download_retries: 3,
            download_retry_delay_ms: 2000,
            cookies_file: None,
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn path_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<PathBuf> {
    lookup(key)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Inline => "inline",
            ExecutionMode::Pooled => "pooled",
        }
    }
}

impl PipelineConfig {
    /// Create config from `VIRALCUT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any `VIRALCUT_*` key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let l = &lookup;
        Self {
            max_agents: parse_or(l, "VIRALCUT_MAX_AGENTS", d.max_agents).max(1),
            batch_size: parse_or(l, "VIRALCUT_BATCH_SIZE", d.batch_size).max(1),
            min_clip_secs: parse_or(l, "VIRALCUT_MIN_CLIP_SECS", d.min_clip_secs),
            max_clip_secs: parse_or(l, "VIRALCUT_MAX_CLIP_SECS", d.max_clip_secs),
            default_clip_count: parse_or(l, "VIRALCUT_CLIP_COUNT", d.default_clip_count),
            output_dir: path_var(l, "VIRALCUT_OUTPUT_DIR").unwrap_or(d.output_dir),
            work_dir: path_var(l, "VIRALCUT_WORK_DIR").unwrap_or(d.work_dir),
            silence_noise_db: parse_or(l, "VIRALCUT_SILENCE_NOISE_DB", d.silence_noise_db),
            silence_min_duration: parse_or(l, "VIRALCUT_SILENCE_MIN_SECS", d.silence_min_duration),
            rms_threshold: parse_or(l, "VIRALCUT_RMS_THRESHOLD", d.rms_threshold),
            max_energy_peaks: parse_or(l, "VIRALCUT_MAX_ENERGY_PEAKS", d.max_energy_peaks),
            scene_threshold: parse_or(l, "VIRALCUT_SCENE_THRESHOLD", d.scene_threshold),
            vertical_crop: parse_or(l, "VIRALCUT_VERTICAL_CROP", d.vertical_crop),
            transcode_timeout: Duration::from_secs(parse_or(
                l,
                "VIRALCUT_TRANSCODE_TIMEOUT_SECS",
                d.transcode_timeout.as_secs(),
            )),
            analysis_timeout: Duration::from_secs(parse_or(
                l,
                "VIRALCUT_ANALYSIS_TIMEOUT_SECS",
                d.analysis_timeout.as_secs(),
            )),
            agent_timeout: Duration::from_secs(parse_or(
                l,
                "VIRALCUT_AGENT_TIMEOUT_SECS",
                d.agent_timeout.as_secs(),
            )),
            agent_binary: path_var(l, "VIRALCUT_AGENT_BIN"),
            execution_mode: parse_or(l, "VIRALCUT_EXECUTION_MODE", d.execution_mode),
            spawn_retries: parse_or(l, "VIRALCUT_SPAWN_RETRIES", d.spawn_retries),
            spawn_retry_delay: Duration::from_millis(parse_or(
                l,
                "VIRALCUT_SPAWN_RETRY_DELAY_MS",
                d.spawn_retry_delay.as_millis() as u64,
            )),
            download_min_delay_ms: parse_or(l, "VIRALCUT_MIN_DELAY_MS", d.download_min_delay_ms),
            download_max_delay_ms: parse_or(l, "VIRALCUT_MAX_DELAY_MS", d.download_max_delay_ms),
            download_retries: parse_or(l, "VIRALCUT_MAX_RETRIES", d.download_retries),
            download_retry_delay_ms: parse_or(l, "VIRALCUT_RETRY_DELAY_MS", d.download_retry_delay_ms),
            cookies_file: path_var(l, "VIRALCUT_COOKIES_FILE"),
        }
    }

    /// The stage settings as `VIRALCUT_*` variables, readable by [`Self::from_env`].
    ///
    /// Pool settings (agent count, binary, timeout, mode, spawn retries) are
    /// left out since agents never spawn agents.
    pub fn to_env_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("VIRALCUT_BATCH_SIZE", self.batch_size.to_string()),
            ("VIRALCUT_MIN_CLIP_SECS", self.min_clip_secs.to_string()),
            ("VIRALCUT_MAX_CLIP_SECS", self.max_clip_secs.to_string()),
            ("VIRALCUT_CLIP_COUNT", self.default_clip_count.to_string()),
            ("VIRALCUT_OUTPUT_DIR", self.output_dir.to_string_lossy().into_owned()),
            ("VIRALCUT_WORK_DIR", self.work_dir.to_string_lossy().into_owned()),
            ("VIRALCUT_SILENCE_NOISE_DB", self.silence_noise_db.to_string()),
            ("VIRALCUT_SILENCE_MIN_SECS", self.silence_min_duration.to_string()),
            ("VIRALCUT_RMS_THRESHOLD", self.rms_threshold.to_string()),
            ("VIRALCUT_MAX_ENERGY_PEAKS", self.max_energy_peaks.to_string()),
            ("VIRALCUT_SCENE_THRESHOLD", self.scene_threshold.to_string()),
            ("VIRALCUT_VERTICAL_CROP", self.vertical_crop.to_string()),
            ("VIRALCUT_TRANSCODE_TIMEOUT_SECS", self.transcode_timeout.as_secs().to_string()),
            ("VIRALCUT_ANALYSIS_TIMEOUT_SECS", self.analysis_timeout.as_secs().to_string()),
            ("VIRALCUT_MIN_DELAY_MS", self.download_min_delay_ms.to_string()),
            ("VIRALCUT_MAX_DELAY_MS", self.download_max_delay_ms.to_string()),
            ("VIRALCUT_MAX_RETRIES", self.download_retries.to_string()),
            ("VIRALCUT_RETRY_DELAY_MS", self.download_retry_delay_ms.to_string()),
            ("VIRALCUT_EXECUTION_MODE", ExecutionMode::Inline.as_str().to_string()),
        ];
        if let Some(cookies) = &self.cookies_file {
            vars.push(("VIRALCUT_COOKIES_FILE", cookies.to_string_lossy().into_owned()));
        }
        vars
    }

    /// Requested clip count bounded to what the scorer can return.
    pub fn clip_count(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_clip_count)
            .clamp(1, crate::scoring::MAX_WINDOWS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_agents, 4);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.default_clip_count, 5);
        assert_eq!(config.execution_mode, ExecutionMode::Inline);
    }

    #[test]
    fn test_clip_count_bounded() {
        let config = PipelineConfig::default();
        assert_eq!(config.clip_count(None), 5);
        assert_eq!(config.clip_count(Some(50)), 10);
        assert_eq!(config.clip_count(Some(0)), 1);
    }

    #[test]
    fn test_stage_settings_survive_env_export() {
        let config = PipelineConfig {
            batch_size: 1,
            min_clip_secs: 15.0,
            max_clip_secs: 45.5,
            silence_noise_db: -42.0,
            rms_threshold: 0.25,
            scene_threshold: 0.0,
            vertical_crop: true,
            transcode_timeout: Duration::from_secs(90),
            analysis_timeout: Duration::from_secs(120),
            output_dir: PathBuf::from("/srv/clips"),
            cookies_file: Some(PathBuf::from("/srv/cookies.txt")),
            execution_mode: ExecutionMode::Pooled,
            ..PipelineConfig::default()
        };
        let vars: std::collections::HashMap<_, _> = config.to_env_vars().into_iter().collect();
        let child = PipelineConfig::from_lookup(|key| vars.get(key).cloned());

        assert_eq!(child.batch_size, 1);
        assert_eq!(child.min_clip_secs, 15.0);
        assert_eq!(child.max_clip_secs, 45.5);
        assert_eq!(child.silence_noise_db, -42.0);
        assert_eq!(child.rms_threshold, 0.25);
        assert_eq!(child.scene_threshold, 0.0);
        assert!(child.vertical_crop);
        assert_eq!(child.transcode_timeout, Duration::from_secs(90));
        assert_eq!(child.analysis_timeout, Duration::from_secs(120));
        assert_eq!(child.output_dir, PathBuf::from("/srv/clips"));
        assert_eq!(child.cookies_file, Some(PathBuf::from("/srv/cookies.txt")));
        // An agent always runs its stage inline
        assert_eq!(child.execution_mode, ExecutionMode::Inline);
    }

    #[test]
    fn test_lookup_ignores_unparsable_values() {
        let config = PipelineConfig::from_lookup(|key| match key {
            "VIRALCUT_BATCH_SIZE" => Some("0".to_string()),
            "VIRALCUT_MAX_AGENTS" => Some("many".to_string()),
            _ => None,
        });
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_agents, 4);
        assert_eq!(config.analysis_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_execution_mode_parse() {
        assert_eq!("Pooled".parse::<ExecutionMode>(), Ok(ExecutionMode::Pooled));
        assert!("bogus".parse::<ExecutionMode>().is_err());
    }
}
