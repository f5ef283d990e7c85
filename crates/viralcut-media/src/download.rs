//! Source resolution using yt-dlp.
//!
//! A remote URL becomes a local file plus whatever metadata yt-dlp reports.
//! Requests are spaced with a randomised delay and rotate user agents; a
//! failing download is retried with exponential backoff.

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use viralcut_models::SourceInfo;

use crate::command::check_ytdlp;
use crate::error::{MediaError, MediaResult};

/// User agents rotated across requests.
pub const DEFAULT_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

fn url_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([^&\n?#]+)")
            .expect("valid regex")
    })
}

fn bare_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-zA-Z0-9_-]{11})$").expect("valid regex"))
}

/// Extract a YouTube video id from a URL or a bare 11-character id.
pub fn extract_video_id(source: &str) -> Option<String> {
    let source = source.trim();
    url_id_re()
        .captures(source)
        .or_else(|| bare_id_re().captures(source))
        .map(|c| c[1].to_string())
}

/// Check if a URL is a supported video platform.
pub fn is_supported_url(url: &str) -> bool {
    let supported_domains = [
        "youtube.com",
        "youtu.be",
        "vimeo.com",
        "twitter.com",
        "x.com",
        "twitch.tv",
        "tiktok.com",
    ];

    supported_domains.iter().any(|domain| url.contains(domain))
}

/// Turns a remote source reference into a local file.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, source: &str, output_dir: &Path) -> MediaResult<SourceInfo>;
}

/// Subset of `yt-dlp --dump-json`.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    view_count: Option<u64>,
}

/// [`SourceResolver`] backed by the yt-dlp executable.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: PathBuf,
    user_agents: Vec<String>,
    min_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: u32,
    retry_delay_ms: u64,
    cookies_file: Option<PathBuf>,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            min_delay_ms: 1000,
            max_delay_ms: 3000,
            max_retries: 3,
            retry_delay_ms: 2000,
            cookies_file: None,
        }
    }

    /// Locate yt-dlp via `YTDLP_PATH` or `PATH`.
    pub fn discover() -> MediaResult<Self> {
        Ok(Self::new(check_ytdlp()?))
    }

    /// Randomised delay range applied before each yt-dlp request.
    pub fn with_delay_range(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.min_delay_ms = min_ms.min(max_ms);
        self.max_delay_ms = max_ms.max(min_ms);
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    /// Netscape-format cookies passed to yt-dlp when the file exists.
    pub fn with_cookies_file(mut self, path: Option<PathBuf>) -> Self {
        self.cookies_file = path;
        self
    }

    fn pick_user_agent(&self) -> String {
        self.user_agents
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENTS[0].to_string())
    }

    fn pick_delay(&self) -> Duration {
        if self.max_delay_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::rng().random_range(self.min_delay_ms..=self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        self.retry_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }

    fn common_args(&self, user_agent: &str) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--user-agent".to_string(),
            user_agent.to_string(),
            "--geo-bypass".to_string(),
            "--no-warnings".to_string(),
        ];
        if let Some(cookies) = self.cookies_file.as_ref().filter(|p| p.exists()) {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }
        args
    }

    async fn run(&self, args: &[String]) -> MediaResult<Vec<u8>> {
        tokio::time::sleep(self.pick_delay()).await;
        debug!("Running yt-dlp: {}", args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr);

            let is_rate_limited = stderr.contains("429")
                || stderr.contains("Too Many Requests")
                || stderr.contains("Sign in to confirm");
            if is_rate_limited {
                warn!("Rate limit detected from source platform");
            }

            let last = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("Unknown error");
            return Err(MediaError::download_failed(format!("yt-dlp failed: {}", last)));
        }

        Ok(output.stdout)
    }

    async fn fetch_info(&self, source: &str) -> MediaResult<YtDlpInfo> {
        let mut args = vec!["--dump-json".to_string()];
        args.extend(self.common_args(&self.pick_user_agent()));
        args.push(source.to_string());

        let stdout = self.run(&args).await?;
        let line = stdout
            .split(|b| *b == b'\n')
            .find(|l| !l.is_empty())
            .ok_or_else(|| MediaError::download_failed("yt-dlp returned no metadata"))?;
        Ok(serde_json::from_slice(line)?)
    }

    async fn download(&self, source: &str, id: &str, output_dir: &Path) -> MediaResult<PathBuf> {
        let template = output_dir.join(format!("{}.%(ext)s", id));
        let mut args = vec![
            source.to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
            "-f".to_string(),
            "best".to_string(),
        ];
        args.extend(self.common_args(&self.pick_user_agent()));

        self.run(&args).await?;

        find_downloaded_file(output_dir, id)
            .await?
            .ok_or_else(|| MediaError::download_failed("Output file not created"))
    }

    async fn attempt(&self, source: &str, output_dir: &Path) -> MediaResult<SourceInfo> {
        let info = self.fetch_info(source).await?;
        let id = info
            .id
            .clone()
            .or_else(|| extract_video_id(source))
            .ok_or_else(|| MediaError::InvalidUrl(source.to_string()))?;

        let local_path = self.download(source, &id, output_dir).await?;

        Ok(SourceInfo {
            title: info.title.unwrap_or_else(|| id.clone()),
            local_path,
            video_id: Some(id),
            duration_secs: info.duration,
            uploader: info.uploader,
            view_count: info.view_count,
        })
    }
}

#[async_trait]
impl SourceResolver for YtDlpResolver {
    async fn resolve(&self, source: &str, output_dir: &Path) -> MediaResult<SourceInfo> {
        if !is_supported_url(source) && extract_video_id(source).is_none() {
            return Err(MediaError::InvalidUrl(source.to_string()));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(source, output_dir).await {
                Ok(info) => {
                    info!(
                        source = %source,
                        path = %info.local_path.display(),
                        attempt,
                        "Source downloaded"
                    );
                    return Ok(info);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff_delay_ms(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay,
                        error = %e,
                        "Download failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    if e.is_permanent_failure() {
                        warn!(error = %e, "Source permanently unavailable, not retrying");
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// First complete file in `dir` whose name starts with `id`.
async fn find_downloaded_file(dir: &Path, id: &str) -> MediaResult<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(id) && !name.ends_with(".part") && !name.ends_with(".ytdl") {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extract_video_id("dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(extract_video_id("not-an-id"), None);
        assert_eq!(extract_video_id("https://vimeo.com/123"), None);
    }

    #[test]
    fn test_supported_urls() {
        assert!(is_supported_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_supported_url("https://vimeo.com/123"));
        assert!(!is_supported_url("https://example.com/video.mp4"));
    }

    #[tokio::test]
    async fn test_rejects_unsupported_source() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = YtDlpResolver::new("yt-dlp").with_delay_range(0, 0);
        let err = resolver
            .resolve("https://example.com/a.mp4", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_find_downloaded_file_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc123.mp4.part"), b"x").unwrap();
        std::fs::write(dir.path().join("other.mp4"), b"x").unwrap();
        assert!(find_downloaded_file(dir.path(), "abc123").await.unwrap().is_none());

        std::fs::write(dir.path().join("abc123.webm"), b"x").unwrap();
        let found = find_downloaded_file(dir.path(), "abc123").await.unwrap().unwrap();
        assert!(found.ends_with("abc123.webm"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_with_stand_in_downloader() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("downloads");
        let script = dir.path().join("yt-dlp");
        // Metadata on --dump-json, otherwise write the templated file
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\n\
                 if [ \"$1\" = \"--dump-json\" ]; then\n\
                 echo '{{\"id\":\"dQw4w9WgXcQ\",\"title\":\"Clip\",\"duration\":212.0,\"view_count\":7}}'\n\
                 else\n\
                 printf 'video' > '{}/dQw4w9WgXcQ.mp4'\n\
                 fi\n",
                out.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let resolver = YtDlpResolver::new(&script).with_delay_range(0, 0);
        let info = resolver
            .resolve("https://youtu.be/dQw4w9WgXcQ", &out)
            .await
            .unwrap();
        assert_eq!(info.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(info.title, "Clip");
        assert_eq!(info.duration_secs, Some(212.0));
        assert_eq!(info.view_count, Some(7));
        assert!(info.local_path.ends_with("dQw4w9WgXcQ.mp4"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_download_retries_then_errors() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("calls");
        let script = dir.path().join("yt-dlp");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho x >> '{}'\necho 'ERROR: HTTP Error 429: Too Many Requests' >&2\nexit 1\n",
                counter.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let resolver = YtDlpResolver::new(&script)
            .with_delay_range(0, 0)
            .with_retries(3, 1);
        let err = resolver
            .resolve("dQw4w9WgXcQ", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { .. }));
        let calls = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(calls.lines().count(), 3);
    }

    #[test]
    fn test_backoff_saturates() {
        let resolver = YtDlpResolver::new("yt-dlp").with_retries(u32::MAX, 2000);
        assert_eq!(resolver.backoff_delay_ms(1), 2000);
        assert_eq!(resolver.backoff_delay_ms(3), 8000);
        assert_eq!(resolver.backoff_delay_ms(200), u64::MAX);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_video_not_retried() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("calls");
        let script = dir.path().join("yt-dlp");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho x >> '{}'\necho 'ERROR: [youtube] dQw4w9WgXcQ: Private video' >&2\nexit 1\n",
                counter.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let resolver = YtDlpResolver::new(&script)
            .with_delay_range(0, 0)
            .with_retries(3, 1);
        let err = resolver
            .resolve("dQw4w9WgXcQ", dir.path())
            .await
            .unwrap_err();
        assert!(err.is_permanent_failure());
        let calls = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(calls.lines().count(), 1);
    }
}
