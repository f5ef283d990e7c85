//! FFprobe video information.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

use viralcut_models::VideoMetadata;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Probe a video file with the given ffprobe executable.
///
/// With `timeout_secs` set, a probe still running after that long is killed.
pub async fn probe_video(
    ffprobe: &Path,
    path: impl AsRef<Path>,
    timeout_secs: Option<u64>,
) -> MediaResult<VideoMetadata> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let mut cmd = Command::new(ffprobe);
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ])
    .arg(path)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let output = match timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), cmd.output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("FFprobe timed out after {} seconds, killing process", secs);
                return Err(MediaError::Timeout(secs));
            }
        },
        None => cmd.output().await?,
    };

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe exited with {:?}", output.status.code()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Turn ffprobe's JSON into [`VideoMetadata`].
pub fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoMetadata> {
    let probe: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|e| MediaError::ProbeParse(e.to_string()))?;

    let format = probe
        .format
        .ok_or_else(|| MediaError::ProbeParse("missing format section".to_string()))?;

    let duration_secs = format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| MediaError::ProbeParse("missing or invalid duration".to_string()))?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoMetadata {
        duration_secs,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        has_audio,
        format_name: format.format_name.unwrap_or_default(),
    })
}
