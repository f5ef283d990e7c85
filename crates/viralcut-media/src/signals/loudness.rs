//! `volumedetect` report parsing.

use regex::Regex;
use std::sync::OnceLock;

use viralcut_models::LoudnessSample;

fn mean_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"mean_volume: (-?[\d.]+) dB").expect("valid regex"))
}

fn max_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"max_volume: (-?[\d.]+) dB").expect("valid regex"))
}

/// Extract the whole-file mean and max volume. Both must be present.
pub fn parse_loudness(output: &str) -> Option<LoudnessSample> {
    let mean_db = mean_re().captures(output)?[1].parse().ok()?;
    let max_db = max_re().captures(output)?[1].parse().ok()?;
    Some(LoudnessSample { mean_db, max_db })
}
