//! `scdet` report parsing.

use regex::Regex;
use std::sync::OnceLock;

use viralcut_models::SceneChange;

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"lavfi\.scd\.time: ?([\d.]+)").expect("valid regex"))
}

/// Timestamps of reported scene changes, in report order.
pub fn parse_scene_changes(output: &str) -> Vec<SceneChange> {
    time_re()
        .captures_iter(output)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .map(|timestamp_secs| SceneChange { timestamp_secs })
        .collect()
}
