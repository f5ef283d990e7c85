//! Per-frame RMS report parsing.

use regex::Regex;
use std::sync::OnceLock;

use viralcut_models::EnergyPeak;

fn rms_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"lavfi\.astats\.Overall\.RMS_level=(-?inf|-?[\d.]+(?:[eE][+-]?\d+)?)")
            .expect("valid regex")
    })
}

/// Convert a dBFS level to linear amplitude; `-inf` is silence.
fn db_to_linear(value: &str) -> Option<f64> {
    if value.ends_with("inf") {
        return Some(0.0);
    }
    let db: f64 = value.parse().ok()?;
    if db <= -100.0 {
        Some(0.0)
    } else {
        Some(10f64.powf(db / 20.0))
    }
}

/// Keep measurements whose linear RMS exceeds `threshold`, in report order,
/// truncated to `max_results`.
///
/// `ordinal_index` is the sequence number of the measurement among all
/// reported measurements, including the ones below threshold.
pub fn parse_energy_peaks(output: &str, threshold: f64, max_results: usize) -> Vec<EnergyPeak> {
    rms_re()
        .captures_iter(output)
        .filter_map(|c| db_to_linear(&c[1]))
        .enumerate()
        .filter(|(_, rms)| *rms > threshold)
        .map(|(index, rms)| EnergyPeak {
            ordinal_index: index as u64,
            rms,
        })
        .take(max_results)
        .collect()
}
