//! `silencedetect` report parsing.

use regex::Regex;
use std::sync::OnceLock;

use viralcut_models::SilenceInterval;

fn start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"silence_start: (-?[\d.]+)").expect("valid regex"))
}

fn end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"silence_end: (-?[\d.]+) \| silence_duration: ([\d.]+)").expect("valid regex")
    })
}

/// Pair the n-th `silence_start` with the n-th `silence_end`.
///
/// Pairing is positional, so an unterminated trailing start is dropped and
/// the result has `min(#starts, #ends)` entries.
pub fn parse_silence(output: &str) -> Vec<SilenceInterval> {
    let starts = start_re()
        .captures_iter(output)
        .filter_map(|c| c[1].parse::<f64>().ok());
    let ends = end_re()
        .captures_iter(output)
        .filter_map(|c| c[1].parse::<f64>().ok());

    starts
        .zip(ends)
        .map(|(start, end)| SilenceInterval::new(start.max(0.0), end))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_by_position() {
        let output = "\
[silencedetect @ 0x5581] silence_start: 12.5
[silencedetect @ 0x5581] silence_end: 15.25 | silence_duration: 2.75
[silencedetect @ 0x5581] silence_start: 100
[silencedetect @ 0x5581] silence_end: 110 | silence_duration: 10
[silencedetect @ 0x5581] silence_start: 290.1
";
        let silence = parse_silence(output);
        assert_eq!(silence.len(), 2);
        assert_eq!(silence[0], SilenceInterval::new(12.5, 15.25));
        assert_eq!(silence[1], SilenceInterval::new(100.0, 110.0));
    }

    #[test]
    fn test_negative_start_clamped() {
        let output = "silence_start: -0.0213\nsilence_end: 3.1 | silence_duration: 3.12\n";
        let silence = parse_silence(output);
        assert_eq!(silence, vec![SilenceInterval::new(0.0, 3.1)]);
    }

    #[test]
    fn test_no_matches_is_empty() {
        assert!(parse_silence("").is_empty());
        assert!(parse_silence("Stream #0:1: Audio: aac").is_empty());
    }
}
