//! FFmpeg filter definitions.
//!
//! Commas inside expressions are escaped (`\,`) so the filtergraph parser
//! does not split on them.

use viralcut_models::encoding::{
    LANDSCAPE_MAX_WIDTH, PORTRAIT_MAX_HEIGHT, VERTICAL_HEIGHT, VERTICAL_WIDTH,
};

/// Whole-file volume statistics (`mean_volume`, `max_volume`).
pub const FILTER_VOLUMEDETECT: &str = "volumedetect";

/// Per-frame RMS level printed to the log, one line per audio frame.
pub const FILTER_ASTATS_RMS: &str =
    "astats=metadata=1:reset=1,ametadata=print:key=lavfi.astats.Overall.RMS_level";

/// Silence detection below `noise_db` lasting at least `min_duration` seconds.
pub fn filter_silencedetect(noise_db: f64, min_duration: f64) -> String {
    format!("silencedetect=noise={}dB:d={}", noise_db, min_duration)
}

/// Scene change detection.
pub fn filter_scdet(threshold: f64) -> String {
    format!("scdet=threshold={}", threshold)
}

/// Bound the long edge: landscape to 1280 wide, portrait to 720 tall.
pub fn filter_bounded_scale() -> String {
    format!(
        "scale=if(gt(iw\\,ih)\\,{w}\\,-2):if(gt(iw\\,ih)\\,-2\\,{h})",
        w = LANDSCAPE_MAX_WIDTH,
        h = PORTRAIT_MAX_HEIGHT
    )
}

/// Centre 9:16 crop scaled to the vertical output resolution.
pub fn filter_vertical_crop() -> String {
    format!(
        "crop=ih*9/16:ih,scale={}:{}",
        VERTICAL_WIDTH, VERTICAL_HEIGHT
    )
}

/// Build the clip filter chain.
pub fn build_clip_filter(vertical_crop: bool, frame_rate: u32) -> String {
    let geometry = if vertical_crop {
        filter_vertical_crop()
    } else {
        filter_bounded_scale()
    };
    format!("{},fps={}", geometry, frame_rate)
}
