//! Parsers for detector reports written by FFmpeg filters.
//!
//! Every parser is total: text without matches yields an empty result,
//! never an error.

mod energy;
mod loudness;
mod scene;
mod silence;

pub use energy::parse_energy_peaks;
pub use loudness::parse_loudness;
pub use scene::parse_scene_changes;
pub use silence::parse_silence;
