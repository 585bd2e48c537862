//! Local media streams and audio level analysis
//!
//! Tracks carry pre-encoded samples; the level meter works on raw PCM
//! frames published through each audio track's tap.

pub mod level_meter;
pub mod stream;

pub use level_meter::{AudioLevelMeter, MeterHandle, SpectrumAnalyzer};
pub use stream::{LocalStream, LocalTrack, RemoteMedia, TrackKind};
