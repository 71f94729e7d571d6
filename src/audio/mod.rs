//! Audio processing module
//!
//! Provides the audio data model, canonical WAV encoding, the host audio
//! engine seam, and silence detection for boundary placement.

pub mod engine;
pub mod types;
pub mod vad;
pub mod wav;

pub use engine::{AudioEngine, TargetFormat, WavOnlyEngine};
pub use types::*;
pub use vad::{RmsSilenceOracle, SilenceOracle, VadFallbackMode, VadPreprocessor};
