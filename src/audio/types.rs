//! Audio-related type definitions
//!
//! Common types used throughout the audio processing pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Target sample rate for all processed audio.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Raw audio file as handed in by the host application.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub data: Vec<u8>,
    pub filename: String,
    pub extension: String,
}

/// File extensions the pipeline accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "mp4", "ogg", "webm", "flac"];

impl AudioInput {
    pub fn new(data: Vec<u8>, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let extension = filename
            .rsplit('.')
            .next()
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            data,
            filename,
            extension,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn size_mb(&self) -> f64 {
        self.data.len() as f64 / (1024.0 * 1024.0)
    }

    /// Shape validation before any remote work happens.
    pub fn validate(&self, max_size_mb: f64) -> Result<(), AudioError> {
        if self.data.is_empty() {
            return Err(AudioError::EmptyInput {
                filename: self.filename.clone(),
            });
        }
        if !SUPPORTED_EXTENSIONS.contains(&self.extension.as_str()) {
            return Err(AudioError::UnsupportedFormat {
                extension: self.extension.clone(),
            });
        }
        if self.size_mb() > max_size_mb {
            return Err(AudioError::FileTooLarge {
                size_mb: self.size_mb(),
                max_mb: max_size_mb,
            });
        }
        Ok(())
    }
}

/// Decoded, resampled, mono audio ready for chunking.
#[derive(Debug, Clone)]
pub struct ProcessedAudio {
    /// PCM samples in [-1, 1].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl ProcessedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Estimated WAV payload size in MB for a slice of this audio
    /// (16-bit mono plus header).
    pub fn estimated_wav_mb(&self, duration_seconds: f64) -> f64 {
        let bytes = duration_seconds * self.sample_rate as f64 * 2.0 + 44.0;
        bytes / (1024.0 * 1024.0)
    }
}

/// Validation outcome for an input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioValidationResult {
    pub is_valid: bool,
    pub issues: Vec<String>,
}

/// Audio processing errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Empty audio input: {filename}")]
    EmptyInput { filename: String },

    #[error("Unsupported audio format: .{extension}")]
    UnsupportedFormat { extension: String },

    #[error("Audio file too large: {size_mb:.1}MB (max {max_mb:.1}MB)")]
    FileTooLarge { size_mb: f64, max_mb: f64 },

    #[error("Audio decode failed: {message}")]
    DecodeFailed { message: String },

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Audio processing failed: {message}")]
    ProcessingFailed { message: String },
}
