//! Audio engine collaborator seam
//!
//! Decoding arbitrary container formats and resampling to the 16 kHz mono
//! target is the host's job; the pipeline only depends on this trait. A
//! passthrough implementation covering canonical WAV input ships in-crate so
//! the engine is usable (and testable) without a host.

use async_trait::async_trait;

use super::types::{AudioError, AudioInput, AudioValidationResult, ProcessedAudio, TARGET_SAMPLE_RATE};
use super::wav;

/// Conversion target for [`AudioEngine::convert_to_target_format`].
#[derive(Debug, Clone, Copy)]
pub struct TargetFormat {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
}

impl Default for TargetFormat {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            bit_depth: 16,
            channels: 1,
        }
    }
}

/// Host-provided audio decode/convert capability.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    async fn validate(&self, input: &AudioInput) -> Result<AudioValidationResult, AudioError>;

    /// Decode the container into PCM at its native rate.
    async fn decode(&self, input: &AudioInput) -> Result<ProcessedAudio, AudioError>;

    /// Resample/downmix decoded audio to the pipeline target format.
    async fn convert_to_target_format(
        &self,
        audio: ProcessedAudio,
        target: TargetFormat,
    ) -> Result<ProcessedAudio, AudioError>;

    async fn cleanup(&self);
}

/// Minimal engine handling canonical WAV input only. Non-WAV containers are
/// rejected; hosts with broader codec support supply their own engine.
pub struct WavOnlyEngine;

#[async_trait]
impl AudioEngine for WavOnlyEngine {
    async fn validate(&self, input: &AudioInput) -> Result<AudioValidationResult, AudioError> {
        let mut issues = Vec::new();
        if input.extension != "wav" {
            issues.push(format!(
                "unsupported container .{} (WavOnlyEngine handles .wav)",
                input.extension
            ));
        }
        if input.data.len() < 44 {
            issues.push("file shorter than a WAV header".to_string());
        }
        Ok(AudioValidationResult {
            is_valid: issues.is_empty(),
            issues,
        })
    }

    async fn decode(&self, input: &AudioInput) -> Result<ProcessedAudio, AudioError> {
        if input.extension != "wav" {
            return Err(AudioError::UnsupportedFormat {
                extension: input.extension.clone(),
            });
        }
        let (samples, sample_rate) = wav::decode_wav(&input.data)?;
        Ok(ProcessedAudio::new(samples, sample_rate))
    }

    async fn convert_to_target_format(
        &self,
        audio: ProcessedAudio,
        target: TargetFormat,
    ) -> Result<ProcessedAudio, AudioError> {
        if audio.sample_rate == target.sample_rate {
            return Ok(audio);
        }
        // Nearest-sample resampling is enough for the fallback engine; hosts
        // needing quality resampling bring their own.
        let ratio = target.sample_rate as f64 / audio.sample_rate as f64;
        let out_len = (audio.samples.len() as f64 * ratio).round() as usize;
        let mut resampled = Vec::with_capacity(out_len);
        for i in 0..out_len {
            let src = (i as f64 / ratio) as usize;
            resampled.push(audio.samples[src.min(audio.samples.len() - 1)]);
        }
        Ok(ProcessedAudio::new(resampled, target.sample_rate))
    }

    async fn cleanup(&self) {}
}
