//! Silence detection for chunk boundary placement
//!
//! The chunk planner consumes a silence-boundary oracle: anything that can
//! name positions (seconds) where speech is absent. The host usually wires a
//! real VAD through [`VadPreprocessor`]; the in-crate [`RmsSilenceOracle`]
//! covers the fallback path with plain energy windows.

use async_trait::async_trait;

use super::types::{AudioError, AudioInput, ProcessedAudio};

/// Window length used for energy analysis, seconds.
const ENERGY_WINDOW_SECONDS: f64 = 0.1;

/// Provides candidate cut positions where speech is absent.
pub trait SilenceOracle: Send + Sync {
    /// Midpoints of detected silences, in seconds, ascending.
    fn detect_boundaries(&self, audio: &ProcessedAudio) -> Vec<f64>;
}

/// Host-provided VAD capability.
#[async_trait]
pub trait VadPreprocessor: Send + Sync {
    async fn initialize(&self) -> Result<(), AudioError>;

    /// Run VAD over a file, optionally restricted to a time range, returning
    /// the speech-only audio.
    async fn process_file(
        &self,
        input: &AudioInput,
        start_time: Option<f64>,
        end_time: Option<f64>,
    ) -> Result<ProcessedAudio, AudioError>;

    /// Which mode the preprocessor is operating in.
    fn fallback_mode(&self) -> VadFallbackMode;

    async fn cleanup(&self);
}

/// VAD operating mode reported by the preprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadFallbackMode {
    ServerVad,
    Local,
}

/// RMS energy per window position.
fn window_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Energy-threshold silence oracle.
///
/// Scans 100 ms windows, marks runs whose RMS sits below a threshold derived
/// from the overall median energy, and reports the midpoint of each run long
/// enough to count as a silence.
pub struct RmsSilenceOracle {
    /// Minimum silence run reported, seconds.
    pub min_silence_seconds: f64,
    /// Threshold as a fraction of median window RMS.
    pub threshold_ratio: f32,
}

impl Default for RmsSilenceOracle {
    fn default() -> Self {
        Self {
            min_silence_seconds: 0.3,
            threshold_ratio: 0.25,
        }
    }
}

impl SilenceOracle for RmsSilenceOracle {
    fn detect_boundaries(&self, audio: &ProcessedAudio) -> Vec<f64> {
        let window = (audio.sample_rate as f64 * ENERGY_WINDOW_SECONDS) as usize;
        if window == 0 || audio.samples.len() < window {
            return Vec::new();
        }

        let energies: Vec<f32> = audio
            .samples
            .chunks(window)
            .map(window_rms)
            .collect();

        let mut sorted = energies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = sorted[sorted.len() / 2];
        let threshold = (median * self.threshold_ratio).max(1e-4);

        let min_run = (self.min_silence_seconds / ENERGY_WINDOW_SECONDS).ceil() as usize;
        let mut boundaries = Vec::new();
        let mut run_start: Option<usize> = None;

        for (i, &energy) in energies.iter().enumerate() {
            if energy < threshold {
                run_start.get_or_insert(i);
            } else if let Some(start) = run_start.take() {
                if i - start >= min_run {
                    let mid = (start + i) as f64 / 2.0 * ENERGY_WINDOW_SECONDS;
                    boundaries.push(mid);
                }
            }
        }
        if let Some(start) = run_start {
            if energies.len() - start >= min_run {
                let mid = (start + energies.len()) as f64 / 2.0 * ENERGY_WINDOW_SECONDS;
                boundaries.push(mid);
            }
        }

        boundaries
    }
}

/// Find the lowest-energy position inside `[center - radius, center + radius]`
/// at 100 ms stride. Used when no oracle boundary lands near a target cut.
pub fn find_energy_minimum(audio: &ProcessedAudio, center: f64, radius: f64) -> f64 {
    let window = (audio.sample_rate as f64 * ENERGY_WINDOW_SECONDS) as usize;
    if window == 0 {
        return center;
    }

    let duration = audio.duration_seconds();
    let from = (center - radius).max(0.0);
    let to = (center + radius).min(duration);

    let mut best_pos = center;
    let mut best_rms = f32::MAX;

    let mut pos = from;
    while pos < to {
        let start = (pos * audio.sample_rate as f64) as usize;
        let end = (start + window).min(audio.samples.len());
        if start >= end {
            break;
        }
        let rms = window_rms(&audio.samples[start..end]);
        if rms < best_rms {
            best_rms = rms;
            best_pos = pos + ENERGY_WINDOW_SECONDS / 2.0;
        }
        pos += ENERGY_WINDOW_SECONDS;
    }

    best_pos.min(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::TARGET_SAMPLE_RATE;

    fn audio_with_silence_at(seconds: f64, total: f64) -> ProcessedAudio {
        let rate = TARGET_SAMPLE_RATE as f64;
        let samples: Vec<f32> = (0..(total * rate) as usize)
            .map(|i| {
                let t = i as f64 / rate;
                if (t - seconds).abs() < 0.3 {
                    0.0
                } else {
                    ((i as f32) * 0.3).sin() * 0.4
                }
            })
            .collect();
        ProcessedAudio::new(samples, TARGET_SAMPLE_RATE)
    }

    #[test]
    fn test_oracle_finds_silence_midpoint() {
        let audio = audio_with_silence_at(5.0, 10.0);
        let oracle = RmsSilenceOracle::default();
        let boundaries = oracle.detect_boundaries(&audio);
        assert!(
            boundaries.iter().any(|b| (b - 5.0).abs() < 0.5),
            "no boundary near 5s in {boundaries:?}"
        );
    }

    #[test]
    fn test_oracle_ignores_continuous_speech() {
        let rate = TARGET_SAMPLE_RATE as f64;
        let samples: Vec<f32> = (0..(rate * 5.0) as usize)
            .map(|i| ((i as f32) * 0.3).sin() * 0.4)
            .collect();
        let audio = ProcessedAudio::new(samples, TARGET_SAMPLE_RATE);
        let oracle = RmsSilenceOracle::default();
        assert!(oracle.detect_boundaries(&audio).is_empty());
    }

    #[test]
    fn test_oracle_empty_audio() {
        let audio = ProcessedAudio::new(Vec::new(), TARGET_SAMPLE_RATE);
        let oracle = RmsSilenceOracle::default();
        assert!(oracle.detect_boundaries(&audio).is_empty());
    }

    #[test]
    fn test_energy_minimum_lands_in_quiet_zone() {
        let audio = audio_with_silence_at(5.0, 10.0);
        let minimum = find_energy_minimum(&audio, 4.5, 2.0);
        assert!((minimum - 5.0).abs() < 0.6, "minimum at {minimum}");
    }

    #[test]
    fn test_energy_minimum_clamps_to_duration() {
        let audio = audio_with_silence_at(1.0, 2.0);
        let minimum = find_energy_minimum(&audio, 1.9, 5.0);
        assert!(minimum <= audio.duration_seconds());
    }
}
