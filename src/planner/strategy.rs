//! Chunking strategy decision
//!
//! Works out whether audio needs splitting for a model and what chunk
//! duration to use. Size checks apply a 0.9 margin under the hard upload
//! limit so a chunk landing exactly on the estimate never bounces.

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

/// Size margin applied under the hard upload limit.
const SIZE_MARGIN: f64 = 0.9;

/// Minimum chunk duration the planner will choose, seconds.
const MIN_CHUNK_DURATION: f64 = 60.0;

/// Why chunking was required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkReason {
    Duration,
    FileSize,
    Both,
}

/// The chunking decision that travels with the produced chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkStrategy {
    pub needs_chunking: bool,
    pub total_chunks: usize,
    /// Chosen chunk duration, seconds.
    pub chunk_duration: f64,
    /// Overlap carried between consecutive chunks, seconds.
    pub overlap_duration: f64,
    /// Full audio duration, seconds.
    pub total_duration: f64,
    /// Present only when `needs_chunking` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ChunkReason>,
}

impl ChunkStrategy {
    /// Single-chunk strategy covering the whole audio.
    pub fn single(total_duration: f64) -> Self {
        Self {
            needs_chunking: false,
            total_chunks: 1,
            chunk_duration: total_duration,
            overlap_duration: 0.0,
            total_duration,
            reason: None,
        }
    }
}

/// Decide whether chunking is needed and with which parameters.
pub fn decide_strategy(
    total_duration: f64,
    estimated_size_mb: f64,
    config: &ModelConfig,
) -> ChunkStrategy {
    let fits_duration = total_duration <= config.chunk_duration_seconds;
    let fits_size = estimated_size_mb <= SIZE_MARGIN * config.max_file_size_mb;

    if fits_duration && fits_size {
        return ChunkStrategy::single(total_duration);
    }

    let reason = match (fits_duration, fits_size) {
        (false, false) => ChunkReason::Both,
        (false, true) => ChunkReason::Duration,
        (true, false) => ChunkReason::FileSize,
        (true, true) => unreachable!(),
    };

    let chunk_duration = optimal_chunk_duration(total_duration, estimated_size_mb, config);
    let overlap = config.vad_chunking.overlap_duration_seconds.min(chunk_duration / 2.0);

    let step = (chunk_duration - overlap).max(1.0);
    let total_chunks = if total_duration <= chunk_duration {
        1
    } else {
        (((total_duration - chunk_duration) / step).ceil() as usize) + 1
    };

    ChunkStrategy {
        needs_chunking: true,
        total_chunks,
        chunk_duration,
        overlap_duration: overlap,
        total_duration,
        reason: Some(reason),
    }
}

/// Choose the chunk duration for split audio.
///
/// Starts at the model's hard duration ceiling (or the audio length when
/// shorter), shrinks it until the per-chunk upload estimate fits under the
/// size margin, then rounds to a 10 s grid with a 60 s floor. The model's
/// preferred duration wins whenever it fits both limits.
pub fn optimal_chunk_duration(
    total_duration: f64,
    estimated_size_mb: f64,
    config: &ModelConfig,
) -> f64 {
    let mb_per_second = if total_duration > 0.0 {
        estimated_size_mb / total_duration
    } else {
        0.0
    };
    let size_budget_mb = SIZE_MARGIN * config.max_file_size_mb;

    let fits = |duration: f64| duration * mb_per_second <= size_budget_mb;

    let preferred = config.chunk_duration_seconds;
    if preferred <= config.max_duration_seconds && fits(preferred) {
        return preferred;
    }

    let mut duration = config.max_duration_seconds.min(total_duration);
    let estimated_chunk_mb = duration * mb_per_second;
    if estimated_chunk_mb > size_budget_mb && estimated_chunk_mb > 0.0 {
        duration *= size_budget_mb / estimated_chunk_mb;
    }

    duration = duration.max(MIN_CHUNK_DURATION);
    (duration / 10.0).round() * 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, ModelId};

    fn config() -> &'static ModelConfig {
        ModelConfig::for_model(ModelId::Whisper)
    }

    #[test]
    fn test_short_small_audio_single_chunk() {
        let strategy = decide_strategy(120.0, 2.0, config());
        assert!(!strategy.needs_chunking);
        assert_eq!(strategy.total_chunks, 1);
        assert!(strategy.reason.is_none());
        assert_eq!(strategy.overlap_duration, 0.0);
    }

    #[test]
    fn test_long_audio_chunks_by_duration() {
        let strategy = decide_strategy(1800.0, 10.0, config());
        assert!(strategy.needs_chunking);
        assert_eq!(strategy.reason, Some(ChunkReason::Duration));
        assert!(strategy.total_chunks >= 3);
    }

    #[test]
    fn test_big_file_chunks_by_size() {
        // Short enough for the duration limit, too big for upload
        let strategy = decide_strategy(500.0, 40.0, config());
        assert!(strategy.needs_chunking);
        assert_eq!(strategy.reason, Some(ChunkReason::FileSize));
    }

    #[test]
    fn test_both_limits_exceeded() {
        let strategy = decide_strategy(4000.0, 120.0, config());
        assert_eq!(strategy.reason, Some(ChunkReason::Both));
    }

    #[test]
    fn test_size_exactly_at_margin_is_single() {
        // 0.9 * 25MB = 22.5MB; exactly at the margin does not trigger
        let strategy = decide_strategy(120.0, 22.5, config());
        assert!(!strategy.needs_chunking);
    }

    #[test]
    fn test_optimal_duration_uses_preferred_when_it_fits() {
        let duration = optimal_chunk_duration(3600.0, 20.0, config());
        assert_eq!(duration, config().chunk_duration_seconds);
    }

    #[test]
    fn test_optimal_duration_shrinks_for_dense_audio() {
        // 200MB over 1000s = 0.2 MB/s; the 600s preferred chunk would be
        // 120MB, far over the 22.5MB budget
        let duration = optimal_chunk_duration(1000.0, 200.0, config());
        assert!(duration * 0.2 <= 22.5 + 1.0, "duration {duration}");
        assert!(duration >= 60.0);
        assert_eq!(duration % 10.0, 0.0);
    }

    #[test]
    fn test_optimal_duration_floor_and_rounding() {
        let duration = optimal_chunk_duration(10_000.0, 2_000.0, config());
        assert!(duration >= 60.0);
        assert_eq!(duration % 10.0, 0.0);
    }
}
