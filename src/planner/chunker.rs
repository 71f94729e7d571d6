//! Chunk construction
//!
//! Turns a chunking strategy into actual WAV-encoded chunks. Interior cut
//! positions snap to the silence oracle when one lands within the snap
//! window; otherwise a local energy-minimum search picks the quietest spot.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::vad::{find_energy_minimum, SilenceOracle};
use crate::audio::{wav, ProcessedAudio};
use crate::config::ModelConfig;

use super::strategy::{decide_strategy, ChunkStrategy};

/// How far a cut position may move to reach a silence, seconds.
const SNAP_WINDOW_SECONDS: f64 = 5.0;

/// A WAV-encoded slice of the source audio bound for one remote request.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Stable sequential id, 0-based in chunk order.
    pub id: usize,
    /// Canonical 16-bit mono WAV payload.
    pub data: Vec<u8>,
    /// Slice start in the source audio, seconds.
    pub start_time: f64,
    /// Slice end in the source audio, seconds.
    pub end_time: f64,
    /// Whether this chunk's tail extends into the next chunk's region.
    pub has_overlap: bool,
    /// Length of that extension, seconds.
    pub overlap_duration: f64,
}

impl AudioChunk {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Planner output: the decision plus the chunks it produced.
#[derive(Debug)]
pub struct PlannedChunks {
    pub strategy: ChunkStrategy,
    pub chunks: Vec<AudioChunk>,
}

/// Planner failures are fatal for the request.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Cannot chunk empty audio")]
    EmptyAudio,

    #[error("Boundary construction failed: {message}")]
    BoundaryConstruction { message: String },
}

/// Splits processed audio into model-sized chunks at silence boundaries.
pub struct ChunkPlanner {
    config: &'static ModelConfig,
    oracle: Box<dyn SilenceOracle>,
}

impl ChunkPlanner {
    pub fn new(config: &'static ModelConfig, oracle: Box<dyn SilenceOracle>) -> Self {
        Self { config, oracle }
    }

    /// Produce the strategy and chunk sequence for this audio.
    pub fn plan(
        &self,
        audio: &ProcessedAudio,
        estimated_size_mb: f64,
    ) -> Result<PlannedChunks, PlannerError> {
        if audio.samples.is_empty() {
            return Err(PlannerError::EmptyAudio);
        }

        let duration = audio.duration_seconds();
        let mut strategy = decide_strategy(duration, estimated_size_mb, self.config);

        if !strategy.needs_chunking {
            let chunk = self.encode_slice(audio, 0, 0.0, duration, 0.0);
            info!(
                "Audio fits in single chunk ({:.2}s, {:.1}MB estimate)",
                duration, estimated_size_mb
            );
            return Ok(PlannedChunks {
                strategy,
                chunks: vec![chunk],
            });
        }

        let boundaries = self.place_boundaries(audio, &strategy);
        debug!("Cut positions: {:?}", boundaries);

        let chunks = self.build_chunks(audio, &boundaries, strategy.overlap_duration);

        if chunks.is_empty() {
            // Everything fell under the minimum chunk size; treat the audio
            // as a single chunk rather than failing the request.
            warn!("All chunks below minimum size, falling back to single chunk");
            let chunk = self.encode_slice(audio, 0, 0.0, duration, 0.0);
            strategy = ChunkStrategy::single(duration);
            return Ok(PlannedChunks {
                strategy,
                chunks: vec![chunk],
            });
        }

        strategy.total_chunks = chunks.len();
        info!(
            "Split {:.2}s audio into {} chunks (chunk={:.0}s, overlap={:.1}s)",
            duration,
            chunks.len(),
            strategy.chunk_duration,
            strategy.overlap_duration
        );

        Ok(PlannedChunks { strategy, chunks })
    }

    /// Interior cut positions at multiples of the chunk duration, snapped to
    /// silence. First and last positions are pinned to 0 and the duration.
    fn place_boundaries(&self, audio: &ProcessedAudio, strategy: &ChunkStrategy) -> Vec<f64> {
        let duration = strategy.total_duration;
        let silences = if self.config.vad_chunking.optimize_boundaries {
            self.oracle.detect_boundaries(audio)
        } else {
            Vec::new()
        };

        let mut boundaries = vec![0.0];
        let step = strategy.chunk_duration - strategy.overlap_duration;
        let mut target = step.max(1.0);

        while target < duration - 1.0 {
            let snapped = match nearest_within(&silences, target, SNAP_WINDOW_SECONDS) {
                Some(silence) => {
                    debug!("Snapped cut {:.2}s -> silence at {:.2}s", target, silence);
                    silence
                }
                None => find_energy_minimum(audio, target, SNAP_WINDOW_SECONDS),
            };

            // Keep cut positions strictly increasing even when snapping
            // pulls two targets toward the same silence.
            let last = *boundaries.last().unwrap();
            if snapped > last + self.config.vad_chunking.min_chunk_size {
                boundaries.push(snapped);
            }
            target += step.max(1.0);
        }

        boundaries.push(duration);
        boundaries
    }

    fn build_chunks(
        &self,
        audio: &ProcessedAudio,
        boundaries: &[f64],
        overlap: f64,
    ) -> Vec<AudioChunk> {
        let duration = audio.duration_seconds();
        let min_size = self.config.vad_chunking.min_chunk_size;
        let mut chunks = Vec::new();

        for window in boundaries.windows(2) {
            let start = window[0];
            let is_last = window[1] >= duration;
            let end = if is_last {
                duration
            } else {
                (window[1] + overlap).min(duration)
            };

            if end - start < min_size {
                debug!(
                    "Dropping {:.3}s slice below minimum chunk size",
                    end - start
                );
                continue;
            }

            let actual_overlap = if is_last { 0.0 } else { end - window[1] };
            chunks.push(self.encode_slice(audio, chunks.len(), start, end, actual_overlap));
        }

        chunks
    }

    fn encode_slice(
        &self,
        audio: &ProcessedAudio,
        id: usize,
        start: f64,
        end: f64,
        overlap: f64,
    ) -> AudioChunk {
        let rate = audio.sample_rate as f64;
        let from = (start * rate) as usize;
        let to = ((end * rate) as usize).min(audio.samples.len());
        let data = wav::encode_wav(&audio.samples[from..to], audio.sample_rate);

        AudioChunk {
            id,
            data,
            start_time: start,
            end_time: end,
            has_overlap: overlap > 0.0,
            overlap_duration: overlap,
        }
    }
}

fn nearest_within(candidates: &[f64], target: f64, radius: f64) -> Option<f64> {
    candidates
        .iter()
        .copied()
        .filter(|c| (c - target).abs() <= radius)
        .min_by(|a, b| {
            (a - target)
                .abs()
                .partial_cmp(&(b - target).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::TARGET_SAMPLE_RATE;
    use crate::config::ModelId;

    /// Oracle with fixed boundaries for deterministic tests.
    struct FixedOracle(Vec<f64>);

    impl SilenceOracle for FixedOracle {
        fn detect_boundaries(&self, _audio: &ProcessedAudio) -> Vec<f64> {
            self.0.clone()
        }
    }

    fn speechy_audio(seconds: f64) -> ProcessedAudio {
        let rate = TARGET_SAMPLE_RATE as f64;
        let samples: Vec<f32> = (0..(seconds * rate) as usize)
            .map(|i| ((i as f32) * 0.3).sin() * 0.4)
            .collect();
        ProcessedAudio::new(samples, TARGET_SAMPLE_RATE)
    }

    fn planner(silences: Vec<f64>) -> ChunkPlanner {
        ChunkPlanner::new(
            ModelConfig::for_model(ModelId::Whisper),
            Box::new(FixedOracle(silences)),
        )
    }

    #[test]
    fn test_short_audio_single_chunk() {
        let audio = speechy_audio(30.0);
        let planned = planner(vec![]).plan(&audio, 1.0).unwrap();

        assert!(!planned.strategy.needs_chunking);
        assert_eq!(planned.chunks.len(), 1);
        assert_eq!(planned.chunks[0].id, 0);
        assert_eq!(planned.chunks[0].start_time, 0.0);
        assert!(!planned.chunks[0].has_overlap);
    }

    #[test]
    fn test_empty_audio_is_fatal() {
        let audio = ProcessedAudio::new(Vec::new(), TARGET_SAMPLE_RATE);
        assert!(matches!(
            planner(vec![]).plan(&audio, 0.0),
            Err(PlannerError::EmptyAudio)
        ));
    }

    #[test]
    fn test_chunks_cover_audio_with_overlap() {
        // 1500s at whisper's 600s preferred chunk: cuts near 597 and 1194
        let audio = speechy_audio(1500.0);
        let planned = planner(vec![595.0, 1190.0]).plan(&audio, 10.0).unwrap();

        let chunks = &planned.chunks;
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].start_time, 0.0);
        assert!((chunks.last().unwrap().end_time - 1500.0).abs() < 1e-6);

        for pair in chunks.windows(2) {
            assert!(pair[1].start_time <= pair[0].end_time, "no overlap between chunks");
            assert!(pair[1].start_time > pair[0].start_time, "chunks out of order");
        }
        assert!(chunks[0].has_overlap);
        assert!(!chunks.last().unwrap().has_overlap);
    }

    #[test]
    fn test_snapping_prefers_oracle_silence() {
        let audio = speechy_audio(1500.0);
        let planned = planner(vec![595.0, 1190.0]).plan(&audio, 10.0).unwrap();
        // First cut lands on the oracle boundary at 595s, not the raw 597s
        assert!(planned.chunks.iter().any(|c| (c.start_time - 595.0).abs() < 1e-6));
    }

    #[test]
    fn test_ids_sequential_from_zero() {
        let audio = speechy_audio(1500.0);
        let planned = planner(vec![]).plan(&audio, 10.0).unwrap();
        for (i, chunk) in planned.chunks.iter().enumerate() {
            assert_eq!(chunk.id, i);
        }
    }

    #[test]
    fn test_chunk_payload_is_wav() {
        let audio = speechy_audio(10.0);
        let planned = planner(vec![]).plan(&audio, 0.5).unwrap();
        let data = &planned.chunks[0].data;
        assert_eq!(&data[0..4], b"RIFF");
        let (decoded, rate) = wav::decode_wav(data).unwrap();
        assert_eq!(rate, TARGET_SAMPLE_RATE);
        assert_eq!(decoded.len(), audio.samples.len());
    }
}
