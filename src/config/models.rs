//! Per-model pipeline configuration
//!
//! Each supported remote model carries chunking limits, dispatch behavior,
//! merge tuning, and pricing. Configs are precomputed at first access and
//! served as immutable snapshots from a process-wide registry.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Supported remote speech-to-text models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    Whisper,
    WhisperTs,
    Gpt4o,
    Gpt4oMini,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [
        ModelId::Whisper,
        ModelId::WhisperTs,
        ModelId::Gpt4o,
        ModelId::Gpt4oMini,
    ];

    /// External id string as used by the remote API surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Whisper => "whisper-1",
            ModelId::WhisperTs => "whisper-1-ts",
            ModelId::Gpt4o => "gpt-4o-transcribe",
            ModelId::Gpt4oMini => "gpt-4o-mini-transcribe",
        }
    }

    pub fn parse(id: &str) -> Result<Self, ConfigError> {
        ModelId::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == id)
            .ok_or_else(|| ConfigError::UnknownModel {
                id: id.to_string(),
                known: ModelId::ALL
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Whether results carry per-segment timestamps.
    pub fn supports_timestamps(&self) -> bool {
        matches!(self, ModelId::WhisperTs)
    }

    /// Whether the dispatch strategy threads trailing context between chunks.
    pub fn uses_sequential_context(&self) -> bool {
        matches!(self, ModelId::Gpt4o | ModelId::Gpt4oMini)
    }
}

/// VAD-assisted chunking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadChunkingConfig {
    /// Overlap carried from each chunk into the next, seconds.
    pub overlap_duration_seconds: f64,
    /// Allowed deviation from the target chunk duration when snapping.
    pub variance: f64,
    /// Minimum silence length considered a valid split point, seconds.
    pub min_silence_for_split: f64,
    /// Extra seconds past the target after which a split is forced.
    pub force_split_after_extra: f64,
    /// Chunks shorter than this are dropped, seconds.
    pub min_chunk_size: f64,
    /// Snap cut positions to silence boundaries when available.
    pub optimize_boundaries: bool,
}

impl Default for VadChunkingConfig {
    fn default() -> Self {
        Self {
            overlap_duration_seconds: 3.0,
            variance: 0.2,
            min_silence_for_split: 0.3,
            force_split_after_extra: 30.0,
            min_chunk_size: 0.1,
            optimize_boundaries: true,
        }
    }
}

/// Boundary-overlap search tuning for the merger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapDetectionConfig {
    /// Shortest overlap candidate tried, characters.
    pub min_overlap_length: usize,
    /// Longest overlap candidate tried, characters.
    pub max_overlap_length: usize,
    /// How far into the next chunk's text the search slides, characters.
    pub search_range_in_next: usize,
    /// Decrement between candidate lengths.
    pub candidate_step_size: usize,
    /// N-gram similarity required to accept a fuzzy overlap match.
    pub similarity_threshold: f64,
    /// Fraction of the candidate length to skip after a match when looking
    /// for further copies.
    pub match_skip_ratio: f64,
}

impl Default for OverlapDetectionConfig {
    fn default() -> Self {
        Self {
            min_overlap_length: 5,
            max_overlap_length: 150,
            search_range_in_next: 300,
            candidate_step_size: 10,
            similarity_threshold: 0.85,
            match_skip_ratio: 0.5,
        }
    }
}

/// Whole-text duplicate removal tuning (post-merge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateRemovalConfig {
    pub enabled: bool,
    /// Window length compared at each scan position, characters.
    pub min_duplicate_length: usize,
    /// N-gram similarity required to treat two windows as duplicates.
    pub duplicate_similarity_threshold: f64,
    /// Candidate positions are only considered within this distance.
    pub search_window: usize,
}

impl Default for DuplicateRemovalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_duplicate_length: 30,
            duplicate_similarity_threshold: 0.95,
            search_window: 1000,
        }
    }
}

/// Merger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergingConfig {
    /// Minimum exact-match length accepted by the substring layers.
    pub min_match_length: usize,
    /// Similarity floor for fuzzy matching layers.
    pub fuzzy_match_similarity: f64,
    /// Base n-gram size for similarity scoring.
    pub ngram_size: usize,
    /// Separator used when no overlap text is found.
    pub separator: String,
    pub overlap_detection: OverlapDetectionConfig,
    pub duplicate_removal: DuplicateRemovalConfig,
    /// Segment-dedup window for timestamp-aware merging, seconds.
    pub duplicate_window_seconds: f64,
    /// Time-overlap fraction above which overlapping segments are joined.
    pub overlap_threshold: f64,
}

impl Default for MergingConfig {
    fn default() -> Self {
        Self {
            min_match_length: 10,
            fuzzy_match_similarity: 0.8,
            ngram_size: 3,
            separator: "\n\n".to_string(),
            overlap_detection: OverlapDetectionConfig::default(),
            duplicate_removal: DuplicateRemovalConfig::default(),
            duplicate_window_seconds: 2.0,
            overlap_threshold: 0.5,
        }
    }
}

/// Per-minute pricing used for cost estimates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricingConfig {
    pub usd_per_minute: f64,
}

impl PricingConfig {
    /// Estimated cost for `duration_seconds` of audio.
    pub fn estimate_usd(&self, duration_seconds: f64) -> f64 {
        self.usd_per_minute * duration_seconds / 60.0
    }
}

/// Complete per-model configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: ModelId,
    /// Preferred chunk duration, seconds.
    pub chunk_duration_seconds: f64,
    /// Upload size limit per request, MB.
    pub max_file_size_mb: f64,
    /// Hard per-chunk duration ceiling, seconds.
    pub max_duration_seconds: f64,
    /// Parallel requests per batch (1 = sequential).
    pub max_concurrent_chunks: usize,
    /// Pause between batches, milliseconds.
    pub rate_limit_delay_ms: u64,
    /// Trailing-context characters threaded to the next chunk (0 = none).
    pub context_window_size: usize,
    /// Per-request timeout, seconds.
    pub request_timeout_seconds: u64,
    pub vad_chunking: VadChunkingConfig,
    pub merging: MergingConfig,
    pub pricing: PricingConfig,
}

impl ModelConfig {
    /// Immutable config snapshot for a model, from the process-wide registry.
    pub fn for_model(model: ModelId) -> &'static ModelConfig {
        &REGISTRY[&model]
    }

    /// Parse an external id and return its config, or a descriptive error
    /// listing known ids.
    pub fn for_model_id(id: &str) -> Result<&'static ModelConfig, ConfigError> {
        Ok(Self::for_model(ModelId::parse(id)?))
    }

    fn whisper(model: ModelId) -> Self {
        Self {
            model,
            chunk_duration_seconds: 600.0,
            max_file_size_mb: 25.0,
            max_duration_seconds: 1500.0,
            max_concurrent_chunks: 2,
            rate_limit_delay_ms: 1000,
            context_window_size: 0,
            request_timeout_seconds: 60,
            vad_chunking: VadChunkingConfig::default(),
            merging: MergingConfig {
                duplicate_removal: DuplicateRemovalConfig {
                    enabled: true,
                    ..DuplicateRemovalConfig::default()
                },
                ..MergingConfig::default()
            },
            pricing: PricingConfig {
                usd_per_minute: 0.006,
            },
        }
    }

    fn gpt4o(model: ModelId, usd_per_minute: f64) -> Self {
        Self {
            model,
            chunk_duration_seconds: 300.0,
            max_file_size_mb: 25.0,
            max_duration_seconds: 600.0,
            max_concurrent_chunks: 1,
            rate_limit_delay_ms: 500,
            context_window_size: 200,
            request_timeout_seconds: 120,
            vad_chunking: VadChunkingConfig {
                overlap_duration_seconds: 5.0,
                ..VadChunkingConfig::default()
            },
            merging: MergingConfig {
                // GPT-class models are prompt-faithful; short overlaps from
                // the continuation context need looser exact-match floors.
                min_match_length: 8,
                overlap_detection: OverlapDetectionConfig {
                    max_overlap_length: 200,
                    search_range_in_next: 400,
                    ..OverlapDetectionConfig::default()
                },
                ..MergingConfig::default()
            },
            pricing: PricingConfig { usd_per_minute },
        }
    }
}

static REGISTRY: Lazy<HashMap<ModelId, ModelConfig>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(ModelId::Whisper, ModelConfig::whisper(ModelId::Whisper));
    map.insert(ModelId::WhisperTs, ModelConfig::whisper(ModelId::WhisperTs));
    map.insert(ModelId::Gpt4o, ModelConfig::gpt4o(ModelId::Gpt4o, 0.006));
    map.insert(
        ModelId::Gpt4oMini,
        ModelConfig::gpt4o(ModelId::Gpt4oMini, 0.003),
    );
    map
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_ids() {
        assert_eq!(ModelId::parse("whisper-1").unwrap(), ModelId::Whisper);
        assert_eq!(
            ModelId::parse("gpt-4o-mini-transcribe").unwrap(),
            ModelId::Gpt4oMini
        );
    }

    #[test]
    fn test_parse_unknown_id_lists_known() {
        let err = ModelId::parse("nova-2").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("nova-2"));
        assert!(message.contains("whisper-1"));
        assert!(message.contains("gpt-4o-transcribe"));
    }

    #[test]
    fn test_registry_covers_all_models() {
        for model in ModelId::ALL {
            let config = ModelConfig::for_model(model);
            assert_eq!(config.model, model);
            assert!(config.chunk_duration_seconds > 0.0);
            assert!(config.max_concurrent_chunks >= 1);
        }
    }

    #[test]
    fn test_sequential_models_carry_context_window() {
        assert!(ModelConfig::for_model(ModelId::Gpt4o).context_window_size > 0);
        assert_eq!(ModelConfig::for_model(ModelId::Whisper).context_window_size, 0);
    }

    #[test]
    fn test_pricing_estimate() {
        let pricing = PricingConfig {
            usd_per_minute: 0.006,
        };
        assert!((pricing.estimate_usd(600.0) - 0.06).abs() < 1e-9);
    }
}
