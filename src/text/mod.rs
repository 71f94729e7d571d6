//! Text similarity kernel
//!
//! Provides Unicode normalization, n-gram similarity, and constrained
//! longest-common-substring search used by the merger and cleaning pipeline.

pub mod lcs;
pub mod ngram;
pub mod normalize;

pub use lcs::{constrained_common_substring, longest_common_substring, LcsConstraints, SubstringMatch};
pub use ngram::{ngram_similarity, normalized_similarity, optimal_ngram_size, NGramIndex};
pub use normalize::{is_skippable_char, normalize, NormalizedText};
