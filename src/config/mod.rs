//! Model configuration module
//!
//! Provides per-model chunking, dispatch, merging, and cleaning configuration
//! with a process-wide registry of precomputed immutable configs.

pub mod cleaning;
pub mod models;

pub use cleaning::*;
pub use models::*;

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown model id: {id} (known: {known})")]
    UnknownModel { id: String, known: String },

    #[error("Invalid pattern {pattern:?} for {scope}: {message}")]
    BadPattern {
        scope: String,
        pattern: String,
        message: String,
    },
}
