//! chunkscribe - chunked transcription pipeline engine
//!
//! Turns a long audio file into one cleaned transcript: speech-bounded
//! chunking sized for a remote speech-to-text model, model-specific dispatch
//! (parallel batches or sequential with trailing context), overlap-aware
//! merging, and a guarded hallucination-cleaning pipeline.
//!
//! Audio decoding, VAD internals, and the HTTP wire sit behind collaborator
//! traits; hosts inject them into [`service::TranscriptionService`].

pub mod audio;
pub mod cleaning;
pub mod config;
pub mod dispatch;
pub mod merge;
pub mod messages;
pub mod planner;
pub mod service;
pub mod text;

pub use config::{Language, ModelConfig, ModelId};
pub use dispatch::{ProgressReporter, TranscriptionProgress};
pub use service::{
    DictionaryCorrector, ResourceManager, ServiceError, TranscriptionOutput, TranscriptionRequest,
    TranscriptionService,
};

/// Initialize a default tracing subscriber for hosts that do not bring
/// their own. Safe to call more than once.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}
