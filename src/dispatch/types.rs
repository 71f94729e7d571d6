//! Dispatch-related type definitions
//!
//! Result, option, and error types shared by the transcription strategies.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Language;
use crate::messages;
use crate::planner::AudioChunk;

use super::progress::ProgressReporter;

/// Word-level timing inside a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// One timed segment of a chunk result. Times are absolute in the source
/// audio (chunk offset already applied).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<WordTimestamp>>,
}

/// Per-chunk transcription outcome. Failed chunks carry `success = false`
/// and a placeholder text instead of propagating an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub id: usize,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<TranscriptionSegment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TranscriptionResult {
    /// Failure filler for a chunk, with a localized placeholder text.
    pub fn failure(chunk: &AudioChunk, language: Language, error: impl Into<String>) -> Self {
        Self {
            id: chunk.id,
            text: messages::chunk_failed_placeholder(language, chunk.id),
            start_time: chunk.start_time,
            end_time: chunk.end_time,
            success: false,
            error: Some(error.into()),
            segments: None,
            confidence: None,
            language: None,
        }
    }
}

/// Request-scoped options shared by all strategies.
#[derive(Clone)]
pub struct TranscriptionOptions {
    pub language: Language,
    /// Request per-segment timestamps from the model.
    pub timestamps: bool,
    pub cancellation: CancellationToken,
    pub progress: Option<ProgressReporter>,
}

impl TranscriptionOptions {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            timestamps: false,
            cancellation: CancellationToken::new(),
            progress: None,
        }
    }
}

/// Options routed to the model-specific request channel.
#[derive(Debug, Clone, Default)]
pub struct ModelSpecificOptions {
    /// Trailing text of the previous chunk, for continuation-aware models.
    pub previous_context: Option<String>,
    /// Sampling temperature override.
    pub temperature: Option<f32>,
}

/// Final outcome of a strategy run, possibly partial.
#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    pub text: String,
    pub segments: Option<Vec<TranscriptionSegment>>,
    pub partial: bool,
    pub error: Option<String>,
}

/// Dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Transcription cancelled")]
    Cancelled,

    #[error("Remote transcription failed for chunk {chunk_id}: {message}")]
    RemoteCall { chunk_id: usize, message: String },

    #[error("Chunk {chunk_id} payload too large: {size_mb:.1}MB (max {max_mb:.0}MB)")]
    PayloadTooLarge {
        chunk_id: usize,
        size_mb: f64,
        max_mb: f64,
    },

    #[error("Request for chunk {chunk_id} timed out after {seconds}s")]
    Timeout { chunk_id: usize, seconds: u64 },

    #[error("Transcription failed: {message}")]
    Failed { message: String },
}

impl DispatchError {
    /// Whether this error (or an error message) represents cancellation.
    pub fn is_cancellation(&self) -> bool {
        match self {
            DispatchError::Cancelled => true,
            DispatchError::RemoteCall { message, .. } | DispatchError::Failed { message } => {
                message_is_cancellation(message)
            }
            _ => false,
        }
    }
}

/// Remote clients surface aborts as plain messages; treat those like a
/// cancellation signal.
pub fn message_is_cancellation(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("abort") || lower.contains("cancel")
}
