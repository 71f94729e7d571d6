//! Sequential-context dispatch strategy
//!
//! GPT-class models transcribe one chunk at a time, each request carrying
//! the tail of the previous chunk's text so the model continues coherently
//! across the boundary. The context is cut on sentence boundaries, falling
//! back to a literal tail when no sentence fits the window.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::planner::AudioChunk;

use super::client::SpeechToTextClient;
use super::progress::TranscriptionProgress;
use super::types::{
    message_is_cancellation, DispatchError, ModelSpecificOptions, TranscriptionOptions,
    TranscriptionResult,
};
use super::TranscriptionStrategy;

/// Hard per-request payload ceiling, MB.
const MAX_PAYLOAD_MB: f64 = 25.0;

/// Characters treated as sentence boundaries when cutting context.
const SENTENCE_BOUNDARIES: &[char] = &['。', '.', '!', '?', '！', '？', '\n'];

pub struct SequentialContextStrategy {
    client: Arc<dyn SpeechToTextClient>,
    config: &'static ModelConfig,
}

impl SequentialContextStrategy {
    pub fn new(client: Arc<dyn SpeechToTextClient>, config: &'static ModelConfig) -> Self {
        Self { client, config }
    }
}

/// Take up to `max_chars` characters from the tail of `text`, preferring to
/// start at a sentence boundary. With no boundary inside the window the
/// literal last `max_chars` characters are returned.
pub fn extract_trailing_context(text: &str, max_chars: usize) -> Option<String> {
    if max_chars == 0 {
        return None;
    }
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return None;
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let window_start = chars.len().saturating_sub(max_chars);
    let window = &chars[window_start..];

    // Everything after the first boundary inside the window is whole
    // sentences. The boundary char itself belongs to the cut-off sentence.
    let after_boundary = window
        .iter()
        .position(|c| SENTENCE_BOUNDARIES.contains(c))
        .map(|p| p + 1)
        .filter(|&p| p < window.len());

    let context: String = match after_boundary {
        Some(p) => window[p..].iter().collect::<String>().trim_start().to_string(),
        None => window.iter().collect(),
    };

    if context.is_empty() {
        Some(window.iter().collect())
    } else {
        Some(context)
    }
}

#[async_trait]
impl TranscriptionStrategy for SequentialContextStrategy {
    async fn process_chunks(
        &self,
        chunks: &[AudioChunk],
        options: &TranscriptionOptions,
    ) -> (Vec<TranscriptionResult>, Option<DispatchError>) {
        let total = chunks.len();
        let mut results: Vec<TranscriptionResult> = Vec::with_capacity(total);
        let mut terminal: Option<DispatchError> = None;

        for (index, chunk) in chunks.iter().enumerate() {
            if options.cancellation.is_cancelled() {
                terminal = Some(DispatchError::Cancelled);
                break;
            }

            if let Some(progress) = &options.progress {
                progress.report(TranscriptionProgress {
                    current_chunk: index + 1,
                    total_chunks: total,
                    percentage: index as f64 / total as f64 * 90.0,
                    operation: format!("Transcribing chunk {} of {}", index + 1, total),
                    cancellable: true,
                });
            }

            let size_mb = chunk.size_bytes() as f64 / (1024.0 * 1024.0);
            if size_mb > MAX_PAYLOAD_MB {
                warn!(
                    "Chunk {} payload {:.1}MB exceeds {:.0}MB, skipping",
                    chunk.id, size_mb, MAX_PAYLOAD_MB
                );
                results.push(TranscriptionResult::failure(
                    chunk,
                    options.language,
                    DispatchError::PayloadTooLarge {
                        chunk_id: chunk.id,
                        size_mb,
                        max_mb: MAX_PAYLOAD_MB,
                    }
                    .to_string(),
                ));
                continue;
            }

            let previous_context = results
                .iter()
                .rev()
                .find(|r| r.success)
                .and_then(|r| extract_trailing_context(&r.text, self.config.context_window_size));
            if let Some(context) = &previous_context {
                debug!("Chunk {} continues from {} context chars", chunk.id, context.chars().count());
            }

            let model_options = ModelSpecificOptions {
                previous_context,
                ..ModelSpecificOptions::default()
            };

            match self
                .client
                .transcribe(chunk, options, &model_options, &options.cancellation)
                .await
            {
                Ok(result) => {
                    let aborted = result
                        .error
                        .as_deref()
                        .map(message_is_cancellation)
                        .unwrap_or(false);
                    results.push(result);
                    if aborted {
                        terminal = Some(DispatchError::Cancelled);
                        break;
                    }
                }
                Err(error) if error.is_cancellation() => {
                    terminal = Some(DispatchError::Cancelled);
                    break;
                }
                Err(error) => {
                    warn!("Chunk {} failed, continuing: {}", chunk.id, error);
                    results.push(TranscriptionResult::failure(
                        chunk,
                        options.language,
                        error.to_string(),
                    ));
                }
            }
        }

        (results, terminal)
    }
}
