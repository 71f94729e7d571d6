//! Transcription dispatch module
//!
//! Two strategies share one contract: given chunks and request options,
//! produce per-chunk results in chunk order, never letting an isolated
//! failure abort the run. The shared finalizer applies the partial-result
//! rules: whatever was collected gets merged, and a partial transcript is
//! labelled as such instead of being thrown away.

pub mod client;
pub mod parallel;
pub mod progress;
pub mod sequential;
pub mod types;

pub use client::{HttpSpeechClient, SpeechToTextClient};
pub use parallel::ParallelBatchStrategy;
pub use progress::{ProgressReporter, TranscriptionProgress};
pub use sequential::SequentialContextStrategy;
pub use types::*;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{ModelConfig, ModelId};
use crate::merge::TranscriptMerger;
use crate::messages;
use crate::planner::AudioChunk;

/// Chunk-processing half of a dispatch strategy.
///
/// Returns the collected results (possibly fewer than `chunks.len()`) plus
/// the terminal error when the loop ended abnormally.
#[async_trait]
pub trait TranscriptionStrategy: Send + Sync {
    async fn process_chunks(
        &self,
        chunks: &[AudioChunk],
        options: &TranscriptionOptions,
    ) -> (Vec<TranscriptionResult>, Option<DispatchError>);
}

/// Build the strategy matching a model's dispatch policy.
pub fn strategy_for_model(
    client: Arc<dyn SpeechToTextClient>,
    config: &'static ModelConfig,
) -> Box<dyn TranscriptionStrategy> {
    if config.model.uses_sequential_context() {
        Box::new(SequentialContextStrategy::new(client, config))
    } else {
        Box::new(ParallelBatchStrategy::new(client, config))
    }
}

/// Run a strategy over the chunks and apply the shared partial-result
/// contract.
///
/// - Any collected results are merged and returned; the outcome is partial
///   when fewer chunks succeeded than were dispatched or the loop ended on
///   an error. Partial transcripts get a localized header and a
///   `processed/total` summary.
/// - Zero results under cancellation returns a localized cancel notice,
///   still flagged partial.
/// - Zero results without cancellation propagates the terminal error.
pub async fn run_transcription(
    strategy: &dyn TranscriptionStrategy,
    chunks: &[AudioChunk],
    options: &TranscriptionOptions,
    merger: &TranscriptMerger,
) -> Result<TranscriptionOutcome, DispatchError> {
    let total = chunks.len();
    let (results, terminal) = strategy.process_chunks(chunks, options).await;

    if results.is_empty() {
        return match terminal {
            Some(error) if error.is_cancellation() => {
                info!("Cancelled before any chunk completed");
                Ok(TranscriptionOutcome {
                    text: messages::cancelled_notice(options.language).to_string(),
                    segments: None,
                    partial: true,
                    error: Some(error.to_string()),
                })
            }
            Some(error) => Err(error),
            None => Err(DispatchError::Failed {
                message: messages::all_chunks_failed(options.language).to_string(),
            }),
        };
    }

    let successes = results.iter().filter(|r| r.success).count();
    let merged = match merger.merge(&results) {
        Ok(merged) => merged,
        Err(error) => {
            // Merge failure degrades to a plain join of the successful
            // chunks rather than dropping collected work.
            warn!("Merge failed, falling back to simple join: {}", error);
            let text = results
                .iter()
                .filter(|r| r.success)
                .map(|r| r.text.trim())
                .collect::<Vec<_>>()
                .join("\n\n");
            return Ok(TranscriptionOutcome {
                text,
                segments: None,
                partial: true,
                error: Some(error.to_string()),
            });
        }
    };

    let partial = successes < total || terminal.is_some();
    let error = terminal.map(|e| e.to_string()).or_else(|| {
        results
            .iter()
            .filter(|r| !r.success)
            .find_map(|r| r.error.clone())
    });
    let text = if partial {
        format!(
            "{}\n{}\n\n{}",
            messages::partial_result_header(options.language),
            messages::partial_summary(options.language, successes, total),
            merged.text
        )
    } else {
        merged.text
    };

    if let Some(progress) = &options.progress {
        progress.report(TranscriptionProgress {
            current_chunk: total,
            total_chunks: total,
            percentage: 100.0,
            operation: "Merging complete".to_string(),
            cancellable: false,
        });
    }

    Ok(TranscriptionOutcome {
        text,
        segments: merged.segments,
        partial,
        error,
    })
}

/// Convenience: build merger + strategy for a model id and run the workflow.
pub async fn transcribe_chunks(
    client: Arc<dyn SpeechToTextClient>,
    model: ModelId,
    chunks: &[AudioChunk],
    options: &TranscriptionOptions,
) -> Result<TranscriptionOutcome, DispatchError> {
    let config = ModelConfig::for_model(model);
    let strategy = strategy_for_model(client, config);
    let merger = TranscriptMerger::new(config, options.language, model.supports_timestamps());
    run_transcription(strategy.as_ref(), chunks, options, &merger).await
}
