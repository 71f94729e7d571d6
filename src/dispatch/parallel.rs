//! Parallel-batch dispatch strategy
//!
//! Whisper-class models take chunks in fixed-size batches. Each batch runs
//! concurrently and joins in request order, so the collected result list is
//! deterministic regardless of completion order. A rate-limit pause sits
//! between batches; both the pause and the in-flight requests race the
//! cancellation token.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::config::ModelConfig;
use crate::planner::AudioChunk;

use super::client::SpeechToTextClient;
use super::progress::TranscriptionProgress;
use super::types::{
    message_is_cancellation, DispatchError, ModelSpecificOptions, TranscriptionOptions,
    TranscriptionResult,
};
use super::TranscriptionStrategy;

pub struct ParallelBatchStrategy {
    client: Arc<dyn SpeechToTextClient>,
    config: &'static ModelConfig,
}

impl ParallelBatchStrategy {
    pub fn new(client: Arc<dyn SpeechToTextClient>, config: &'static ModelConfig) -> Self {
        Self { client, config }
    }

    fn report_batch_start(
        &self,
        options: &TranscriptionOptions,
        first_chunk: usize,
        total: usize,
    ) {
        if let Some(progress) = &options.progress {
            progress.report(TranscriptionProgress {
                current_chunk: first_chunk + 1,
                total_chunks: total,
                // The last 10% belongs to merging
                percentage: first_chunk as f64 / total as f64 * 90.0,
                operation: format!("Transcribing chunk {} of {}", first_chunk + 1, total),
                cancellable: true,
            });
        }
    }
}

#[async_trait]
impl TranscriptionStrategy for ParallelBatchStrategy {
    async fn process_chunks(
        &self,
        chunks: &[AudioChunk],
        options: &TranscriptionOptions,
    ) -> (Vec<TranscriptionResult>, Option<DispatchError>) {
        let total = chunks.len();
        let batch_size = self.config.max_concurrent_chunks.max(1);
        let mut results = Vec::with_capacity(total);
        let mut terminal: Option<DispatchError> = None;

        info!(
            "Dispatching {} chunks in batches of {} ({})",
            total,
            batch_size,
            self.config.model.as_str()
        );

        let batch_count = chunks.chunks(batch_size).count();

        'batches: for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            if options.cancellation.is_cancelled() {
                terminal = Some(DispatchError::Cancelled);
                break;
            }

            let first_chunk = batch_index * batch_size;
            self.report_batch_start(options, first_chunk, total);

            let calls = batch.iter().map(|chunk| {
                let model_options = ModelSpecificOptions::default();
                async move {
                    self.client
                        .transcribe(chunk, options, &model_options, &options.cancellation)
                        .await
                }
            });

            // join_all preserves request order, keeping merge input
            // deterministic.
            let outcomes = join_all(calls).await;

            for (chunk, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => {
                        let aborted = result
                            .error
                            .as_deref()
                            .map(message_is_cancellation)
                            .unwrap_or(false);
                        results.push(result);
                        if aborted {
                            terminal = Some(DispatchError::Cancelled);
                            break 'batches;
                        }
                    }
                    Err(error) if error.is_cancellation() => {
                        terminal = Some(DispatchError::Cancelled);
                        break 'batches;
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

            let is_last_batch = batch_index + 1 == batch_count;
            if !is_last_batch && self.config.rate_limit_delay_ms > 0 {
                let delay = std::time::Duration::from_millis(self.config.rate_limit_delay_ms);
                tokio::select! {
                    _ = options.cancellation.cancelled() => {
                        terminal = Some(DispatchError::Cancelled);
                        break 'batches;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        (results, terminal)
    }
}
