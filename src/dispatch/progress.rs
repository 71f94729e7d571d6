//! Progress event stream
//!
//! Strategies report progress as events on a channel; the consumer decides
//! whether and how to render them. The reporter clamps percentages and
//! enforces monotonicity so a late batch can never walk the bar backwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A single progress update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionProgress {
    /// 1-based index of the chunk (or first chunk of the batch) being worked.
    pub current_chunk: usize,
    pub total_chunks: usize,
    /// Overall progress in [0, 100].
    pub percentage: f64,
    /// Short operation description for display.
    pub operation: String,
    pub cancellable: bool,
}

/// Clamping, monotonic sender for progress events.
#[derive(Clone)]
pub struct ProgressReporter {
    sender: mpsc::UnboundedSender<TranscriptionProgress>,
    // Packed (current_chunk, percentage*100) high-water marks
    last_chunk: Arc<AtomicU64>,
    last_percent_hundredths: Arc<AtomicU64>,
}

impl ProgressReporter {
    /// Create a reporter and the receiving end of its event stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TranscriptionProgress>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                last_chunk: Arc::new(AtomicU64::new(0)),
                last_percent_hundredths: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Emit an event. Percentage is clamped to [0, 100] and both the chunk
    /// index and percentage never move backwards.
    pub fn report(&self, mut progress: TranscriptionProgress) {
        progress.percentage = progress.percentage.clamp(0.0, 100.0);

        let chunk_floor = self.last_chunk.fetch_max(progress.current_chunk as u64, Ordering::SeqCst);
        progress.current_chunk = progress.current_chunk.max(chunk_floor as usize);

        let hundredths = (progress.percentage * 100.0) as u64;
        let percent_floor = self
            .last_percent_hundredths
            .fetch_max(hundredths, Ordering::SeqCst);
        progress.percentage = progress.percentage.max(percent_floor as f64 / 100.0);

        // Receiver may be gone (consumer stopped rendering); dropping events
        // is fine.
        let _ = self.sender.send(progress);
    }
}
