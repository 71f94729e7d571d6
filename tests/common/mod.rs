//! Shared test fixtures: mock collaborators and audio builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use chunkscribe::audio::types::TARGET_SAMPLE_RATE;
use chunkscribe::audio::ProcessedAudio;
use chunkscribe::dispatch::{
    DispatchError, ModelSpecificOptions, SpeechToTextClient, TranscriptionOptions,
    TranscriptionResult,
};
use chunkscribe::planner::AudioChunk;

/// Speech-like audio with silences at the given positions.
pub fn audio_with_silences(total_seconds: f64, silence_positions: &[f64]) -> ProcessedAudio {
    let rate = TARGET_SAMPLE_RATE as f64;
    let samples: Vec<f32> = (0..(total_seconds * rate) as usize)
        .map(|i| {
            let t = i as f64 / rate;
            if silence_positions.iter().any(|&p| (t - p).abs() < 0.3) {
                0.0
            } else {
                ((i as f32) * 0.3).sin() * 0.4
            }
        })
        .collect();
    ProcessedAudio::new(samples, TARGET_SAMPLE_RATE)
}

/// Mock remote client returning scripted text per chunk id.
pub struct ScriptedClient {
    pub texts: HashMap<usize, String>,
    pub fail_ids: Vec<usize>,
}

impl ScriptedClient {
    pub fn new(texts: &[(usize, &str)]) -> Arc<Self> {
        Arc::new(Self {
            texts: texts
                .iter()
                .map(|(id, text)| (*id, text.to_string()))
                .collect(),
            fail_ids: Vec::new(),
        })
    }

    pub fn failing(texts: &[(usize, &str)], fail_ids: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            texts: texts
                .iter()
                .map(|(id, text)| (*id, text.to_string()))
                .collect(),
            fail_ids: fail_ids.to_vec(),
        })
    }
}

#[async_trait]
impl SpeechToTextClient for ScriptedClient {
    async fn transcribe(
        &self,
        chunk: &AudioChunk,
        _options: &TranscriptionOptions,
        _model_options: &ModelSpecificOptions,
        token: &CancellationToken,
    ) -> Result<TranscriptionResult, DispatchError> {
        if token.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        if self.fail_ids.contains(&chunk.id) {
            return Err(DispatchError::RemoteCall {
                chunk_id: chunk.id,
                message: "simulated server failure".to_string(),
            });
        }
        let text = self
            .texts
            .get(&chunk.id)
            .cloned()
            .unwrap_or_else(|| format!("チャンク{}の内容です。", chunk.id));
        Ok(TranscriptionResult {
            id: chunk.id,
            text,
            start_time: chunk.start_time,
            end_time: chunk.end_time,
            success: true,
            error: None,
            segments: None,
            confidence: None,
            language: None,
        })
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

/// Build a chunk with the given timing and an empty payload.
pub fn chunk(id: usize, start: f64, end: f64) -> AudioChunk {
    AudioChunk {
        id,
        data: vec![0u8; 44],
        start_time: start,
        end_time: end,
        has_overlap: false,
        overlap_duration: 0.0,
    }
}
