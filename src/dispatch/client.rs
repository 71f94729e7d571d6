//! Remote speech-to-text client
//!
//! Trait seam plus an HTTP implementation speaking the OpenAI-style
//! `audio/transcriptions` endpoint: multipart WAV upload, JSON envelope
//! back. Segment times come back chunk-relative and are re-offset to
//! absolute audio time here, so everything downstream works in one
//! timeline.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::planner::AudioChunk;

use super::types::{
    DispatchError, ModelSpecificOptions, TranscriptionOptions, TranscriptionResult,
    TranscriptionSegment, WordTimestamp,
};

/// Remote transcription capability.
#[async_trait]
pub trait SpeechToTextClient: Send + Sync {
    async fn transcribe(
        &self,
        chunk: &AudioChunk,
        options: &TranscriptionOptions,
        model_options: &ModelSpecificOptions,
        token: &CancellationToken,
    ) -> Result<TranscriptionResult, DispatchError>;

    async fn test_connection(&self) -> bool;
}

/// Response envelope for `verbose_json` and plain `json` formats.
#[derive(Debug, Deserialize)]
struct TranscriptionEnvelope {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Option<Vec<SegmentEnvelope>>,
}

#[derive(Debug, Deserialize)]
struct SegmentEnvelope {
    text: String,
    start: f64,
    end: f64,
    #[serde(default)]
    words: Option<Vec<WordEnvelope>>,
}

#[derive(Debug, Deserialize)]
struct WordEnvelope {
    word: String,
    start: f64,
    end: f64,
}

/// HTTP client for OpenAI-compatible transcription endpoints.
pub struct HttpSpeechClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    config: &'static ModelConfig,
}

impl HttpSpeechClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, config: &'static ModelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'))
    }

    fn build_form(
        &self,
        chunk: &AudioChunk,
        options: &TranscriptionOptions,
        model_options: &ModelSpecificOptions,
    ) -> reqwest::multipart::Form {
        let file = reqwest::multipart::Part::bytes(chunk.data.clone())
            .file_name(format!("chunk-{}.wav", chunk.id))
            .mime_str("audio/wav")
            .expect("static mime type");

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.config.model.as_str().to_string())
            .text(
                "response_format",
                if options.timestamps { "verbose_json" } else { "json" },
            );

        if !matches!(options.language, crate::config::Language::Auto) {
            let tag = match options.language {
                crate::config::Language::Japanese => "ja",
                crate::config::Language::English => "en",
                crate::config::Language::Chinese => "zh",
                crate::config::Language::Korean => "ko",
                crate::config::Language::Auto => unreachable!(),
            };
            form = form.text("language", tag);
        }
        if options.timestamps {
            form = form.text("timestamp_granularities[]", "segment");
        }
        if let Some(context) = &model_options.previous_context {
            form = form.text("prompt", context.clone());
        }
        if let Some(temperature) = model_options.temperature {
            form = form.text("temperature", temperature.to_string());
        }

        form
    }

    /// Map an envelope into a result, re-offsetting segment times by the
    /// chunk start.
    fn normalize(
        chunk: &AudioChunk,
        envelope: TranscriptionEnvelope,
    ) -> TranscriptionResult {
        let segments = envelope.segments.map(|segments| {
            segments
                .into_iter()
                .map(|segment| TranscriptionSegment {
                    text: segment.text,
                    start: segment.start + chunk.start_time,
                    end: segment.end + chunk.start_time,
                    words: segment.words.map(|words| {
                        words
                            .into_iter()
                            .map(|word| WordTimestamp {
                                word: word.word,
                                start: word.start + chunk.start_time,
                                end: word.end + chunk.start_time,
                            })
                            .collect()
                    }),
                })
                .collect()
        });

        TranscriptionResult {
            id: chunk.id,
            text: envelope.text,
            start_time: chunk.start_time,
            end_time: chunk.end_time,
            success: true,
            error: None,
            segments,
            confidence: None,
            language: envelope.language,
        }
    }

    async fn send(
        &self,
        chunk: &AudioChunk,
        options: &TranscriptionOptions,
        model_options: &ModelSpecificOptions,
    ) -> Result<TranscriptionResult, DispatchError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(self.build_form(chunk, options, model_options))
            .send()
            .await
            .map_err(|e| DispatchError::RemoteCall {
                chunk_id: chunk.id,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Chunk {} request failed with {}: {}", chunk.id, status, body);
            return Err(DispatchError::RemoteCall {
                chunk_id: chunk.id,
                message: format!("HTTP {status}: {body}"),
            });
        }

        let envelope: TranscriptionEnvelope =
            response.json().await.map_err(|e| DispatchError::RemoteCall {
                chunk_id: chunk.id,
                message: format!("invalid response body: {e}"),
            })?;

        debug!(
            "Chunk {} transcribed: {} chars",
            chunk.id,
            envelope.text.len()
        );
        Ok(Self::normalize(chunk, envelope))
    }
}

#[async_trait]
impl SpeechToTextClient for HttpSpeechClient {
    async fn transcribe(
        &self,
        chunk: &AudioChunk,
        options: &TranscriptionOptions,
        model_options: &ModelSpecificOptions,
        token: &CancellationToken,
    ) -> Result<TranscriptionResult, DispatchError> {
        let timeout = std::time::Duration::from_secs(self.config.request_timeout_seconds);

        tokio::select! {
            _ = token.cancelled() => Err(DispatchError::Cancelled),
            outcome = tokio::time::timeout(timeout, self.send(chunk, options, model_options)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError::Timeout {
                        chunk_id: chunk.id,
                        seconds: self.config.request_timeout_seconds,
                    }),
                }
            }
        }
    }

    async fn test_connection(&self) -> bool {
        self.http
            .get(format!("{}/models", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_at(start: f64) -> AudioChunk {
        AudioChunk {
            id: 1,
            data: vec![0u8; 44],
            start_time: start,
            end_time: start + 10.0,
            has_overlap: false,
            overlap_duration: 0.0,
        }
    }

    #[test]
    fn test_segments_reoffset_by_chunk_start() {
        let envelope = TranscriptionEnvelope {
            text: "hello".to_string(),
            language: Some("en".to_string()),
            segments: Some(vec![SegmentEnvelope {
                text: "hello".to_string(),
                start: 1.0,
                end: 2.5,
                words: Some(vec![WordEnvelope {
                    word: "hello".to_string(),
                    start: 1.0,
                    end: 2.5,
                }]),
            }]),
        };

        let result = HttpSpeechClient::normalize(&chunk_at(30.0), envelope);
        let segments = result.segments.unwrap();
        assert_eq!(segments[0].start, 31.0);
        assert_eq!(segments[0].end, 32.5);
        assert_eq!(segments[0].words.as_ref().unwrap()[0].start, 31.0);
        assert!(result.success);
    }

    #[test]
    fn test_plain_envelope_has_no_segments() {
        let envelope: TranscriptionEnvelope =
            serde_json::from_str(r#"{"text":"こんにちは"}"#).unwrap();
        let result = HttpSpeechClient::normalize(&chunk_at(0.0), envelope);
        assert_eq!(result.text, "こんにちは");
        assert!(result.segments.is_none());
    }
}
