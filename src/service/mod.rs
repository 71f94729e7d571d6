//! Transcription service controller
//!
//! Per-request orchestration: validate input, decode and preprocess audio,
//! plan chunks, dispatch to the remote model, merge, clean, and apply
//! dictionary correction. Collaborators (audio engine, VAD, remote client,
//! dictionary) are constructor-injected capabilities; the request owns all
//! of its state and the resource registry releases it in reverse order.

pub mod resource;

pub use resource::ResourceManager;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::{
    AudioEngine, AudioError, AudioInput, ProcessedAudio, RmsSilenceOracle, SilenceOracle,
    TargetFormat, VadPreprocessor,
};
use crate::cleaning::{CleaningError, CleaningPipeline};
use crate::config::{CleaningStrategy, ConfigError, Language, ModelConfig, ModelId};
use crate::dispatch::{
    self, DispatchError, ProgressReporter, SpeechToTextClient, TranscriptionOptions,
};
use crate::planner::{ChunkPlanner, PlannerError};

/// Input size ceiling before any decoding happens, MB. Chunking handles the
/// per-request upload limits; this only rejects absurd files early.
const MAX_INPUT_MB: f64 = 500.0;

/// Pluggable last-step correction against a user dictionary.
#[async_trait]
pub trait DictionaryCorrector: Send + Sync {
    async fn correct(&self, text: &str, language: Language) -> String;
}

/// One transcription request.
pub struct TranscriptionRequest {
    pub input: AudioInput,
    pub model: ModelId,
    pub language: Language,
    /// Request segment timestamps and timestamp-formatted output.
    pub timestamps: bool,
    /// Optional time range, seconds. Ignored when the VAD preprocessor
    /// already narrowed the audio.
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub cancellation: CancellationToken,
    pub progress: Option<ProgressReporter>,
}

impl TranscriptionRequest {
    pub fn new(input: AudioInput, model: ModelId, language: Language) -> Self {
        Self {
            input,
            model,
            language,
            timestamps: false,
            start_time: None,
            end_time: None,
            cancellation: CancellationToken::new(),
            progress: None,
        }
    }
}

/// Final result returned to the host.
#[derive(Debug, Clone)]
pub struct TranscriptionOutput {
    pub text: String,
    pub model_used: ModelId,
    pub partial: bool,
    pub error: Option<String>,
}

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Input validation failed: {0}")]
    Validation(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chunk planning failed: {0}")]
    Planner(#[from] PlannerError),

    #[error("Transcription failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Cleaning pipeline setup failed: {0}")]
    Cleaning(#[from] CleaningError),
}

/// The transcription pipeline engine.
pub struct TranscriptionService {
    audio_engine: Arc<dyn AudioEngine>,
    vad: Option<Arc<dyn VadPreprocessor>>,
    client: Arc<dyn SpeechToTextClient>,
    dictionary: Option<Arc<dyn DictionaryCorrector>>,
    oracle: Arc<dyn SilenceOracle>,
    resources: Arc<ResourceManager>,
}

impl TranscriptionService {
    pub fn new(
        audio_engine: Arc<dyn AudioEngine>,
        client: Arc<dyn SpeechToTextClient>,
        resources: Arc<ResourceManager>,
    ) -> Self {
        Self {
            audio_engine,
            vad: None,
            client,
            dictionary: None,
            oracle: Arc::new(RmsSilenceOracle::default()),
            resources,
        }
    }

    pub fn with_vad(mut self, vad: Arc<dyn VadPreprocessor>) -> Self {
        self.vad = Some(vad);
        self
    }

    pub fn with_dictionary(mut self, dictionary: Arc<dyn DictionaryCorrector>) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    pub fn with_silence_oracle(mut self, oracle: Arc<dyn SilenceOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Validate that every model's cleaning patterns compile. Hosts call
    /// this once at startup so config mistakes fail fast.
    pub fn validate_startup() -> Result<(), ConfigError> {
        for model in ModelId::ALL {
            CleaningStrategy::for_model(model).validate_patterns()?;
        }
        Ok(())
    }

    /// Run one request end to end.
    pub async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionOutput, ServiceError> {
        let request_id = Uuid::new_v4();
        self.resources
            .register(request_id, request.cancellation.clone())
            .await;

        let outcome = self.transcribe_inner(&request).await;
        self.resources.release(request_id).await;
        outcome
    }

    async fn transcribe_inner(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionOutput, ServiceError> {
        let config = ModelConfig::for_model(request.model);

        request.input.validate(MAX_INPUT_MB)?;
        let validation = self.audio_engine.validate(&request.input).await?;
        if !validation.is_valid {
            return Err(ServiceError::Validation(AudioError::ProcessingFailed {
                message: validation.issues.join("; "),
            }));
        }

        let (audio, range_applied_by_vad) = self.prepare_audio(request).await?;
        let audio = if range_applied_by_vad {
            audio
        } else {
            apply_time_range(audio, request.start_time, request.end_time)
        };

        let duration = audio.duration_seconds();
        info!(
            "Transcribing {:.1}s of audio with {}",
            duration,
            request.model.as_str()
        );

        let estimated_mb = audio.estimated_wav_mb(duration);
        let planner = ChunkPlanner::new(config, Box::new(OracleRef(self.oracle.clone())));
        let planned = planner.plan(&audio, estimated_mb)?;

        let options = TranscriptionOptions {
            language: request.language,
            timestamps: request.timestamps || request.model.supports_timestamps(),
            cancellation: request.cancellation.clone(),
            progress: request.progress.clone(),
        };

        let outcome = dispatch::transcribe_chunks(
            self.client.clone(),
            request.model,
            &planned.chunks,
            &options,
        )
        .await?;

        let cleaned = self
            .clean_with_fallback(&outcome.text, request, duration)
            .await?;

        let text = match &self.dictionary {
            Some(dictionary) => dictionary.correct(&cleaned, request.language).await,
            None => cleaned,
        };

        Ok(TranscriptionOutput {
            text,
            model_used: request.model,
            partial: outcome.partial,
            error: outcome.error,
        })
    }

    /// Decode through the VAD preprocessor when present, falling back to
    /// the audio engine. Returns the audio and whether the time range was
    /// already applied upstream.
    async fn prepare_audio(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<(ProcessedAudio, bool), ServiceError> {
        if let Some(vad) = &self.vad {
            match self.vad_preprocess(vad, request).await {
                Ok(audio) => return Ok((audio, true)),
                Err(error) => {
                    warn!("VAD preprocessing failed, using audio engine: {}", error);
                }
            }
        }

        let decoded = self.audio_engine.decode(&request.input).await?;
        let converted = self
            .audio_engine
            .convert_to_target_format(decoded, TargetFormat::default())
            .await?;
        Ok((converted, false))
    }

    async fn vad_preprocess(
        &self,
        vad: &Arc<dyn VadPreprocessor>,
        request: &TranscriptionRequest,
    ) -> Result<ProcessedAudio, AudioError> {
        vad.initialize().await?;
        let audio = vad
            .process_file(&request.input, request.start_time, request.end_time)
            .await?;
        if audio.samples.is_empty() {
            return Err(AudioError::ProcessingFailed {
                message: "VAD produced empty audio".to_string(),
            });
        }
        Ok(audio)
    }

    /// Run the cleaning pipeline; when the post-pipeline gates trip, fall
    /// back to a validation-only pass over the merged text so aggressive
    /// dedup cannot erase a long recording.
    async fn clean_with_fallback(
        &self,
        merged: &str,
        request: &TranscriptionRequest,
        audio_duration: f64,
    ) -> Result<String, ServiceError> {
        let strategy = CleaningStrategy::for_model(request.model);
        let pipeline = CleaningPipeline::for_model(request.model)?;
        let result = pipeline.run(merged, request.language, Some(audio_duration));

        let fallback = &strategy.pipeline_fallback;
        let merged_length = merged.chars().count();
        let final_length = result.final_text.chars().count();
        let content_ratio = if merged_length > 0 {
            final_length as f64 / merged_length as f64
        } else {
            1.0
        };

        let gates_tripped = content_ratio < fallback.min_expected_content_ratio
            || (final_length < fallback.min_final_text_length
                && audio_duration >= fallback.min_audio_duration_seconds);

        if gates_tripped {
            warn!(
                "Cleaning left {:.0}% / {} chars for {:.0}s audio, re-running in safe mode",
                content_ratio * 100.0,
                final_length,
                audio_duration
            );
            let mut safe = CleaningPipeline::standard(request.model);
            safe.push(Box::new(crate::cleaning::JapaneseTextValidator::new(
                &strategy.validation,
            )?));
            let safe_result = safe.run(merged, request.language, Some(audio_duration));
            return Ok(safe_result.final_text);
        }

        Ok(result.final_text)
    }
}

/// Adapter so the planner's boxed oracle can borrow the service's shared
/// oracle.
struct OracleRef(Arc<dyn SilenceOracle>);

impl SilenceOracle for OracleRef {
    fn detect_boundaries(&self, audio: &ProcessedAudio) -> Vec<f64> {
        self.0.detect_boundaries(audio)
    }
}

fn apply_time_range(
    audio: ProcessedAudio,
    start_time: Option<f64>,
    end_time: Option<f64>,
) -> ProcessedAudio {
    if start_time.is_none() && end_time.is_none() {
        return audio;
    }
    let rate = audio.sample_rate as f64;
    let from = (start_time.unwrap_or(0.0).max(0.0) * rate) as usize;
    let to = end_time
        .map(|t| (t * rate) as usize)
        .unwrap_or(audio.samples.len())
        .min(audio.samples.len());
    if from >= to {
        return ProcessedAudio::new(Vec::new(), audio.sample_rate);
    }
    ProcessedAudio::new(audio.samples[from..to].to_vec(), audio.sample_rate)
}
