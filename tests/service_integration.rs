//! Controller end-to-end over mock collaborators.

mod common;

use std::sync::Arc;

use chunkscribe::audio::{wav, AudioInput, WavOnlyEngine};
use chunkscribe::config::Language;
use chunkscribe::service::{ResourceManager, TranscriptionRequest, TranscriptionService};
use chunkscribe::{DictionaryCorrector, ModelId};

use common::{audio_with_silences, ScriptedClient};

fn wav_input(seconds: f64) -> AudioInput {
    let audio = audio_with_silences(seconds, &[seconds / 2.0]);
    AudioInput::new(wav::encode_wav(&audio.samples, audio.sample_rate), "input.wav")
}

fn service(client: Arc<ScriptedClient>) -> TranscriptionService {
    TranscriptionService::new(Arc::new(WavOnlyEngine), client, ResourceManager::new())
}

#[tokio::test]
async fn short_audio_single_chunk_round_trip() {
    let client = ScriptedClient::new(&[(0, "短い音声の文字起こし結果です。")]);
    let service = service(client);

    let request = TranscriptionRequest::new(wav_input(30.0), ModelId::Whisper, Language::Japanese);
    let output = service.transcribe(request).await.unwrap();

    assert_eq!(output.text, "短い音声の文字起こし結果です。");
    assert_eq!(output.model_used, ModelId::Whisper);
    assert!(!output.partial);
}

#[tokio::test]
async fn invalid_extension_rejected_before_any_remote_work() {
    let client = ScriptedClient::new(&[]);
    let service = service(client);

    let request = TranscriptionRequest::new(
        AudioInput::new(vec![0u8; 128], "notes.txt"),
        ModelId::Whisper,
        Language::Japanese,
    );

    assert!(service.transcribe(request).await.is_err());
}

#[tokio::test]
async fn dictionary_correction_is_last() {
    struct UpperDict;
    #[async_trait::async_trait]
    impl DictionaryCorrector for UpperDict {
        async fn correct(&self, text: &str, _language: Language) -> String {
            text.replace("えーあい", "AI")
        }
    }

    let client = ScriptedClient::new(&[(0, "えーあいの話をしました。")]);
    let service = service(client).with_dictionary(Arc::new(UpperDict));

    let request = TranscriptionRequest::new(wav_input(20.0), ModelId::Gpt4oMini, Language::Japanese);
    let output = service.transcribe(request).await.unwrap();

    assert_eq!(output.text, "AIの話をしました。");
}

#[tokio::test]
async fn cleaning_runs_after_merge() {
    let noisy = format!("会議の本文です。{}", "ご視聴ありがとうございました。".repeat(4));
    let client = ScriptedClient::new(&[(0, noisy.as_str())]);
    let service = service(client);

    let request = TranscriptionRequest::new(wav_input(25.0), ModelId::Whisper, Language::Japanese);
    let output = service.transcribe(request).await.unwrap();

    assert!(output.text.starts_with("会議の本文です。"));
    assert_eq!(output.text.matches("ご視聴ありがとうございました。").count(), 1);
}

#[tokio::test]
async fn time_range_narrows_audio() {
    let client = ScriptedClient::new(&[(0, "範囲内の結果です。")]);
    let service = service(client);

    let mut request =
        TranscriptionRequest::new(wav_input(60.0), ModelId::Whisper, Language::Japanese);
    request.start_time = Some(10.0);
    request.end_time = Some(20.0);

    let output = service.transcribe(request).await.unwrap();
    assert_eq!(output.text, "範囲内の結果です。");
}
