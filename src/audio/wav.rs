//! Canonical WAV encoding for chunk payloads
//!
//! Every chunk sent to a remote model is packaged as canonical PCM/WAVE:
//! a 44-byte header followed by signed 16-bit little-endian mono samples.
//! The layout is fixed by the remote APIs, so the encoder writes it byte by
//! byte; decoding (tests, round-trip verification) goes through `hound`.

use std::io::Cursor;

use super::types::AudioError;

const HEADER_LEN: u32 = 44;
const BITS_PER_SAMPLE: u16 = 16;
const CHANNELS: u16 = 1;

/// Encode mono PCM float samples as a canonical 16-bit WAV buffer.
///
/// Samples are clamped to [-1, 1] before quantization.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * CHANNELS as u32 * (BITS_PER_SAMPLE as u32 / 8);
    let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);

    let mut out = Vec::with_capacity(HEADER_LEN as usize + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(HEADER_LEN - 8 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&CHANNELS.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let quantized = (clamped * i16::MAX as f32) as i16;
        out.extend_from_slice(&quantized.to_le_bytes());
    }

    out
}

/// Decode a 16-bit mono WAV buffer back into float samples.
pub fn decode_wav(data: &[u8]) -> Result<(Vec<f32>, u32), AudioError> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| AudioError::DecodeFailed {
            message: e.to_string(),
        })?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.bits_per_sample != 16 {
        return Err(AudioError::DecodeFailed {
            message: format!(
                "expected 16-bit mono, got {}-bit {} channel(s)",
                spec.bits_per_sample, spec.channels
            ),
        });
    }

    let samples = reader
        .samples::<i16>()
        .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
        .collect::<Result<Vec<f32>, _>>()
        .map_err(|e| AudioError::DecodeFailed {
            message: e.to_string(),
        })?;

    Ok((samples, spec.sample_rate))
}
