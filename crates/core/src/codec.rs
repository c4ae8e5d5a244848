//! Audio Codec Bridge
//!
//! Converts between the normalized float samples delivered by capture devices
//! and the PCM16 little-endian frames carried on the relay, and wraps inbound
//! PCM16 in a WAV container so a playback device can consume it as-is.

use base64::Engine;
use std::io::Cursor;

/// Sample rate of every frame on the relay, in both directions.
pub const RELAY_SAMPLE_RATE: u32 = 16_000;
pub const RELAY_CHANNELS: u16 = 1;
pub const RELAY_BITS_PER_SAMPLE: u16 = 16;
/// Samples per outbound frame.
pub const DEFAULT_FRAME_SIZE: usize = 4096;
/// Multiplier applied to the frame RMS before clamping to 1.0.
pub const VOLUME_GAIN: f32 = 5.0;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("PCM16 payload has an odd byte length ({0})")]
    OddLength(usize),
    #[error("WAV container error: {0}")]
    Wav(#[from] hound::Error),
}

/// Quantizes a normalized sample to PCM16.
///
/// Negative values use the full negative range (x 32768), non-negative values
/// scale by 32767. Out-of-range input is clamped first; NaN maps to silence.
pub fn quantize(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

/// Encodes float samples into PCM16 little-endian bytes (`2 * len` bytes).
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| quantize(sample).to_le_bytes())
        .collect()
}

/// Encodes one outbound frame into the base64 text sent in `user_audio_chunk`.
pub fn encode_frame(samples: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(encode_pcm16(samples))
}

/// Decodes a base64 PCM16 payload into raw little-endian bytes.
pub fn decode_pcm16(base64_fragment: &str) -> Result<Vec<u8>, CodecError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(base64_fragment)?;
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddLength(bytes.len()));
    }
    Ok(bytes)
}

/// Interprets little-endian byte pairs as PCM16 samples.
pub fn pcm16_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Wraps raw PCM16 mono 16 kHz bytes in a WAV container.
pub fn wrap_wav(pcm: &[u8]) -> Result<Vec<u8>, CodecError> {
    if pcm.len() % 2 != 0 {
        return Err(CodecError::OddLength(pcm.len()));
    }
    let spec = hound::WavSpec {
        channels: RELAY_CHANNELS,
        sample_rate: RELAY_SAMPLE_RATE,
        bits_per_sample: RELAY_BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };
    let mut wav_cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    {
        let mut writer = hound::WavWriter::new(&mut wav_cursor, spec)?;
        for sample in pcm16_samples(pcm) {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(wav_cursor.into_inner())
}

/// Decodes an inbound `audio_base_64` payload into a playable WAV clip.
pub fn decode_chunk(base64_fragment: &str) -> Result<Vec<u8>, CodecError> {
    wrap_wav(&decode_pcm16(base64_fragment)?)
}

/// Reads a WAV clip back into its spec and PCM16 samples.
pub fn read_wav(clip: &[u8]) -> Result<(hound::WavSpec, Vec<i16>), CodecError> {
    let reader = hound::WavReader::new(Cursor::new(clip))?;
    let spec = reader.spec();
    let samples = reader.into_samples::<i16>().collect::<Result<Vec<_>, _>>()?;
    Ok((spec, samples))
}

/// Root-mean-square amplitude of a frame. Empty frames are silent.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Normalized [0, 1] intensity for UI metering. Not part of the wire contract.
pub fn volume_level(samples: &[f32]) -> f32 {
    (rms(samples) * VOLUME_GAIN).clamp(0.0, 1.0)
}
