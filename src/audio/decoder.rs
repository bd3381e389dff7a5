//! Turns transport audio payloads into PCM for the sinks

use super::wav::decode_wav;
use crate::messages::{AudioData, AudioFormat, AudioPayload};
use crate::{CompanionError, Result};

/// Decode a payload according to its format tag
pub fn decode_payload(payload: &AudioPayload) -> Result<AudioData> {
    if payload.is_empty() {
        return Err(CompanionError::DecodeError("Empty audio payload".into()));
    }

    let audio = match payload.format {
        AudioFormat::Wav => decode_wav(&payload.data)?,
        AudioFormat::Pcm16 {
            sample_rate,
            channels,
        } => decode_pcm16(&payload.data, sample_rate, channels)?,
    };

    if audio.is_empty() {
        return Err(CompanionError::DecodeError("Payload contains no samples".into()));
    }

    Ok(audio)
}

/// Interpret little-endian i16 PCM, normalized to [-1.0, 1.0]
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioData> {
    if sample_rate == 0 || channels == 0 {
        return Err(CompanionError::DecodeError(
            "PCM16 payload needs a sample rate and channel count".into(),
        ));
    }

    if bytes.len() % 2 != 0 {
        return Err(CompanionError::DecodeError(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    Ok(AudioData::new(samples, sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::encode_wav;

    #[test]
    fn test_decode_wav_payload() {
        let bytes = encode_wav(&[0.25; 800], 8000, 1).unwrap();
        let audio = decode_payload(&AudioPayload::wav(bytes)).unwrap();
        assert_eq!(audio.samples.len(), 800);
        assert!((audio.duration_seconds() - 0.1).abs() < 0.001);
    }

    #[test]
    fn test_decode_pcm16_payload() {
        let bytes: Vec<u8> = [0i16, i16::MAX, i16::MIN, 16384]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let payload = AudioPayload::new(
            bytes,
            AudioFormat::Pcm16 {
                sample_rate: 24000,
                channels: 1,
            },
        );

        let audio = decode_payload(&payload).unwrap();
        assert_eq!(audio.samples.len(), 4);
        assert_eq!(audio.samples[0], 0.0);
        assert!(audio.samples[1] > 0.99);
        assert_eq!(audio.samples[2], -1.0);
        assert!((audio.samples[3] - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_odd_pcm_length_fails() {
        assert!(decode_pcm16(&[1, 2, 3], 16000, 1).is_err());
        assert!(decode_pcm16(&[1, 2], 0, 1).is_err());
    }

    #[test]
    fn test_empty_payload_fails() {
        assert!(decode_payload(&AudioPayload::wav(Vec::new())).is_err());
    }

    #[test]
    fn test_wav_header_without_samples_fails() {
        let bytes = encode_wav(&[], 16000, 1).unwrap();
        let err = decode_payload(&AudioPayload::wav(bytes)).unwrap_err();
        assert!(matches!(err, CompanionError::DecodeError(_)));
    }
}
