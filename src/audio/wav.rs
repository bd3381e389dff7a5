use crate::messages::AudioData;
use crate::{CompanionError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use tracing::debug;

/// Encode samples as an in-memory 16-bit WAV file
///
/// # Arguments
/// * `samples` - Audio samples (f32, range -1.0 to 1.0, interleaved)
/// * `sample_rate` - Sample rate in Hz
/// * `channels` - Number of channels
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| CompanionError::AudioProcessingError(format!("Failed to create WAV writer: {}", e)))?;

        for &sample in samples {
            let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| CompanionError::AudioProcessingError(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| CompanionError::AudioProcessingError(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(cursor.into_inner())
}

/// Decode an in-memory WAV file into f32 samples
pub fn decode_wav(bytes: &[u8]) -> Result<AudioData> {
    let mut reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| CompanionError::DecodeError(format!("Invalid WAV data: {}", e)))?;

    let spec = reader.spec();

    debug!(
        "Decoding WAV payload: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    let read_err = |e: hound::Error| CompanionError::DecodeError(format!("Failed to read sample: {}", e));

    let samples: Result<Vec<f32>> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().map(|s| s.map_err(read_err)).collect(),
        SampleFormat::Int => match spec.bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|sample| sample as f32 / i8::MAX as f32).map_err(read_err))
                .collect(),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|sample| sample as f32 / i16::MAX as f32).map_err(read_err))
                .collect(),
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / 8388608.0).map_err(read_err)) // 2^23
                .collect(),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / i32::MAX as f32).map_err(read_err))
                .collect(),
            bits => {
                return Err(CompanionError::DecodeError(format!(
                    "Unsupported bit depth: {}",
                    bits
                )))
            }
        },
    };

    Ok(AudioData::new(samples?, spec.sample_rate, spec.channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_wav_decodes_with_same_shape() {
        let samples: Vec<f32> = (0..1600).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let bytes = encode_wav(&samples, 16000, 1).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");

        let audio = decode_wav(&bytes).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples.len(), samples.len());
        assert!((audio.samples[100] - samples[100]).abs() < 0.001);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = decode_wav(b"definitely not a wav file").unwrap_err();
        assert!(matches!(err, CompanionError::DecodeError(_)));
    }

    #[test]
    fn test_truncated_wav_is_rejected() {
        let bytes = encode_wav(&[0.1; 64], 8000, 1).unwrap();
        assert!(decode_wav(&bytes[..20]).is_err());
    }
}
