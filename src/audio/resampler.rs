//! Rate conversion of decoded clips to the output device's format

use crate::messages::AudioData;
use crate::{CompanionError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

const CHUNK_FRAMES: usize = 1024;

/// Mono sinc resampler for whole clips
pub struct ClipResampler {
    resampler: SincFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
}

impl ClipResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(CompanionError::ConfigError(
                "Sample rates must be greater than 0".into(),
            ));
        }

        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            params,
            CHUNK_FRAMES,
            1,
        )
        .map_err(|e| CompanionError::AudioProcessingError(format!("Failed to create resampler: {}", e)))?;

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
        })
    }

    /// Convert a whole mono clip. The tail is zero-padded to a full chunk and
    /// trimmed back to the expected length afterwards.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let ratio = self.output_rate as f64 / self.input_rate as f64;
        let expected = (input.len() as f64 * ratio).ceil() as usize;
        let mut output = Vec::with_capacity(expected + CHUNK_FRAMES);

        for block in input.chunks(CHUNK_FRAMES) {
            let mut frame = block.to_vec();
            frame.resize(CHUNK_FRAMES, 0.0);
            let planar = vec![frame];

            let processed = self
                .resampler
                .process(&planar, None)
                .map_err(|e| CompanionError::AudioProcessingError(format!("Resampling failed: {}", e)))?;
            output.extend_from_slice(&processed[0]);
        }

        output.truncate(expected);
        Ok(output)
    }
}

/// Average interleaved channels down to one
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Mono samples of `audio` at `output_rate`, ready for a device ring
pub fn prepare_for_output(audio: &AudioData, output_rate: u32) -> Result<Vec<f32>> {
    let mono = downmix_to_mono(&audio.samples, audio.channels);
    if audio.sample_rate == output_rate {
        return Ok(mono);
    }

    debug!(
        "Resampling clip {} Hz -> {} Hz ({} frames)",
        audio.sample_rate,
        output_rate,
        mono.len()
    );

    ClipResampler::new(audio.sample_rate, output_rate)?.process(&mono)
}
