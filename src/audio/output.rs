use super::buffer::PlaybackRing;
use super::resampler::prepare_for_output;
use super::sink::{AudioSink, PlaybackClip, PlaybackCompletion};
use crate::{CompanionError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

const RING_CAPACITY: usize = 16384;
const FEED_INTERVAL: Duration = Duration::from_millis(5);

/// Hardware sink on the default output device
///
/// The cpal stream lives on its own thread because streams are not `Send`
/// on every platform. Clips are resampled to the device rate and fed through
/// a [`PlaybackRing`] that the device callback drains.
pub struct CpalSink {
    ring: PlaybackRing,
    flush: Arc<AtomicBool>,
    consumed: Arc<AtomicUsize>,
    generation: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
    _shutdown: Sender<()>,
}

impl CpalSink {
    /// Open the default output device
    pub fn new() -> Result<Self> {
        let ring = PlaybackRing::new(RING_CAPACITY);
        let flush = Arc::new(AtomicBool::new(false));
        let consumed = Arc::new(AtomicUsize::new(0));

        let (ready_tx, ready_rx) = bounded::<Result<(u32, u16)>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let cb_ring = ring.clone();
        let cb_flush = Arc::clone(&flush);
        let cb_consumed = Arc::clone(&consumed);

        thread::Builder::new()
            .name("cpal-output".into())
            .spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_output_device() else {
                    let _ = ready_tx.send(Err(CompanionError::AudioDeviceError(
                        "No output device available".into(),
                    )));
                    return;
                };

                info!(
                    "Using output device: {}",
                    device.name().unwrap_or_else(|_| "Unknown".to_string())
                );

                let config: StreamConfig = match device.default_output_config() {
                    Ok(config) => config.into(),
                    Err(e) => {
                        let _ = ready_tx.send(Err(CompanionError::AudioDeviceError(format!(
                            "Failed to get output config: {}",
                            e
                        ))));
                        return;
                    }
                };

                let channels = config.channels as usize;
                let mut scratch: Vec<f32> = Vec::new();

                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if cb_flush.swap(false, Ordering::AcqRel) {
                            cb_ring.clear();
                        }

                        let frames = data.len() / channels;
                        if scratch.len() < frames {
                            scratch.resize(frames, 0.0);
                        }
                        let got = cb_ring.pop_into(&mut scratch[..frames]);

                        for (i, frame) in data.chunks_mut(channels).enumerate() {
                            frame.fill(if i < got { scratch[i] } else { 0.0 });
                        }
                        cb_consumed.fetch_add(got, Ordering::AcqRel);
                    },
                    |err| error!("Audio output stream error: {}", err),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(CompanionError::AudioDeviceError(format!(
                            "Failed to build output stream: {}",
                            e
                        ))));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CompanionError::AudioDeviceError(format!(
                        "Failed to start output stream: {}",
                        e
                    ))));
                    return;
                }

                let _ = ready_tx.send(Ok((config.sample_rate.0, config.channels)));

                // Parked until the sink is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                info!("Stopped audio output");
            })
            .map_err(|e| CompanionError::AudioDeviceError(format!("Failed to spawn output thread: {}", e)))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|e| CompanionError::ChannelError(format!("Output thread exited early: {}", e)))??;

        Ok(Self {
            ring,
            flush,
            consumed,
            generation: Arc::new(AtomicU64::new(0)),
            sample_rate,
            channels,
            _shutdown: shutdown_tx,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl AudioSink for CpalSink {
    fn play(&self, clip: PlaybackClip, completion: PlaybackCompletion) -> Result<()> {
        let ring = self.ring.clone();
        let flush = Arc::clone(&self.flush);
        let consumed = Arc::clone(&self.consumed);
        let generation = Arc::clone(&self.generation);
        let started_in = generation.load(Ordering::SeqCst);
        let output_rate = self.sample_rate;

        thread::Builder::new()
            .name(format!("cpal-feed-{}", clip.index))
            .spawn(move || {
                let samples = match prepare_for_output(&clip.audio, output_rate) {
                    Ok(samples) => samples,
                    Err(e) => {
                        completion.fail(e.to_string());
                        return;
                    }
                };

                // A pending flush still owns whatever sits in the ring
                while flush.load(Ordering::Acquire) {
                    thread::sleep(FEED_INTERVAL);
                }

                let total = samples.len();
                let source_total = clip.cursor.total();
                let start = consumed.load(Ordering::Acquire);
                let mut pushed = 0;

                debug!("Feeding chunk {} ({} device samples)", clip.index, total);

                loop {
                    if generation.load(Ordering::SeqCst) != started_in {
                        completion.abandon();
                        return;
                    }

                    if pushed < total {
                        pushed += ring.push(&samples[pushed..]);
                    }

                    let played = consumed
                        .load(Ordering::Acquire)
                        .saturating_sub(start)
                        .min(total);
                    clip.cursor.set_position(played * source_total / total.max(1));

                    if played >= total {
                        break;
                    }
                    thread::sleep(FEED_INTERVAL);
                }

                completion.finish();
            })
            .map_err(|e| CompanionError::PlaybackError(format!("Failed to spawn feeder: {}", e)))?;

        Ok(())
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.flush.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpal_sink_creation() {
        // No output device in CI is fine
        if let Ok(sink) = CpalSink::new() {
            assert!(sink.sample_rate() > 0);
            assert!(sink.channels() > 0);
        }
    }
}
