//! Audio side of playback: payload decoding, sinks and level metering

pub mod buffer;
pub mod clock;
pub mod decoder;
pub mod meter;
#[cfg(feature = "audio-io")]
pub mod output;
pub mod resampler;
pub mod sink;
pub mod wav;

pub use buffer::PlaybackRing;
pub use clock::ClockSink;
pub use decoder::decode_payload;
pub use meter::{AmplitudeMeter, PlaybackCursor, PlaybackMonitor};
#[cfg(feature = "audio-io")]
pub use output::CpalSink;
pub use resampler::{prepare_for_output, ClipResampler};
pub use sink::{AudioSink, PlaybackClip, PlaybackCompletion, PlaybackOutcome, PlaybackReport};
pub use wav::{decode_wav, encode_wav};
