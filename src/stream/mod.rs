//! Streaming core: reorder, sequence, play and present one reply at a time

pub mod buffer;
pub mod coordinator;
pub mod presentation;
pub mod sequencer;
pub mod session;

pub use buffer::{ChunkBuffer, PutOutcome};
pub use coordinator::SessionCoordinator;
pub use presentation::{PresentationEvent, PresentationSync, SessionOutcome};
pub use sequencer::{AudioSequencer, PlaybackState, PlaybackUnit, SequencerEvent};
pub use session::{Session, SessionState};
