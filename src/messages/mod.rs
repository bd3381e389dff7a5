pub mod storage;
pub mod types;

pub use storage::{TurnSink, TurnStore};
pub use types::{AudioData, AudioFormat, AudioPayload, Chunk, Emotion, Role, SessionToken, Turn};
