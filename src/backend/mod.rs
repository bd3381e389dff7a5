//! Simulated companion server for demos and end-to-end runs

pub mod emotion;
pub mod scripted;
pub mod splitter;

pub use emotion::analyze_emotion;
pub use scripted::{synthesize_voice, ScriptFaults, ScriptedBackend};
pub use splitter::TextSplitter;
