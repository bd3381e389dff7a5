pub mod config;
pub mod orchestrator;

pub use config::{
    BackendConfig, CancelTranscriptPolicy, CompanionConfig, PlaybackConfig, PresentationConfig,
    StreamConfig,
};
pub use orchestrator::{
    sink_from_config, CompanionHandle, Orchestrator, OrchestratorBuilder, OrchestratorCommand,
};
