pub mod audio;
pub mod backend;
pub mod integration;
pub mod messages;
pub mod stream;
pub mod transport;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CompanionError {
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Playback error: {0}")]
    PlaybackError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<std::io::Error> for CompanionError {
    fn from(e: std::io::Error) -> Self {
        CompanionError::IOError(e.to_string())
    }
}

impl CompanionError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Hardware/device errors may require user intervention
            CompanionError::AudioDeviceError(_) => false,
            // A single chunk is skipped, the turn continues
            CompanionError::DecodeError(_) => true,
            CompanionError::PlaybackError(_) => true,
            // Ends the current turn, the next one may succeed
            CompanionError::TransportError(_) => true,
            CompanionError::ProtocolError(_) => true,
            CompanionError::IOError(_) => false,
            CompanionError::AudioProcessingError(_) => true,
            CompanionError::ConfigError(_) => false,
            CompanionError::ChannelError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            CompanionError::AudioDeviceError(_) => {
                "Audio device error. Please check your speakers.".to_string()
            }
            CompanionError::DecodeError(_) | CompanionError::PlaybackError(_) => {
                "Part of the reply could not be played.".to_string()
            }
            CompanionError::TransportError(_) => {
                "Connection to the assistant failed. Please try again.".to_string()
            }
            CompanionError::ProtocolError(_) => {
                "Received an unexpected message from the assistant.".to_string()
            }
            CompanionError::IOError(_) => "File system error occurred.".to_string(),
            CompanionError::AudioProcessingError(_) => {
                "Audio processing failed. Please try again.".to_string()
            }
            CompanionError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            CompanionError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CompanionError>;
