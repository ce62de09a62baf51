//! Audio layer error types

use thiserror::Error;

use crate::model::ModelError;

/// Errors that can occur during audio operations
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio devices found")]
    NoDevices,

    /// No device could satisfy the open request
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Named device not present on any host
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Device disconnected mid-stream; the engine is forced closed
    #[error("Audio device lost")]
    DeviceLost,

    /// Rejected stream configuration
    #[error("Invalid stream config: {0}")]
    InvalidConfig(String),

    /// Operation not valid in the engine's current state
    #[error("Invalid engine state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Failed to query device capabilities
    #[error("Failed to query device config: {0}")]
    ConfigQuery(String),

    /// Device offers no f32 output configuration
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlay(String),

    /// Control command could not be queued to the callback
    #[error("Engine command queue is full")]
    CommandBacklog,

    /// Synthesis model failure surfaced at source start
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
