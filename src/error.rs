//! Error types for the selkie pipeline.

/// Top-level error type for the conversation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Audio device or stream error. Fatal to the current voice turn,
    /// never to the session.
    #[error("audio device error: {0}")]
    Device(String),

    /// Speech-to-text transcription error.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Streaming generation error (network or endpoint fault).
    #[error("generation error: {0}")]
    Generation(String),

    /// Text-to-speech synthesis error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Remote memory store error.
    #[error("memory error: {0}")]
    Memory(String),

    /// Model download or loading error.
    #[error("model error: {0}")]
    Model(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Pipeline coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled or timed out. A normal terminal
    /// transition, not a fault.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PipelineError>;
