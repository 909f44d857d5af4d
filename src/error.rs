//! Error types for parley.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParleyError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio errors
    #[error("Unsupported audio format: {message}")]
    AudioFormat { message: String },

    #[error("Failed to decode WAV data: {message}")]
    WavDecode { message: String },

    // Recognition errors
    #[error("Recognition timed out after {timeout_ms}ms")]
    RecognitionTimeout { timeout_ms: u64 },

    #[error("Recognition server unreachable: {message}")]
    RecognitionConnection { message: String },

    #[error("Recognition server returned {status}: {body}")]
    RecognitionStatus { status: u16, body: String },

    #[error("Malformed recognition response: {message}")]
    RecognitionResponse { message: String },

    #[error("Recognizer has been closed")]
    RecognizerClosed,

    // Synthesis errors
    #[error("Voice model not found at {path}")]
    SynthesisModelNotFound { path: String },

    #[error("Invalid voice configuration: {message}")]
    SynthesisConfig { message: String },

    #[error("Synthesis failed: {message}")]
    SynthesisEngine { message: String },

    // Pipeline errors
    #[error("Pipeline is no longer running")]
    PipelineClosed,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl ParleyError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ParleyError::ConfigFileNotFound { .. }
            | ParleyError::ConfigInvalidValue { .. }
            | ParleyError::Config(_) => "config",
            ParleyError::AudioFormat { .. } | ParleyError::WavDecode { .. } => "audio",
            ParleyError::RecognitionTimeout { .. } => "timeout",
            ParleyError::RecognitionConnection { .. } => "connection",
            ParleyError::RecognitionStatus { .. } => "status",
            ParleyError::RecognitionResponse { .. } => "response",
            ParleyError::RecognizerClosed => "closed",
            ParleyError::SynthesisModelNotFound { .. }
            | ParleyError::SynthesisConfig { .. }
            | ParleyError::SynthesisEngine { .. } => "synthesis",
            ParleyError::PipelineClosed => "pipeline",
            ParleyError::Io(_) => "io",
            ParleyError::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
