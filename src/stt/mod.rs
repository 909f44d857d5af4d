//! Speech recognition backends.

pub mod recognizer;
pub mod whisper_server;

pub use recognizer::{MockRecognizer, Recognizer};
pub use whisper_server::{WhisperServerConfig, WhisperServerRecognizer};
