//! parley - Real-time speech-turn pipeline
//!
//! Turns a live audio stream into recognized user turns and speaks generated
//! replies back, through an ordered chain of frame-processing stations.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod stt;
pub mod tts;

// Core seams (recognize → respond → synthesize)
pub use pipeline::responder::Responder;
pub use stt::recognizer::Recognizer;
pub use tts::engine::SynthesisEngine;

// Pipeline
pub use pipeline::frame::{Frame, Transcript};
pub use pipeline::runner::{Pipeline, PipelineHandle};
pub use session::{ClientEvent, ConversationSession};

// Error handling
pub use error::{ParleyError, Result};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::{Station, StationContext};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
