//! Default configuration constants for parley.
//!
//! Shared by the config layer, the stations and the binary so every entry
//! point agrees on the same audio format and service endpoints.

/// Default inbound audio sample rate in Hz.
///
/// 16kHz is what whisper.cpp expects and what most WebRTC transports deliver
/// after their own resampling.
pub const SAMPLE_RATE: u32 = 16000;

/// Bit depth of every PCM payload exchanged in the pipeline.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Channel count of every PCM payload exchanged in the pipeline.
pub const CHANNELS: u16 = 1;

/// Base URL of the local whisper.cpp inference server.
pub const RECOGNITION_SERVER_URL: &str = "http://127.0.0.1:8178";

/// Language tag sent with every recognition request.
pub const RECOGNITION_LANGUAGE: &str = "en";

/// Client-side timeout for one recognition round trip, in milliseconds.
pub const RECOGNITION_TIMEOUT_MS: u64 = 10_000;

/// Speaker identifier stamped on every transcript.
pub const SPEAKER_ID: &str = "user";

/// Executable used to run Piper voices.
pub const PIPER_BINARY: &str = "piper";

/// Upper bound on one Piper synthesis call, in milliseconds.
pub const SYNTHESIS_TIMEOUT_MS: u64 = 15_000;

/// Voice model file name, resolved under the Piper voices directory.
pub const VOICE_MODEL_FILE: &str = "en_US-amy-medium.onnx";

/// Greeting instruction handed to the responder when a client connects.
pub const GREETING: &str = "The user just connected. Greet them warmly but briefly, one sentence max.";

/// Size of the PCM slices produced when replaying a WAV file (100ms at 16kHz, 16-bit).
pub const FILE_SLICE_MS: u32 = 100;

/// Default location of Piper voices: `~/.local/share/piper/voices/`.
pub fn voices_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_default()
        .join("piper")
        .join("voices")
}
