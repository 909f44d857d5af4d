//! Speech synthesis engines.

pub mod engine;
pub mod piper;

pub use engine::{MockEngine, PcmChunks, SynthesisEngine};
pub use piper::{PiperConfig, PiperVoice};
