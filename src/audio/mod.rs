//! Audio representation: sequenced PCM chunks and the WAV container.

pub mod frame;
pub mod wav;

pub use frame::{AudioChunk, AudioFormat, AudioFramer};
