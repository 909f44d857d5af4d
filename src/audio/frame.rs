//! Raw PCM chunks exchanged between pipeline stations.

use crate::defaults;
use std::time::Duration;

/// Fixed format of the PCM payloads on one side of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl AudioFormat {
    /// 16-bit mono at the given sample rate.
    pub fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            bits_per_sample: defaults::BITS_PER_SAMPLE,
            channels: defaults::CHANNELS,
        }
    }

    /// Bytes per sample frame (all channels).
    pub fn block_align(&self) -> u32 {
        u32::from(self.channels) * u32::from(self.bits_per_sample) / 8
    }

    /// Bytes of audio per second.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(self.block_align())
    }

    /// Playback duration of `bytes` bytes of PCM in this format.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let byte_rate = self.byte_rate();
        if byte_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / f64::from(byte_rate))
    }

    /// Number of bytes covering `ms` milliseconds, rounded down to whole sample frames.
    pub fn bytes_for_ms(&self, ms: u32) -> usize {
        let frames = u64::from(self.sample_rate) * u64::from(ms) / 1000;
        (frames * u64::from(self.block_align())) as usize
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono16(defaults::SAMPLE_RATE)
    }
}

/// An immutable chunk of raw PCM audio.
///
/// Ownership moves downstream with the chunk; stations that need to keep the
/// payload copy it instead of holding on to the chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pcm: Vec<u8>,
    format: AudioFormat,
    sequence: u64,
}

impl AudioChunk {
    /// Creates a chunk. Prefer [`AudioFramer::frame`], which assigns sequence numbers.
    pub fn new(pcm: Vec<u8>, format: AudioFormat, sequence: u64) -> Self {
        Self {
            pcm,
            format,
            sequence,
        }
    }

    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }

    pub fn into_pcm(self) -> Vec<u8> {
        self.pcm
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    /// Arrival order of this chunk within its framer.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.pcm.len())
    }
}

/// Wraps raw byte buffers of a known format into sequenced [`AudioChunk`]s.
#[derive(Debug, Clone)]
pub struct AudioFramer {
    format: AudioFormat,
    next_sequence: u64,
}

impl AudioFramer {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            next_sequence: 0,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Frames a buffer. Empty buffers are ignored and do not consume a sequence number.
    pub fn frame(&mut self, pcm: Vec<u8>) -> Option<AudioChunk> {
        if pcm.is_empty() {
            return None;
        }
        let chunk = AudioChunk::new(pcm, self.format, self.next_sequence);
        self.next_sequence += 1;
        Some(chunk)
    }
}

/// Serializes i16 samples to little-endian PCM bytes.
pub fn samples_to_pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Parses little-endian PCM bytes into i16 samples. A trailing odd byte is dropped.
pub fn pcm_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
