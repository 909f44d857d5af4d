//! Latency measurement for recognition round trips.

use std::time::Duration;

/// Timing information for a single recognized utterance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognitionTiming {
    /// Duration of the buffered audio.
    pub audio_duration: Duration,
    /// Time spent wrapping the audio in a WAV container.
    pub encode: Duration,
    /// Time spent waiting on the recognition service.
    pub network: Duration,
}

impl RecognitionTiming {
    /// End-to-end processing latency (encode + network).
    pub fn total(&self) -> Duration {
        self.encode + self.network
    }

    /// Calculate the real-time factor for recognition.
    /// < 1.0 means faster than real-time, > 1.0 means slower.
    pub fn realtime_factor(&self) -> f64 {
        if self.audio_duration.is_zero() {
            return 0.0;
        }
        self.total().as_secs_f64() / self.audio_duration.as_secs_f64()
    }

    pub fn log(&self) {
        tracing::debug!(
            audio_ms = self.audio_duration.as_millis() as u64,
            encode_ms = self.encode.as_millis() as u64,
            network_ms = self.network.as_millis() as u64,
            total_ms = self.total().as_millis() as u64,
            rtf = %format!("{:.2}", self.realtime_factor()),
            "recognition timing"
        );
    }
}

/// Formats a duration in human-readable form.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
