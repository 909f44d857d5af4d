//! Pass-through station that logs the shape of each conversational turn.

use crate::pipeline::error::StationError;
use crate::pipeline::frame::Frame;
use crate::pipeline::latency::format_duration;
use crate::pipeline::station::{Station, StationContext};
use std::time::Instant;

/// Logs transcripts, time to first reply audio, and synthesis durations.
///
/// Place it after the synthesis stage so it sees both transcripts and
/// synthesis brackets. Every frame is forwarded unchanged.
#[derive(Debug, Default)]
pub struct TurnLogger {
    turns: u64,
    replies: u64,
    transcript_at: Option<Instant>,
    synthesis_at: Option<Instant>,
}

impl TurnLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// User turns seen so far.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Synthesized utterances seen so far.
    pub fn replies(&self) -> u64 {
        self.replies
    }

    fn observe(&mut self, frame: &Frame) {
        match frame {
            Frame::SpeechStarted => tracing::debug!("user started speaking"),
            Frame::SpeechStopped => tracing::debug!("user stopped speaking"),
            Frame::Transcript(transcript) => {
                self.turns += 1;
                self.transcript_at = Some(Instant::now());
                tracing::info!(
                    turn = self.turns,
                    speaker = %transcript.speaker_id,
                    chars = transcript.text.len(),
                    "user turn"
                );
            }
            Frame::SynthesisStarted => {
                let now = Instant::now();
                if let Some(heard) = self.transcript_at.take() {
                    tracing::info!(
                        turn = self.turns,
                        latency = %format_duration(now.duration_since(heard)),
                        "first reply audio"
                    );
                }
                self.synthesis_at = Some(now);
            }
            Frame::SynthesisStopped => {
                self.replies += 1;
                if let Some(started) = self.synthesis_at.take() {
                    tracing::debug!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "reply utterance complete"
                    );
                }
            }
            Frame::OutputAudio(chunk) => tracing::debug!(
                bytes = chunk.len(),
                audio_ms = chunk.duration().as_millis() as u64,
                "reply audio"
            ),
            Frame::End => tracing::info!(
                turns = self.turns,
                replies = self.replies,
                "conversation ended"
            ),
            Frame::InputAudio(_) | Frame::Text(_) | Frame::Greet => {}
        }
    }
}

impl Station for TurnLogger {
    fn process(
        &mut self,
        frame: Frame,
        _ctx: &mut StationContext,
    ) -> Result<Vec<Frame>, StationError> {
        self.observe(&frame);
        Ok(vec![frame])
    }

    fn name(&self) -> &'static str {
        "TurnLogger"
    }
}
