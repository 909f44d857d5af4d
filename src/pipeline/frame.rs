//! The closed set of events that flow through the pipeline.

use crate::audio::AudioChunk;

/// One recognized user utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// Trimmed, non-empty recognized text.
    pub text: String,
    /// Identifier of the speaker the utterance is attributed to.
    pub speaker_id: String,
    /// Wall-clock capture time (RFC 3339).
    pub timestamp: String,
}

impl Transcript {
    /// Creates a transcript stamped with the current wall-clock time.
    pub fn new(text: impl Into<String>, speaker_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker_id: speaker_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// An event travelling downstream through the stations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Inbound (user) audio.
    InputAudio(AudioChunk),
    /// Synthesized (reply) audio.
    OutputAudio(AudioChunk),
    /// Voice activity began.
    SpeechStarted,
    /// Voice activity ended.
    SpeechStopped,
    /// A recognized utterance.
    Transcript(Transcript),
    /// A unit of reply text to be spoken.
    Text(String),
    /// Opens the bracket around one synthesized utterance.
    SynthesisStarted,
    /// Closes the bracket around one synthesized utterance.
    SynthesisStopped,
    /// A client connected and should be greeted.
    Greet,
    /// Terminal signal; every station releases its resources and forwards it.
    End,
}

impl Frame {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::InputAudio(_) => "input_audio",
            Frame::OutputAudio(_) => "output_audio",
            Frame::SpeechStarted => "speech_started",
            Frame::SpeechStopped => "speech_stopped",
            Frame::Transcript(_) => "transcript",
            Frame::Text(_) => "text",
            Frame::SynthesisStarted => "synthesis_started",
            Frame::SynthesisStopped => "synthesis_stopped",
            Frame::Greet => "greet",
            Frame::End => "end",
        }
    }
}
