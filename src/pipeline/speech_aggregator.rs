//! Turns speech boundaries plus inbound audio into recognized utterances.
//!
//! The aggregator is idle until `SpeechStarted`, collects inbound PCM until
//! `SpeechStopped`, then hands the collected bytes to a spawned recognition
//! task. Audio always continues downstream; collection is a side channel.

use crate::audio::{AudioChunk, AudioFormat, wav};
use crate::pipeline::error::StationError;
use crate::pipeline::frame::{Frame, Transcript};
use crate::pipeline::latency::RecognitionTiming;
use crate::pipeline::station::{Station, StationContext};
use crate::stt::Recognizer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// What happens to an in-flight recognition when the next utterance starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// The earlier recognition finishes and its transcript is emitted.
    #[default]
    Complete,
    /// The earlier recognition is discarded.
    CancelPrevious,
}

#[derive(Debug)]
struct SpeechSession {
    pcm: Vec<u8>,
    chunks: usize,
    started: Instant,
}

impl SpeechSession {
    fn new() -> Self {
        Self {
            pcm: Vec::new(),
            chunks: 0,
            started: Instant::now(),
        }
    }

    fn append(&mut self, chunk: &AudioChunk) {
        self.pcm.extend_from_slice(chunk.pcm());
        self.chunks += 1;
    }
}

/// Speech-to-text station.
pub struct SpeechAggregator {
    recognizer: Arc<dyn Recognizer>,
    format: AudioFormat,
    speaker_id: String,
    policy: OverlapPolicy,
    session: Option<SpeechSession>,
    in_flight: Option<CancellationToken>,
    released: bool,
}

impl SpeechAggregator {
    /// `format` describes the inbound PCM that will be buffered.
    pub fn new(recognizer: Arc<dyn Recognizer>, format: AudioFormat) -> Self {
        Self {
            recognizer,
            format,
            speaker_id: crate::defaults::SPEAKER_ID.to_string(),
            policy: OverlapPolicy::default(),
            session: None,
            in_flight: None,
            released: false,
        }
    }

    pub fn with_speaker_id(mut self, speaker_id: impl Into<String>) -> Self {
        self.speaker_id = speaker_id.into();
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// True between `SpeechStarted` and `SpeechStopped`.
    pub fn is_collecting(&self) -> bool {
        self.session.is_some()
    }

    /// Bytes collected for the current utterance.
    pub fn buffered_bytes(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.pcm.len())
    }

    fn start_session(&mut self) {
        if self.policy == OverlapPolicy::CancelPrevious
            && let Some(token) = self.in_flight.take()
            && !token.is_cancelled()
        {
            token.cancel();
            tracing::debug!("cancelled in-flight recognition for new utterance");
        }
        if let Some(previous) = self.session.replace(SpeechSession::new())
            && !previous.pcm.is_empty()
        {
            tracing::debug!(
                discarded_bytes = previous.pcm.len(),
                "speech restarted, discarding collected audio"
            );
        }
    }

    fn flush(&mut self, ctx: &mut StationContext) {
        let Some(session) = self.session.take() else {
            return;
        };
        if session.pcm.is_empty() {
            tracing::debug!("speech stopped with no audio collected");
            return;
        }

        tracing::debug!(
            chunks = session.chunks,
            bytes = session.pcm.len(),
            spoken_ms = session.started.elapsed().as_millis() as u64,
            "utterance ready for recognition"
        );

        let token = ctx.spawn(recognize_utterance(
            self.recognizer.clone(),
            session.pcm,
            self.format,
            self.speaker_id.clone(),
        ));
        self.in_flight = Some(token);
    }

    fn release(&mut self) {
        if !self.released {
            self.recognizer.close();
            self.released = true;
            tracing::debug!(recognizer = self.recognizer.name(), "recognizer released");
        }
    }
}

async fn recognize_utterance(
    recognizer: Arc<dyn Recognizer>,
    pcm: Vec<u8>,
    format: AudioFormat,
    speaker_id: String,
) -> Vec<Frame> {
    let audio_duration = format.duration_of(pcm.len());

    let encode_start = Instant::now();
    let wav = wav::encode(&pcm, format);
    let encode = encode_start.elapsed();
    drop(pcm);

    let network_start = Instant::now();
    let result = recognizer.recognize(wav).await;
    let timing = RecognitionTiming {
        audio_duration,
        encode,
        network: network_start.elapsed(),
    };
    timing.log();

    match result {
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                tracing::debug!("recognition returned no speech");
                Vec::new()
            } else {
                tracing::info!(text, speaker = %speaker_id, "transcript");
                vec![Frame::Transcript(Transcript::new(text, speaker_id))]
            }
        }
        Err(e) => {
            tracing::error!(
                kind = e.kind(),
                error = %e,
                recognizer = recognizer.name(),
                "recognition failed"
            );
            Vec::new()
        }
    }
}

impl Station for SpeechAggregator {
    fn process(
        &mut self,
        frame: Frame,
        ctx: &mut StationContext,
    ) -> Result<Vec<Frame>, StationError> {
        match frame {
            Frame::SpeechStarted => {
                self.start_session();
                Ok(vec![Frame::SpeechStarted])
            }
            Frame::InputAudio(chunk) => {
                if let Some(session) = self.session.as_mut() {
                    session.append(&chunk);
                }
                Ok(vec![Frame::InputAudio(chunk)])
            }
            Frame::SpeechStopped => {
                self.flush(ctx);
                Ok(vec![Frame::SpeechStopped])
            }
            Frame::End => {
                self.session = None;
                self.release();
                Ok(vec![Frame::End])
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "SpeechAggregator"
    }

    fn shutdown(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        self.session = None;
        self.release();
    }
}
