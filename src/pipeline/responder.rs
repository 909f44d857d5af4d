//! Boundary to whatever produces replies (an LLM, a script, an echo).

use crate::error::Result;
use crate::pipeline::error::StationError;
use crate::pipeline::frame::{Frame, Transcript};
use crate::pipeline::station::{Station, StationContext};
use async_trait::async_trait;
use std::sync::Arc;

/// Produces reply text for the conversation.
///
/// This trait allows swapping implementations (LLM vs echo).
#[async_trait]
pub trait Responder: Send + Sync {
    /// Reply to one user utterance. Each returned string is spoken as its own unit.
    async fn respond(&self, transcript: &Transcript) -> Result<Vec<String>>;

    /// Open the conversation when a client connects.
    ///
    /// `instruction` describes the greeting wanted; responders that cannot
    /// follow instructions may ignore it.
    async fn greet(&self, instruction: &str) -> Result<Vec<String>>;

    fn name(&self) -> &str;
}

/// Repeats every utterance back to the speaker.
#[derive(Debug, Clone)]
pub struct EchoResponder {
    greeting: String,
}

impl EchoResponder {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            greeting: greeting.into(),
        }
    }
}

impl Default for EchoResponder {
    fn default() -> Self {
        Self::new("Hi, I'm listening.")
    }
}

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, transcript: &Transcript) -> Result<Vec<String>> {
        Ok(vec![transcript.text.clone()])
    }

    async fn greet(&self, _instruction: &str) -> Result<Vec<String>> {
        Ok(vec![self.greeting.clone()])
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Hands transcripts and greeting requests to a [`Responder`].
///
/// Transcripts continue downstream unchanged; replies arrive later as
/// `Text` frames. `Greet` is consumed here.
pub struct ResponderStage {
    responder: Arc<dyn Responder>,
    greeting: String,
}

impl ResponderStage {
    pub fn new(responder: Arc<dyn Responder>) -> Self {
        Self {
            responder,
            greeting: crate::defaults::GREETING.to_string(),
        }
    }

    /// Instruction passed to [`Responder::greet`].
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }
}

fn into_text_frames(responder: &str, reply: Result<Vec<String>>) -> Vec<Frame> {
    match reply {
        Ok(units) => units.into_iter().map(Frame::Text).collect(),
        Err(e) => {
            tracing::error!(responder, error = %e, "responder failed");
            Vec::new()
        }
    }
}

impl Station for ResponderStage {
    fn process(
        &mut self,
        frame: Frame,
        ctx: &mut StationContext,
    ) -> std::result::Result<Vec<Frame>, StationError> {
        match frame {
            Frame::Transcript(transcript) => {
                let responder = self.responder.clone();
                let request = transcript.clone();
                ctx.spawn(async move {
                    let reply = responder.respond(&request).await;
                    into_text_frames(responder.name(), reply)
                });
                Ok(vec![Frame::Transcript(transcript)])
            }
            Frame::Greet => {
                let responder = self.responder.clone();
                let instruction = self.greeting.clone();
                ctx.spawn(async move {
                    let reply = responder.greet(&instruction).await;
                    into_text_frames(responder.name(), reply)
                });
                Ok(Vec::new())
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "ResponderStage"
    }
}
