//! Frame pipeline for conversational turns.
//!
//! An ordered chain of stations driven by a single tokio task. Stations may
//! spawn asynchronous work (recognition, replies) whose frames re-enter the
//! chain after the spawning station.

pub mod error;
pub mod frame;
pub mod latency;
pub mod observer;
pub mod responder;
pub mod runner;
pub mod speech_aggregator;
pub mod station;
pub mod synthesis;

pub use error::{ErrorReporter, LogReporter, StationError};
pub use frame::{Frame, Transcript};
pub use latency::RecognitionTiming;
pub use observer::TurnLogger;
pub use responder::{EchoResponder, Responder, ResponderStage};
pub use runner::{Pipeline, PipelineHandle};
pub use speech_aggregator::{OverlapPolicy, SpeechAggregator};
pub use station::{Station, StationContext};
pub use synthesis::SynthesisStage;
