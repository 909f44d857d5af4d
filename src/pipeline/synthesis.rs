//! Text-to-speech station.

use crate::audio::{AudioFormat, AudioFramer};
use crate::pipeline::error::StationError;
use crate::pipeline::frame::Frame;
use crate::pipeline::station::{Station, StationContext};
use crate::error::Result;
use crate::tts::SynthesisEngine;
use std::time::Instant;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Converts each text unit into one bracketed utterance of engine-native audio.
///
/// A text unit produces `SynthesisStarted`, one `OutputAudio` carrying the whole
/// utterance, then `SynthesisStopped`. Blank text and failed or silent
/// synthesis produce nothing at all.
///
/// The engine runs on the dispatch task. On a multi-threaded runtime it runs
/// under `block_in_place`, so other tasks keep moving while a voice renders.
pub struct SynthesisStage {
    engine: Box<dyn SynthesisEngine>,
    framer: AudioFramer,
}

impl SynthesisStage {
    pub fn new(engine: Box<dyn SynthesisEngine>) -> Self {
        let framer = AudioFramer::new(AudioFormat::mono16(engine.sample_rate()));
        Self { engine, framer }
    }

    /// Format of the audio this stage emits.
    pub fn output_format(&self) -> AudioFormat {
        self.framer.format()
    }

    fn synthesize(&mut self, text: &str) -> Vec<Frame> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let started = Instant::now();
        tracing::debug!(chars = text.len(), preview = %preview(text), "synthesis started");

        let pcm = match run_blocking(|| collect_pcm(&*self.engine, text)) {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::error!(error = %e, voice = self.engine.name(), "synthesis failed");
                return Vec::new();
            }
        };

        let Some(chunk) = self.framer.frame(pcm) else {
            tracing::error!(preview = %preview(text), "synthesis produced no audio");
            return Vec::new();
        };

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            audio_ms = chunk.duration().as_millis() as u64,
            "synthesis finished"
        );

        vec![
            Frame::SynthesisStarted,
            Frame::OutputAudio(chunk),
            Frame::SynthesisStopped,
        ]
    }
}

fn collect_pcm(engine: &dyn SynthesisEngine, text: &str) -> Result<Vec<u8>> {
    let mut pcm = Vec::new();
    for chunk in engine.synthesize(text)? {
        pcm.extend_from_slice(&chunk?);
    }
    Ok(pcm)
}

fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 40;
    if text.chars().count() <= MAX_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_CHARS).collect();
        format!("{head}...")
    }
}

impl Station for SynthesisStage {
    fn process(
        &mut self,
        frame: Frame,
        _ctx: &mut StationContext,
    ) -> std::result::Result<Vec<Frame>, StationError> {
        match frame {
            Frame::Text(text) => Ok(self.synthesize(&text)),
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "SynthesisStage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::tts::MockEngine;
    use std::time::Duration;

    fn run(stage: &mut SynthesisStage, frame: Frame) -> Vec<Frame> {
        stage
            .process(frame, &mut StationContext::detached())
            .unwrap()
    }

    #[test]
    fn text_becomes_bracketed_audio() {
        let engine = MockEngine::new(22050).with_chunks(vec![vec![1, 0], vec![2, 0, 3, 0]]);
        let texts = engine.clone();
        let mut stage = SynthesisStage::new(Box::new(engine));

        let frames = run(&mut stage, Frame::Text("  Hello there.  ".to_string()));

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Frame::SynthesisStarted);
        match &frames[1] {
            Frame::OutputAudio(chunk) => {
                assert_eq!(chunk.pcm(), &[1, 0, 2, 0, 3, 0]);
                assert_eq!(chunk.sample_rate(), 22050);
                assert_eq!(chunk.channels(), 1);
            }
            other => panic!("expected OutputAudio, got {other:?}"),
        }
        assert_eq!(frames[2], Frame::SynthesisStopped);
        assert_eq!(texts.texts(), vec!["Hello there.".to_string()]);
    }

    #[test]
    fn single_chunk_is_still_bracketed() {
        let engine = MockEngine::new(16000).with_chunks(vec![vec![5, 0]]);
        let mut stage = SynthesisStage::new(Box::new(engine));

        let frames = run(&mut stage, Frame::Text("hi".to_string()));

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Frame::SynthesisStarted);
        assert_eq!(frames[2], Frame::SynthesisStopped);
    }

    #[test]
    fn blank_text_produces_nothing() {
        let engine = MockEngine::new(16000);
        let calls = engine.clone();
        let mut stage = SynthesisStage::new(Box::new(engine));

        assert!(run(&mut stage, Frame::Text("  \n\t ".to_string())).is_empty());
        assert!(calls.texts().is_empty());
    }

    #[test]
    fn silent_engine_produces_nothing() {
        let engine = MockEngine::new(16000).with_chunks(vec![vec![], vec![]]);
        let mut stage = SynthesisStage::new(Box::new(engine));

        assert!(run(&mut stage, Frame::Text("hi".to_string())).is_empty());
    }

    #[test]
    fn engine_failure_is_suppressed_and_next_text_works() {
        let mut failing = SynthesisStage::new(Box::new(MockEngine::new(16000).with_failure()));
        assert!(run(&mut failing, Frame::Text("hi".to_string())).is_empty());

        let mut partial =
            SynthesisStage::new(Box::new(MockEngine::new(16000).with_failure_after(1)));
        assert!(run(&mut partial, Frame::Text("hi".to_string())).is_empty());

        let mut healthy = SynthesisStage::new(Box::new(MockEngine::new(16000)));
        assert_eq!(run(&mut healthy, Frame::Text("hi".to_string())).len(), 3);
    }

    #[test]
    fn output_sequence_increases_per_utterance() {
        let mut stage = SynthesisStage::new(Box::new(MockEngine::new(16000)));
        let sequences: Vec<u64> = ["one", "two"]
            .iter()
            .flat_map(|t| run(&mut stage, Frame::Text(t.to_string())))
            .filter_map(|f| match f {
                Frame::OutputAudio(chunk) => Some(chunk.sequence()),
                _ => None,
            })
            .collect();

        assert_eq!(sequences, vec![0, 1]);
    }

    #[test]
    fn other_frames_pass_through() {
        let mut stage = SynthesisStage::new(Box::new(MockEngine::new(16000)));
        assert_eq!(run(&mut stage, Frame::End), vec![Frame::End]);
        assert_eq!(stage.output_format(), AudioFormat::mono16(16000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn slow_voice_does_not_stall_the_runtime() {
        let engine = MockEngine::new(16000).with_delay(Duration::from_millis(1500));
        let (mut handle, mut rx) = Pipeline::new()
            .with_station(SynthesisStage::new(Box::new(engine)))
            .start();

        let started = Instant::now();
        handle.push(Frame::Text("hello".to_string())).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            started.elapsed() < Duration::from_millis(1000),
            "timer waited {:?} behind synthesis",
            started.elapsed()
        );

        handle.end().await.unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0], Frame::SynthesisStarted);
        assert_eq!(frames[3], Frame::End);
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "a".repeat(100);
        assert_eq!(preview(&long).len(), 43);
        assert_eq!(preview("short"), "short");
    }
}
