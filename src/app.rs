//! Application entry points.
//!
//! Builds pipelines from configuration and drives them from recorded audio:
//! recording → recognition → reply → synthesis → WAV

use crate::audio::wav::{self, WavFileSource};
use crate::audio::{AudioChunk, AudioFramer};
use crate::config::Config;
use crate::defaults;
use crate::error::{ParleyError, Result};
use crate::pipeline::{
    EchoResponder, Frame, Pipeline, Responder, ResponderStage, SpeechAggregator, SynthesisStage,
    Transcript, TurnLogger,
};
use crate::session::{ClientEvent, ConversationSession};
use crate::stt::{Recognizer, WhisperServerRecognizer};
use crate::tts::{PiperVoice, SynthesisEngine};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// What came out of the end of a pipeline run.
#[derive(Debug, Default)]
pub struct TurnOutput {
    pub transcripts: Vec<Transcript>,
    pub audio: Vec<AudioChunk>,
}

impl TurnOutput {
    /// All synthesized audio, concatenated in emission order.
    pub fn audio_pcm(&self) -> Vec<u8> {
        self.audio.iter().flat_map(|c| c.pcm().iter().copied()).collect()
    }
}

/// Builds the speech-to-text station from configuration.
pub fn speech_aggregator(config: &Config, recognizer: Arc<dyn Recognizer>) -> SpeechAggregator {
    SpeechAggregator::new(recognizer, config.audio_format())
        .with_speaker_id(config.stt.speaker_id.clone())
        .with_overlap_policy(config.stt.overlap_policy)
}

/// Builds the full conversational chain:
/// speech aggregator → responder → synthesis → turn logger.
pub fn conversation_pipeline(
    config: &Config,
    recognizer: Arc<dyn Recognizer>,
    responder: Arc<dyn Responder>,
    engine: Box<dyn SynthesisEngine>,
) -> Pipeline {
    Pipeline::new()
        .with_station(speech_aggregator(config, recognizer))
        .with_station(
            ResponderStage::new(responder).with_greeting(config.conversation.greeting.clone()),
        )
        .with_station(SynthesisStage::new(engine))
        .with_station(TurnLogger::new())
}

/// Frames for one recorded utterance: speech boundaries around the audio slices.
pub fn utterance_frames(source: WavFileSource, slice_ms: u32) -> Vec<Frame> {
    let mut framer = AudioFramer::new(source.format());
    let mut frames = vec![Frame::SpeechStarted];
    frames.extend(
        source
            .into_slices(slice_ms)
            .into_iter()
            .filter_map(|slice| framer.frame(slice))
            .map(Frame::InputAudio),
    );
    frames.push(Frame::SpeechStopped);
    frames
}

async fn collect_output(mut output: UnboundedReceiver<Frame>) -> TurnOutput {
    let mut collected = TurnOutput::default();
    while let Some(frame) = output.recv().await {
        match frame {
            Frame::Transcript(transcript) => collected.transcripts.push(transcript),
            Frame::OutputAudio(chunk) => collected.audio.push(chunk),
            _ => {}
        }
    }
    collected
}

/// Recognizes one recorded utterance.
pub async fn transcribe(
    config: &Config,
    source: WavFileSource,
    recognizer: Arc<dyn Recognizer>,
) -> Result<Vec<Transcript>> {
    let (mut handle, output) = Pipeline::new()
        .with_station(speech_aggregator(config, recognizer))
        .with_station(TurnLogger::new())
        .start();

    for frame in utterance_frames(source, defaults::FILE_SLICE_MS) {
        handle.push(frame)?;
    }
    handle.end().await?;

    Ok(collect_output(output).await.transcripts)
}

/// Synthesizes one text unit.
pub async fn speak(engine: Box<dyn SynthesisEngine>, text: &str) -> Result<Vec<AudioChunk>> {
    let (mut handle, output) = Pipeline::new()
        .with_station(SynthesisStage::new(engine))
        .start();

    handle.push(Frame::Text(text.to_string()))?;
    handle.end().await?;

    Ok(collect_output(output).await.audio)
}

/// Runs one recorded utterance through the full conversational chain.
///
/// With `greet`, the session first connects, seeding a greeting turn.
pub async fn converse(
    config: &Config,
    source: WavFileSource,
    recognizer: Arc<dyn Recognizer>,
    responder: Arc<dyn Responder>,
    engine: Box<dyn SynthesisEngine>,
    greet: bool,
) -> Result<TurnOutput> {
    let (handle, output) = conversation_pipeline(config, recognizer, responder, engine).start();
    let mut session = ConversationSession::new(handle);

    if greet {
        session.handle_event(ClientEvent::Connected).await?;
    }
    for frame in utterance_frames(source, defaults::FILE_SLICE_MS) {
        session.push(frame)?;
    }
    session.finish().await?;

    Ok(collect_output(output).await)
}

/// Writes synthesized chunks to a WAV file at their native rate.
pub fn write_wav(path: &Path, chunks: &[AudioChunk]) -> Result<()> {
    let Some(first) = chunks.first() else {
        return Err(ParleyError::SynthesisEngine {
            message: "no audio was synthesized".to_string(),
        });
    };
    let pcm: Vec<u8> = chunks.iter().flat_map(|c| c.pcm().iter().copied()).collect();
    std::fs::write(path, wav::encode(&pcm, first.format()))?;
    tracing::info!(
        path = %path.display(),
        bytes = pcm.len(),
        sample_rate = first.sample_rate(),
        "wrote audio"
    );
    Ok(())
}

/// `parley transcribe`: prints one line per transcript.
pub async fn run_transcribe_command(config: &Config, file: &Path) -> Result<()> {
    let source = WavFileSource::open(file, config.audio.sample_rate)?;
    let recognizer = Arc::new(WhisperServerRecognizer::new(config.whisper_server()));

    let transcripts = transcribe(config, source, recognizer).await?;
    if transcripts.is_empty() {
        tracing::warn!(file = %file.display(), "no speech recognized");
    }
    for transcript in transcripts {
        println!("{}", transcript.text);
    }
    Ok(())
}

/// `parley speak`: synthesizes text into a WAV file.
pub async fn run_speak_command(config: &Config, text: &str, output: &Path) -> Result<()> {
    let voice = PiperVoice::load(&config.piper())?;
    let audio = speak(Box::new(voice), text).await?;
    write_wav(output, &audio)
}

/// `parley echo`: recognizes a recording and speaks it back into a WAV file.
pub async fn run_echo_command(
    config: &Config,
    file: &Path,
    output: &Path,
    greet: bool,
) -> Result<()> {
    // Voice loading is the only fatal resource failure; do it before serving.
    let voice = PiperVoice::load(&config.piper())?;
    let source = WavFileSource::open(file, config.audio.sample_rate)?;
    let recognizer = Arc::new(WhisperServerRecognizer::new(config.whisper_server()));

    let turn = converse(
        config,
        source,
        recognizer,
        Arc::new(EchoResponder::default()),
        Box::new(voice),
        greet,
    )
    .await?;

    for transcript in &turn.transcripts {
        println!("{}", transcript.text);
    }
    write_wav(output, &turn.audio)
}
