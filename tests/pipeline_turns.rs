//! End-to-end turns through the pipeline.
//!
//! The recognition service is a wiremock server speaking the whisper.cpp
//! `/inference` protocol; synthesis uses `MockEngine`.

use parley::audio::wav;
use parley::audio::{AudioFormat, AudioFramer};
use parley::pipeline::{
    EchoResponder, Frame, OverlapPolicy, Pipeline, ResponderStage, SpeechAggregator,
    SynthesisStage, TurnLogger,
};
use parley::stt::{MockRecognizer, WhisperServerConfig, WhisperServerRecognizer};
use parley::tts::MockEngine;
use parley::{ClientEvent, ConversationSession, Recognizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn whisper(server: &MockServer, timeout: Duration) -> Arc<dyn Recognizer> {
    Arc::new(WhisperServerRecognizer::new(WhisperServerConfig {
        base_url: server.uri(),
        language: "en".to_string(),
        timeout,
    }))
}

async fn mount_text(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": text })))
        .mount(server)
        .await;
}

async fn collect(mut rx: UnboundedReceiver<Frame>) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    frames
}

fn transcripts(frames: &[Frame]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::Transcript(t) => Some(t.text.clone()),
            _ => None,
        })
        .collect()
}

fn kinds(frames: &[Frame]) -> Vec<&'static str> {
    frames.iter().map(Frame::kind).collect()
}

struct Mic {
    framer: AudioFramer,
}

impl Mic {
    fn new() -> Self {
        Self {
            framer: AudioFramer::new(AudioFormat::default()),
        }
    }

    fn chunk(&mut self, bytes: &[u8]) -> Frame {
        match self.framer.frame(bytes.to_vec()) {
            Some(chunk) => Frame::InputAudio(chunk),
            None => panic!("test chunk must not be empty"),
        }
    }
}

#[tokio::test]
async fn utterance_yields_one_transcript_after_stop() {
    let server = MockServer::start().await;
    mount_text(&server, "hello").await;
    let mut mic = Mic::new();

    let (mut handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            whisper(&server, Duration::from_secs(5)),
            AudioFormat::default(),
        ))
        .start();

    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(b"AA")).unwrap();
    handle.push(mic.chunk(b"BB")).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    handle.end().await.unwrap();

    let frames = collect(rx).await;
    assert_eq!(
        kinds(&frames),
        vec![
            "speech_started",
            "input_audio",
            "input_audio",
            "speech_stopped",
            "transcript",
            "end"
        ]
    );
    assert_eq!(transcripts(&frames), vec!["hello"]);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn uploaded_wav_carries_the_collected_audio() {
    let recognizer = MockRecognizer::new().with_response("ok");
    let mut mic = Mic::new();

    let (mut handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            Arc::new(recognizer.clone()),
            AudioFormat::default(),
        ))
        .start();

    handle.push(mic.chunk(&[7, 7])).unwrap(); // idle: never uploaded
    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(&[1, 2])).unwrap();
    handle.push(mic.chunk(&[3, 4])).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    handle.end().await.unwrap();
    collect(rx).await;

    let sent = wav::decode(&recognizer.requests()[0]).unwrap();
    assert_eq!(sent.pcm, vec![1, 2, 3, 4]);
    assert_eq!(sent.format, AudioFormat::mono16(16000));
}

#[tokio::test]
async fn start_then_stop_without_audio_makes_no_request() {
    let server = MockServer::start().await;
    mount_text(&server, "unused").await;

    let (mut handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            whisper(&server, Duration::from_secs(5)),
            AudioFormat::default(),
        ))
        .start();

    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    handle.end().await.unwrap();

    let frames = collect(rx).await;
    assert!(transcripts(&frames).is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn recognition_calls_match_stops_with_buffered_audio() {
    let recognizer = MockRecognizer::new();
    let mut mic = Mic::new();
    let a = mic.chunk(&[1, 0]);

    // started, chunk, stopped            → call
    // stopped (idle)                     → no call
    // chunk (idle), started, stopped     → no call
    // started, chunk, started, stopped   → no call (restart cleared the buffer)
    // started, chunk, chunk, stopped     → call
    let events = vec![
        Frame::SpeechStarted,
        a.clone(),
        Frame::SpeechStopped,
        Frame::SpeechStopped,
        a.clone(),
        Frame::SpeechStarted,
        Frame::SpeechStopped,
        Frame::SpeechStarted,
        a.clone(),
        Frame::SpeechStarted,
        Frame::SpeechStopped,
        Frame::SpeechStarted,
        a.clone(),
        a,
        Frame::SpeechStopped,
    ];

    let (mut handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            Arc::new(recognizer.clone()),
            AudioFormat::default(),
        ))
        .start();
    for event in events {
        handle.push(event).unwrap();
    }
    handle.end().await.unwrap();

    assert_eq!(transcripts(&collect(rx).await).len(), 2);
    assert_eq!(recognizer.call_count(), 2);
}

#[tokio::test]
async fn timeout_yields_no_transcript_and_next_turn_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "text": "too late" }))
                .set_delay(Duration::from_secs(2)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_text(&server, "second").await;
    let mut mic = Mic::new();

    let (mut handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            whisper(&server, Duration::from_millis(200)),
            AudioFormat::default(),
        ))
        .start();

    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(b"xx")).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    // Let the first request time out before the next turn begins.
    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(b"yy")).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    handle.end().await.unwrap();

    assert_eq!(transcripts(&collect(rx).await), vec!["second"]);
}

#[tokio::test]
async fn server_error_yields_no_transcript() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
        .mount(&server)
        .await;
    let mut mic = Mic::new();

    let (mut handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            whisper(&server, Duration::from_secs(5)),
            AudioFormat::default(),
        ))
        .start();

    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(b"zz")).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    handle.end().await.unwrap();

    let frames = collect(rx).await;
    assert!(transcripts(&frames).is_empty());
    assert_eq!(frames.last(), Some(&Frame::End));
}

#[tokio::test]
async fn blank_recognition_is_silence() {
    let server = MockServer::start().await;
    mount_text(&server, "   ").await;
    let mut mic = Mic::new();

    let (mut handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            whisper(&server, Duration::from_secs(5)),
            AudioFormat::default(),
        ))
        .start();

    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(b"zz")).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    handle.end().await.unwrap();

    assert!(transcripts(&collect(rx).await).is_empty());
}

#[tokio::test]
async fn in_flight_recognition_completes_by_default() {
    let recognizer = MockRecognizer::new()
        .with_response("first")
        .with_delay(Duration::from_millis(100));
    let mut mic = Mic::new();

    let (mut handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            Arc::new(recognizer.clone()),
            AudioFormat::default(),
        ))
        .start();

    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(b"aa")).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(b"bb")).unwrap();
    handle.end().await.unwrap();

    // The second utterance never stopped, so only the first is recognized.
    assert_eq!(transcripts(&collect(rx).await), vec!["first"]);
    assert_eq!(recognizer.call_count(), 1);
}

#[tokio::test]
async fn cancel_previous_policy_drops_in_flight_transcript() {
    let recognizer = MockRecognizer::new()
        .with_response("stale")
        .with_delay(Duration::from_millis(200));
    let mut mic = Mic::new();

    let (mut handle, rx) = Pipeline::new()
        .with_station(
            SpeechAggregator::new(Arc::new(recognizer.clone()), AudioFormat::default())
                .with_overlap_policy(OverlapPolicy::CancelPrevious),
        )
        .start();

    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(b"aa")).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.push(Frame::SpeechStarted).unwrap();
    handle.end().await.unwrap();

    assert!(transcripts(&collect(rx).await).is_empty());
}

#[tokio::test]
async fn cancellation_discards_in_flight_result_and_closes_client() {
    let recognizer = MockRecognizer::new()
        .with_response("never seen")
        .with_delay(Duration::from_secs(30));
    let mut mic = Mic::new();

    let (mut handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            Arc::new(recognizer.clone()),
            AudioFormat::default(),
        ))
        .start();

    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(b"aa")).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel().await;

    let frames = collect(rx).await;
    assert!(transcripts(&frames).is_empty());
    assert!(!frames.contains(&Frame::End));
    assert_eq!(recognizer.close_count(), 1);
}

#[tokio::test]
async fn full_turn_speaks_the_reply_in_brackets() {
    let server = MockServer::start().await;
    mount_text(&server, " how are you ").await;
    let engine = MockEngine::new(22050);
    let spoken = engine.clone();
    let mut mic = Mic::new();

    let (mut handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            whisper(&server, Duration::from_secs(5)),
            AudioFormat::default(),
        ))
        .with_station(ResponderStage::new(Arc::new(EchoResponder::default())))
        .with_station(SynthesisStage::new(Box::new(engine)))
        .with_station(TurnLogger::new())
        .start();

    handle.push(Frame::SpeechStarted).unwrap();
    handle.push(mic.chunk(b"hi")).unwrap();
    handle.push(Frame::SpeechStopped).unwrap();
    handle.end().await.unwrap();

    let frames = collect(rx).await;
    assert_eq!(
        kinds(&frames),
        vec![
            "speech_started",
            "input_audio",
            "speech_stopped",
            "transcript",
            "synthesis_started",
            "output_audio",
            "synthesis_stopped",
            "end"
        ]
    );
    assert_eq!(spoken.texts(), vec!["how are you".to_string()]);
    match &frames[5] {
        Frame::OutputAudio(chunk) => assert_eq!(chunk.sample_rate(), 22050),
        other => panic!("expected OutputAudio, got {other:?}"),
    }
}

#[tokio::test]
async fn whitespace_reply_produces_no_synthesis_frames() {
    let (mut handle, rx) = Pipeline::new()
        .with_station(SynthesisStage::new(Box::new(MockEngine::new(16000))))
        .start();

    handle.push(Frame::Text("  ".to_string())).unwrap();
    handle.end().await.unwrap();

    assert_eq!(collect(rx).await, vec![Frame::End]);
}

#[tokio::test]
async fn session_greets_on_connect_and_cancels_on_disconnect() {
    let engine = MockEngine::new(16000);
    let spoken = engine.clone();
    let recognizer = MockRecognizer::new().with_delay(Duration::from_secs(30));

    let (handle, rx) = Pipeline::new()
        .with_station(SpeechAggregator::new(
            Arc::new(recognizer.clone()),
            AudioFormat::default(),
        ))
        .with_station(ResponderStage::new(Arc::new(EchoResponder::new("Welcome back!"))))
        .with_station(SynthesisStage::new(Box::new(engine)))
        .start();
    let mut session = ConversationSession::new(handle);
    let mut mic = Mic::new();

    session.handle_event(ClientEvent::Connected).await.unwrap();
    session.push(Frame::SpeechStarted).unwrap();
    session.push(mic.chunk(b"aa")).unwrap();
    session.push(Frame::SpeechStopped).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.handle_event(ClientEvent::Disconnected).await.unwrap();

    let frames = collect(rx).await;
    assert_eq!(spoken.texts(), vec!["Welcome back!".to_string()]);
    assert!(frames.contains(&Frame::SynthesisStarted));
    assert!(transcripts(&frames).is_empty());
    assert!(!frames.contains(&Frame::End));
    assert_eq!(recognizer.close_count(), 1);
}
