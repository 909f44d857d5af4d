use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Batch speech recognition of one complete utterance.
///
/// This trait allows swapping implementations (whisper.cpp server vs mock).
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize one utterance.
    ///
    /// # Arguments
    /// * `wav` - A complete WAV container holding the utterance audio
    ///
    /// # Returns
    /// The raw recognized text (untrimmed) or an error
    async fn recognize(&self, wav: Vec<u8>) -> Result<String>;

    /// Name of the backend, for logging.
    fn name(&self) -> &str;

    /// Release network resources. Idempotent; later calls to `recognize` fail.
    fn close(&self) {}
}

/// Mock recognizer for testing.
///
/// Clones share the recorded request log, so a test can keep one clone and
/// hand the other to the pipeline.
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    response: String,
    should_fail: bool,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
    close_calls: Arc<Mutex<u32>>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self {
            response: "mock transcription".to_string(),
            should_fail: false,
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            close_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail every request
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Delay every response, to keep requests in flight
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// WAV payloads received so far, in call order.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn close_count(&self) -> u32 {
        self.close_calls.lock().map(|c| *c).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(&self, wav: Vec<u8>) -> Result<String> {
        if self.is_closed() {
            return Err(ParleyError::RecognizerClosed);
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(wav);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            Err(ParleyError::RecognitionConnection {
                message: "mock recognition failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&self) {
        if let Ok(mut calls) = self.close_calls.lock() {
            *calls += 1;
        }
        self.closed.store(true, Ordering::SeqCst);
    }
}
