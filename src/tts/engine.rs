use crate::error::{ParleyError, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lazy, finite, one-shot sequence of little-endian int16 PCM chunks.
pub type PcmChunks<'a> = Box<dyn Iterator<Item = Result<Vec<u8>>> + 'a>;

/// A loaded voice that turns text into mono int16 PCM.
///
/// This trait allows swapping implementations (Piper vs mock).
pub trait SynthesisEngine: Send {
    /// Native output sample rate of the loaded voice.
    fn sample_rate(&self) -> u32;

    /// Starts synthesizing `text`. Audio is produced as the iterator is driven.
    fn synthesize(&self, text: &str) -> Result<PcmChunks<'_>>;

    /// Name of the loaded voice, for logging.
    fn name(&self) -> &str;
}

/// Mock synthesis engine for testing
#[derive(Debug, Clone)]
pub struct MockEngine {
    sample_rate: u32,
    chunks: Vec<Vec<u8>>,
    fail_on_start: bool,
    fail_after: Option<usize>,
    delay: Option<Duration>,
    texts: Arc<Mutex<Vec<String>>>,
}

impl MockEngine {
    /// Create a mock producing two small chunks at the given rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            chunks: vec![vec![1, 0, 2, 0], vec![3, 0]],
            fail_on_start: false,
            fail_after: None,
            delay: None,
            texts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the chunks yielded for every request
    pub fn with_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Configure the mock to fail before yielding anything
    pub fn with_failure(mut self) -> Self {
        self.fail_on_start = true;
        self
    }

    /// Configure the mock to fail after yielding `count` chunks
    pub fn with_failure_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Block the calling thread for `delay` on every request, like a slow voice
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Texts requested so far, in call order
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl SynthesisEngine for MockEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(&self, text: &str) -> Result<PcmChunks<'_>> {
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail_on_start {
            return Err(ParleyError::SynthesisEngine {
                message: "mock synthesis failure".to_string(),
            });
        }

        let fail_after = self.fail_after;
        let chunks = self.chunks.iter().cloned().map(Ok);
        match fail_after {
            Some(count) => Ok(Box::new(chunks.take(count).chain(std::iter::once(Err(
                ParleyError::SynthesisEngine {
                    message: "mock synthesis failure mid-stream".to_string(),
                },
            ))))),
            None => Ok(Box::new(chunks)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
