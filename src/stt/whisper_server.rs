//! Client for a whisper.cpp inference server.
//!
//! Each utterance is uploaded as one multipart request to
//! `POST {base_url}/inference` and answered with a JSON body carrying `text`.

use crate::defaults;
use crate::error::{ParleyError, Result};
use crate::stt::recognizer::Recognizer;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

/// Configuration for the whisper.cpp server client.
#[derive(Debug, Clone, PartialEq)]
pub struct WhisperServerConfig {
    /// Base URL of the server, without the `/inference` suffix
    pub base_url: String,
    /// Language tag sent with every request (e.g., "en")
    pub language: String,
    /// Client-side timeout for the whole round trip
    pub timeout: Duration,
}

impl Default for WhisperServerConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::RECOGNITION_SERVER_URL.to_string(),
            language: defaults::RECOGNITION_LANGUAGE.to_string(),
            timeout: Duration::from_millis(defaults::RECOGNITION_TIMEOUT_MS),
        }
    }
}

#[derive(Deserialize)]
struct InferenceResponse {
    text: String,
}

enum ClientSlot {
    Unopened,
    Open(reqwest::Client),
    Closed,
}

/// Recognizer backed by a whisper.cpp HTTP server.
///
/// The HTTP client is created on first use and reused for every utterance
/// until [`Recognizer::close`] releases it.
pub struct WhisperServerRecognizer {
    endpoint: String,
    language: String,
    timeout: Duration,
    client: Mutex<ClientSlot>,
}

impl WhisperServerRecognizer {
    pub fn new(config: WhisperServerConfig) -> Self {
        let base = config.base_url.trim_end_matches('/');
        Self {
            endpoint: format!("{base}/inference"),
            language: config.language,
            timeout: config.timeout,
            client: Mutex::new(ClientSlot::Unopened),
        }
    }

    /// Full inference URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the shared client, creating it on first use.
    fn client(&self) -> Result<reqwest::Client> {
        let mut slot = self
            .client
            .lock()
            .map_err(|_| ParleyError::Other("recognizer client lock poisoned".to_string()))?;
        match &*slot {
            ClientSlot::Open(client) => Ok(client.clone()),
            ClientSlot::Closed => Err(ParleyError::RecognizerClosed),
            ClientSlot::Unopened => {
                let client = reqwest::Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| ParleyError::RecognitionConnection {
                        message: format!("failed to build HTTP client: {e}"),
                    })?;
                tracing::debug!(endpoint = %self.endpoint, "opened recognition client");
                *slot = ClientSlot::Open(client.clone());
                Ok(client)
            }
        }
    }

    fn classify(&self, error: reqwest::Error) -> ParleyError {
        if error.is_timeout() {
            ParleyError::RecognitionTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if error.is_decode() || error.is_body() {
            ParleyError::RecognitionResponse {
                message: error.to_string(),
            }
        } else {
            ParleyError::RecognitionConnection {
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl Recognizer for WhisperServerRecognizer {
    async fn recognize(&self, wav: Vec<u8>) -> Result<String> {
        let client = self.client()?;
        tracing::debug!(wav_bytes = wav.len(), "submitting utterance for recognition");

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| ParleyError::Other(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("language", self.language.clone())
            .text("response_format", "json");

        let response = client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::RecognitionStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let parsed: InferenceResponse =
            serde_json::from_slice(&body).map_err(|e| ParleyError::RecognitionResponse {
                message: e.to_string(),
            })?;
        Ok(parsed.text)
    }

    fn name(&self) -> &str {
        "whisper.cpp"
    }

    fn close(&self) {
        let Ok(mut slot) = self.client.lock() else {
            return;
        };
        if matches!(*slot, ClientSlot::Open(_)) {
            tracing::debug!(endpoint = %self.endpoint, "closed recognition client");
        }
        *slot = ClientSlot::Closed;
    }
}
