use crate::audio::AudioFormat;
use crate::defaults;
use crate::error::{ParleyError, Result};
use crate::pipeline::OverlapPolicy;
use crate::stt::WhisperServerConfig;
use crate::tts::PiperConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub conversation: ConversationConfig,
}

/// Inbound audio configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// Base URL of the whisper.cpp server
    pub server_url: String,
    pub language: String,
    pub timeout_ms: u64,
    /// Speaker identifier attached to every transcript
    pub speaker_id: String,
    pub overlap_policy: OverlapPolicy,
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    /// Path to the Piper `.onnx` voice
    pub model: PathBuf,
    pub piper_binary: String,
    pub speaker: Option<u32>,
    /// Piper is killed when one utterance takes longer than this
    pub timeout_ms: u64,
}

/// Conversation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    /// Instruction handed to the responder when a client connects
    pub greeting: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            server_url: defaults::RECOGNITION_SERVER_URL.to_string(),
            language: defaults::RECOGNITION_LANGUAGE.to_string(),
            timeout_ms: defaults::RECOGNITION_TIMEOUT_MS,
            speaker_id: defaults::SPEAKER_ID.to_string(),
            overlap_policy: OverlapPolicy::default(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model: defaults::voices_dir().join(defaults::VOICE_MODEL_FILE),
            piper_binary: defaults::PIPER_BINARY.to_string(),
            speaker: None,
            timeout_ms: defaults::SYNTHESIS_TIMEOUT_MS,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            greeting: defaults::GREETING.to_string(),
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ParleyError {
    ParleyError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ParleyError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ParleyError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(ParleyError::ConfigFileNotFound { .. }) => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables (empty values are ignored):
    /// - PARLEY_STT_URL → stt.server_url
    /// - PARLEY_LANGUAGE → stt.language
    /// - PARLEY_STT_TIMEOUT → stt.timeout_ms (e.g. "10s", "500ms")
    /// - PARLEY_VOICE_MODEL → tts.model
    /// - PARLEY_SAMPLE_RATE → audio.sample_rate
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(url) = env_value("PARLEY_STT_URL") {
            self.stt.server_url = url;
        }

        if let Some(language) = env_value("PARLEY_LANGUAGE") {
            self.stt.language = language;
        }

        if let Some(timeout) = env_value("PARLEY_STT_TIMEOUT") {
            let parsed = humantime::parse_duration(&timeout)
                .map_err(|e| invalid("PARLEY_STT_TIMEOUT", e.to_string()))?;
            self.stt.timeout_ms = parsed.as_millis() as u64;
        }

        if let Some(model) = env_value("PARLEY_VOICE_MODEL") {
            self.tts.model = PathBuf::from(model);
        }

        if let Some(rate) = env_value("PARLEY_SAMPLE_RATE") {
            self.audio.sample_rate = rate
                .parse()
                .map_err(|_| invalid("PARLEY_SAMPLE_RATE", format!("'{rate}' is not a number")))?;
        }

        Ok(self)
    }

    /// Checks values that would otherwise fail deep inside the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.stt.timeout_ms == 0 {
            return Err(invalid("stt.timeout_ms", "must be positive"));
        }
        if self.tts.timeout_ms == 0 {
            return Err(invalid("tts.timeout_ms", "must be positive"));
        }
        if self.stt.language.trim().is_empty() {
            return Err(invalid("stt.language", "must not be empty"));
        }
        let url = reqwest::Url::parse(&self.stt.server_url)
            .map_err(|e| invalid("stt.server_url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(
                "stt.server_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/parley/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_default()
            .join("parley")
            .join("config.toml")
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::mono16(self.audio.sample_rate)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.stt.timeout_ms)
    }

    pub fn whisper_server(&self) -> WhisperServerConfig {
        WhisperServerConfig {
            base_url: self.stt.server_url.clone(),
            language: self.stt.language.clone(),
            timeout: self.recognition_timeout(),
        }
    }

    pub fn piper(&self) -> PiperConfig {
        PiperConfig {
            model: self.tts.model.clone(),
            binary: self.tts.piper_binary.clone(),
            speaker: self.tts.speaker,
            timeout: Duration::from_millis(self.tts.timeout_ms),
        }
    }
}
