//! Piper voices, driven through the `piper` executable.
//!
//! Text goes in on stdin, raw int16 mono PCM comes back on stdout
//! (`--output_raw`), read lazily in fixed-size chunks. A reader thread feeds
//! the chunks through a channel so every wait is bounded by the voice timeout;
//! the process is killed once that deadline passes.

use crate::defaults;
use crate::error::{ParleyError, Result};
use crate::tts::engine::{PcmChunks, SynthesisEngine};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Deserialize;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 8192;
const EXIT_POLL: Duration = Duration::from_millis(10);

/// Configuration for loading a Piper voice.
#[derive(Debug, Clone, PartialEq)]
pub struct PiperConfig {
    /// Path to the `.onnx` voice model
    pub model: PathBuf,
    /// Name or path of the `piper` executable
    pub binary: String,
    /// Speaker id for multi-speaker voices
    pub speaker: Option<u32>,
    /// Longest one utterance may take before piper is killed
    pub timeout: Duration,
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            model: defaults::voices_dir().join(defaults::VOICE_MODEL_FILE),
            binary: defaults::PIPER_BINARY.to_string(),
            speaker: None,
            timeout: Duration::from_millis(defaults::SYNTHESIS_TIMEOUT_MS),
        }
    }
}

#[derive(Deserialize)]
struct VoiceFile {
    audio: VoiceAudio,
}

#[derive(Deserialize)]
struct VoiceAudio {
    sample_rate: u32,
}

/// A Piper voice whose model, config and executable were all found at load time.
#[derive(Debug)]
pub struct PiperVoice {
    model: PathBuf,
    config_path: PathBuf,
    binary: PathBuf,
    speaker: Option<u32>,
    timeout: Duration,
    sample_rate: u32,
    name: String,
}

impl PiperVoice {
    /// Loads a voice, failing fast if anything needed for synthesis is missing.
    ///
    /// The voice config is expected next to the model as `<model>.json`.
    pub fn load(config: &PiperConfig) -> Result<Self> {
        if !config.model.is_file() {
            return Err(ParleyError::SynthesisModelNotFound {
                path: config.model.display().to_string(),
            });
        }

        let config_path = voice_config_path(&config.model);
        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            ParleyError::SynthesisConfig {
                message: format!("cannot read {}: {}", config_path.display(), e),
            }
        })?;
        let voice: VoiceFile =
            serde_json::from_str(&contents).map_err(|e| ParleyError::SynthesisConfig {
                message: format!("invalid {}: {}", config_path.display(), e),
            })?;
        if voice.audio.sample_rate == 0 {
            return Err(ParleyError::SynthesisConfig {
                message: format!("{} declares a zero sample rate", config_path.display()),
            });
        }

        let binary = which::which(&config.binary).map_err(|_| ParleyError::SynthesisConfig {
            message: format!("piper executable '{}' not found", config.binary),
        })?;

        let name = config
            .model
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "piper".to_string());

        tracing::info!(
            voice = %name,
            sample_rate = voice.audio.sample_rate,
            "Piper voice ready"
        );

        Ok(Self {
            model: config.model.clone(),
            config_path,
            binary,
            speaker: config.speaker,
            timeout: config.timeout,
            sample_rate: voice.audio.sample_rate,
            name,
        })
    }
}

impl SynthesisEngine for PiperVoice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(&self, text: &str) -> Result<PcmChunks<'_>> {
        let deadline = Instant::now() + self.timeout;
        let mut command = Command::new(&self.binary);
        command
            .arg("--model")
            .arg(&self.model)
            .arg("--config")
            .arg(&self.config_path)
            .arg("--output_raw");
        if let Some(speaker) = self.speaker {
            command.arg("--speaker").arg(speaker.to_string());
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ParleyError::SynthesisEngine {
                message: format!("failed to start {}: {}", self.binary.display(), e),
            })?;

        // One line per utterance; closing stdin tells piper the input is complete.
        if let Some(mut stdin) = child.stdin.take() {
            let line = text.replace('\n', " ");
            if let Err(e) = stdin
                .write_all(line.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"))
            {
                stop(&mut child);
                return Err(ParleyError::SynthesisEngine {
                    message: format!("failed to send text to piper: {e}"),
                });
            }
        }

        let Some(stdout) = child.stdout.take() else {
            stop(&mut child);
            return Err(ParleyError::SynthesisEngine {
                message: "piper stdout unavailable".to_string(),
            });
        };
        let chunks = match spawn_reader(stdout) {
            Ok(chunks) => chunks,
            Err(e) => {
                stop(&mut child);
                return Err(ParleyError::SynthesisEngine {
                    message: format!("failed to start piper reader: {e}"),
                });
            }
        };

        Ok(Box::new(PiperChunks {
            child,
            chunks,
            deadline,
            timeout: self.timeout,
            finished: false,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// `en_US-amy-medium.onnx` → `en_US-amy-medium.onnx.json`
fn voice_config_path(model: &Path) -> PathBuf {
    let mut path = model.as_os_str().to_owned();
    path.push(".json");
    PathBuf::from(path)
}

fn stop(child: &mut Child) {
    child.kill().ok();
    child.wait().ok();
}

/// Reads piper's stdout on its own thread. The channel closes at EOF.
fn spawn_reader(mut stdout: ChildStdout) -> io::Result<Receiver<io::Result<Vec<u8>>>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::Builder::new()
        .name("piper-reader".to_string())
        .spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tx.send(Err(e)).ok();
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

struct PiperChunks {
    child: Child,
    chunks: Receiver<io::Result<Vec<u8>>>,
    deadline: Instant,
    timeout: Duration,
    finished: bool,
}

impl PiperChunks {
    fn timed_out(&mut self) -> ParleyError {
        self.finished = true;
        stop(&mut self.child);
        tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "piper timed out, killed");
        ParleyError::SynthesisEngine {
            message: format!(
                "piper timed out after {}",
                humantime::format_duration(self.timeout)
            ),
        }
    }

    /// Output is complete; collect the exit status without passing the deadline.
    fn exit_status(&mut self) -> Option<Result<Vec<u8>>> {
        self.finished = true;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) if status.success() => return None,
                Ok(Some(status)) => {
                    return Some(Err(ParleyError::SynthesisEngine {
                        message: format!("piper exited with {status}"),
                    }));
                }
                Ok(None) if Instant::now() >= self.deadline => {
                    return Some(Err(self.timed_out()));
                }
                Ok(None) => std::thread::sleep(EXIT_POLL),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

impl Iterator for PiperChunks {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.chunks.recv_deadline(self.deadline) {
            Ok(Ok(bytes)) => Some(Ok(bytes)),
            Ok(Err(e)) => {
                self.finished = true;
                stop(&mut self.child);
                Some(Err(e.into()))
            }
            Err(RecvTimeoutError::Timeout) => Some(Err(self.timed_out())),
            Err(RecvTimeoutError::Disconnected) => self.exit_status(),
        }
    }
}

impl Drop for PiperChunks {
    fn drop(&mut self) {
        if !self.finished {
            stop(&mut self.child);
        }
    }
}
