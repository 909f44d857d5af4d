//! Command-line interface for parley
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Speech-turn pipeline: recognize, respond, synthesize
#[derive(Parser, Debug)]
#[command(
    name = "parley",
    version,
    about = "Speech-turn pipeline: recognize, respond, synthesize"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Recognition server base URL (e.g., http://127.0.0.1:8178)
    #[arg(long, global = true, value_name = "URL")]
    pub server_url: Option<String>,

    /// Language tag sent to the recognition server
    #[arg(long, global = true, value_name = "LANG")]
    pub language: Option<String>,

    /// Recognition timeout. Examples: 10s, 1500ms, 1m
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_timeout_ms)]
    pub timeout: Option<u64>,

    /// Piper voice model (.onnx)
    #[arg(long, global = true, value_name = "MODEL")]
    pub voice: Option<PathBuf>,
}

/// Parse a timeout string into milliseconds.
///
/// Bare numbers are seconds; anything else goes through `humantime`.
fn parse_timeout_ms(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let millis = if let Ok(secs) = s.parse::<u64>() {
        secs.saturating_mul(1000)
    } else {
        humantime::parse_duration(s)
            .map(|d| d.as_millis() as u64)
            .map_err(|e| e.to_string())?
    };
    if millis == 0 {
        return Err("timeout must be positive".to_string());
    }
    Ok(millis)
}

/// Default log filter for the given verbosity flags.
pub fn log_level(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Recognize one recorded utterance and print the transcript
    Transcribe {
        /// WAV file holding the utterance (any rate, 16-bit)
        file: PathBuf,
    },

    /// Synthesize text and write it as a WAV file
    Speak {
        /// Text to speak
        text: String,

        /// Output WAV path
        #[arg(short, long, value_name = "PATH", default_value = "speech.wav")]
        output: PathBuf,
    },

    /// Run one full turn: recognize a recording and speak it back
    Echo {
        /// WAV file holding the utterance
        file: PathBuf,

        /// Output WAV path for the reply
        #[arg(short, long, value_name = "PATH", default_value = "reply.wav")]
        output: PathBuf,

        /// Greet before answering, as when a client connects
        #[arg(long)]
        greet: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}
