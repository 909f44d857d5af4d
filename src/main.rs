use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use parley::cli::{Cli, Commands, log_level};
use parley::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match &cli.command {
        Commands::Transcribe { file } => {
            let config = load_config(&cli)?;
            parley::app::run_transcribe_command(&config, file).await?;
        }
        Commands::Speak { text, output } => {
            let config = load_config(&cli)?;
            parley::app::run_speak_command(&config, text, output).await?;
        }
        Commands::Echo {
            file,
            output,
            greet,
        } => {
            let config = load_config(&cli)?;
            parley::app::run_echo_command(&config, file, output, *greet).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "parley",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// RUST_LOG wins; otherwise the verbosity flags pick the level.
fn init_logging(quiet: bool, verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={}", log_level(quiet, verbose))));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(path) = &cli.config {
        // Load from custom path
        Config::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        // Try default path, fall back to defaults
        Config::load_or_default(&Config::default_path())?
    };

    // Environment first, then command-line flags
    config = config.with_env_overrides()?;
    if let Some(url) = &cli.server_url {
        config.stt.server_url = url.clone();
    }
    if let Some(language) = &cli.language {
        config.stt.language = language.clone();
    }
    if let Some(timeout_ms) = cli.timeout {
        config.stt.timeout_ms = timeout_ms;
    }
    if let Some(voice) = &cli.voice {
        config.tts.model = voice.clone();
    }

    config.validate()?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}
