//! Lingo command line - speak phrases and inspect XP progression
//!
//! `lingo say` runs the full speech path (cache, synthesis, playback) once;
//! `lingo level` and `lingo grant` exercise the leveling engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lingo_common::config::{load_config, resolve_root_folder, TomlConfig};
use lingo_common::{quiz_xp, QuizMode, XpState};
use lingo_speech::audio::CpalSink;
use lingo_speech::{
    HttpSynthesizer, PlayOutcome, SpeechCache, SpeechRequest, SpeechSession, StaticTokenProvider,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for lingo
#[derive(Parser, Debug)]
#[command(name = "lingo")]
#[command(about = "Speech cache and XP tools for Lingo")]
#[command(version)]
struct Args {
    /// Root folder holding the speech cache
    #[arg(long, global = true, env = "LINGO_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "LINGO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Speak a phrase through the speech cache
    Say {
        /// Text to speak
        text: String,

        /// Language or voice code
        #[arg(short, long)]
        lang: String,

        /// Synthesis endpoint URL (overrides config)
        #[arg(long, env = "LINGO_SPEECH_ENDPOINT")]
        endpoint: Option<String>,

        /// Identity token for the synthesis endpoint (overrides config)
        #[arg(long, env = "LINGO_ID_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Output device name (default device if omitted)
        #[arg(long)]
        device: Option<String>,
    },

    /// Normalize an XP pool against the level curve
    Level {
        #[arg(long, default_value_t = 0)]
        xp: u64,

        #[arg(long, default_value_t = 1)]
        level: u32,
    },

    /// Credit a finished quiz to an XP state
    Grant {
        /// Correct answers
        #[arg(long)]
        score: u32,

        /// Questions in the quiz
        #[arg(long)]
        max: u32,

        /// practice or test
        #[arg(long, default_value = "practice")]
        mode: QuizMode,

        #[arg(long, default_value_t = 0)]
        xp: u64,

        #[arg(long, default_value_t = 1)]
        level: u32,
    },

    /// Print the cache file path for a phrase
    CachePath {
        text: String,

        #[arg(short, long)]
        lang: String,
    },

    /// List audio output devices (names accepted by `say --device`)
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Config warnings are logged before the configured subscriber exists
    let config = tracing::subscriber::with_default(bootstrap_subscriber(), || {
        load_config(args.config.as_deref())
    })
    .context("Failed to load configuration")?;
    init_tracing(&config)?;

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);

    match args.command {
        Command::Say {
            text,
            lang,
            endpoint,
            token,
            device,
        } => {
            let endpoint = endpoint
                .or_else(|| config.speech.endpoint.clone())
                .context("No synthesis endpoint configured (use --endpoint or [speech] endpoint)")?;
            let token = token.or_else(|| config.speech.id_token.clone());

            let cache = SpeechCache::new(
                TomlConfig::speech_cache_dir(&root_folder),
                config.speech.cache_capacity,
            );
            info!("Speech cache: {}", cache.dir().display());

            let synthesizer = HttpSynthesizer::new(
                endpoint,
                Arc::new(StaticTokenProvider::new(token)),
                Duration::from_secs(config.speech.request_timeout_secs),
            )
            .context("Failed to create synthesis client")?;

            let session = SpeechSession::new(
                cache,
                Arc::new(synthesizer),
                Arc::new(CpalSink::new(device)),
            );

            let outcome = session
                .play(&SpeechRequest::new(text, lang))
                .await
                .context("Speech request failed")?;

            match outcome {
                PlayOutcome::Ignored => println!("Nothing to say (empty text or language)"),
                PlayOutcome::Played { source, .. } => {
                    println!("Playing ({:?})", source);
                    session.wait_until_idle().await;
                }
                PlayOutcome::Superseded { .. } => println!("Superseded"),
            }
        }

        Command::Level { xp, level } => {
            let state = XpState::from_parts(xp, level);
            println!("{}", state);
        }

        Command::Grant {
            score,
            max,
            mode,
            xp,
            level,
        } => {
            let mut state = XpState::from_parts(xp, level);
            let points = quiz_xp(score, max, mode);
            let progress = state.credit(points);

            println!("+{} XP ({} {}/{})", points, mode, score, max);
            if progress.leveled_up() {
                println!("Level up! {} -> {}", progress.previous_level, progress.level);
            }
            println!("{}", state);
        }

        Command::CachePath { text, lang } => {
            let cache = SpeechCache::new(TomlConfig::speech_cache_dir(&root_folder), None);
            println!("{}", cache.path_for(&text, &lang).display());
        }

        Command::Devices => {
            let devices = CpalSink::list_devices().context("Failed to list audio devices")?;
            if devices.is_empty() {
                println!("No output devices found");
            }
            for name in devices {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

/// Stderr subscriber used while the config file is read
///
/// RUST_LOG wins; otherwise warnings and errors only.
fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

/// Install the tracing subscriber
///
/// RUST_LOG wins; otherwise the configured level applies to lingo crates.
/// With `[logging] file` set, logs are appended there instead of stderr.
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let level = &config.logging.level;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("lingo_speech={0},lingo_common={0}", level).into());

    let (stderr_layer, file_layer) = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file));
            (None, Some(layer))
        }
        None => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}
