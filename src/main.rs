//! DigitSketch - handwritten digit recognition from freehand strokes
//!
//! Normalizes drawings into 28x28 samples and classifies them on a
//! background worker thread.

mod app;
mod classify;
mod config;
mod drawing;
mod shared;
mod storage;
mod vision;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::app::{load_input, preview, DigitSketchApp};
use crate::config::AppConfig;
use crate::drawing::load_events;
use crate::vision::Normalizer;

/// DigitSketch - handwritten digit recognition
#[derive(Parser, Debug)]
#[command(name = "digit-sketch")]
#[command(about = "Classify handwritten digits drawn as strokes or images")]
struct Args {
    /// Configuration file (defaults to config.toml in the config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Classifier path or URL, overriding the configuration
    #[arg(long)]
    classifier: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify strokes JSON files or images
    Classify {
        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Replay recorded pointer events, classifying after every stroke
    Replay {
        /// Events JSON file
        input: PathBuf,
    },
    /// Print the normalized sample of an input as text
    Preview {
        /// Input file
        input: PathBuf,
    },
    /// Write the default configuration file
    InitConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = load_or_create_config(args.config.as_deref());
    if let Some(source) = args.classifier {
        config.classifier.source = source;
    }

    match args.command {
        Command::InitConfig => init_config()?,
        Command::Preview { input } => {
            let buffer = load_input(&input, &config.drawing)?;
            let sample = Normalizer::new().normalize(&buffer)?;
            print!("{}", preview(&sample));
        }
        Command::Classify { inputs } => run_classify(config, &inputs)?,
        Command::Replay { input } => run_replay(config, &input)?,
    }

    Ok(())
}

/// Load configuration from file or create default
fn load_or_create_config(path: Option<&Path>) -> AppConfig {
    let config_path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => storage::get_config_dir().ok().map(|dir| dir.join("config.toml")),
    };

    if let Some(config_path) = config_path {
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return config;
                }
                Err(e) => warn!("Ignoring invalid configuration {:?}: {}", config_path, e),
            }
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

fn init_config() -> Result<()> {
    let path = storage::get_config_dir()?.join("config.toml");
    if path.exists() {
        warn!("Configuration already exists at {:?}", path);
        return Ok(());
    }
    config::save_config(&AppConfig::default(), &path)?;
    info!("Wrote default configuration to {:?}", path);
    Ok(())
}

fn run_classify(config: AppConfig, inputs: &[PathBuf]) -> Result<()> {
    let drawing_config = config.drawing.clone();
    let mut app = DigitSketchApp::start(config)?;

    let mut failures = 0;
    for input in inputs {
        let outcome = load_input(input, &drawing_config).and_then(|buffer| app.classify_buffer(&buffer));
        match outcome {
            Ok(Some(label)) => println!("{}: {}", input.display(), label),
            Ok(None) => println!("{}: -", input.display()),
            Err(e) => {
                error!("Failed to classify {:?}: {:#}", input, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} inputs failed", failures, inputs.len());
    }
    Ok(())
}

fn run_replay(config: AppConfig, input: &Path) -> Result<()> {
    let events = load_events(input)?;
    let mut app = DigitSketchApp::start(config)?;

    let labels = app.replay(&events)?;
    info!("Replayed {} events, {} labels delivered", events.len(), labels.len());
    for label in labels {
        println!("{}", label);
    }
    Ok(())
}
