// seqgan CLI entry point.
//
// Usage:
//   seqgan init-config --out run.json [--name N] [--features F] [--units U]
//     [--batch-size B]
//   seqgan train --config run.json (--data set.json | --midi-dir DIR)
//     [--restore] [--seed N] [--epochs N]
//   seqgan generate --config run.json --out DIR [--count N] [--steps N]
//     [--format midi|json] [--seed N]
//
// `train` starts a session (fresh or restored), runs the adversarial loop,
// and ends the session, which writes the end-of-session checkpoint.
// `generate` restores the newest checkpoint of the configured model and
// writes one file per generated sequence into DIR.
//
// Log verbosity follows RUST_LOG (default "info").

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use seqgan::samples::{tensor_to_sequences, write_sequences};
use seqgan::{ModelConfig, RunConfig, SampleFormat, Session, SessionOptions, TrainingSet};
use seqgan_prng::SeqRng;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "seqgan")]
#[command(about = "Train and sample an adversarial GRU sequence generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default run configuration
    InitConfig {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "seqgan")]
        name: String,
        /// Features per timestep (156 for piano rolls)
        #[arg(long, default_value_t = seqgan_midi::FEATURE_COUNT)]
        features: usize,
        #[arg(long, default_value_t = 128)]
        units: usize,
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },
    /// Train a model, then end the session
    Train {
        #[arg(long)]
        config: PathBuf,
        /// JSON training set
        #[arg(long, conflicts_with = "midi_dir", required_unless_present = "midi_dir")]
        data: Option<PathBuf>,
        /// Directory of .mid files to use as the training set
        #[arg(long)]
        midi_dir: Option<PathBuf>,
        /// Continue from the newest checkpoint
        #[arg(long)]
        restore: bool,
        #[arg(long)]
        seed: Option<u64>,
        /// Override the configured epoch count
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Sample the newest checkpoint
    Generate {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value_t = 50)]
        steps: usize,
        #[arg(long, value_enum, default_value_t = FormatArg::Midi)]
        format: FormatArg,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Midi,
    Json,
}

impl From<FormatArg> for SampleFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Midi => SampleFormat::Midi,
            FormatArg::Json => SampleFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::InitConfig {
            out,
            name,
            features,
            units,
            batch_size,
        } => {
            let model = ModelConfig::new(name, features, units, batch_size);
            model.validate()?;
            RunConfig::new(model)
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            info!(path = %out.display(), "wrote default configuration");
        }
        Command::Train {
            config,
            data,
            midi_dir,
            restore,
            seed,
            epochs,
        } => {
            let mut run = load_config(&config)?;
            if let Some(epochs) = epochs {
                run.training.epochs = epochs;
            }
            let set = match (data, midi_dir) {
                (Some(path), _) => TrainingSet::from_json_file(&path)
                    .with_context(|| format!("reading training set {}", path.display()))?,
                (None, Some(dir)) => {
                    let corpus = seqgan_midi::load_corpus(&dir)
                        .with_context(|| format!("reading MIDI corpus {}", dir.display()))?;
                    TrainingSet::from_sequences(corpus)
                }
                (None, None) => anyhow::bail!("one of --data or --midi-dir is required"),
            };

            let options = SessionOptions {
                restore,
                seed,
                ..SessionOptions::from_store(&run.store)
            };
            let mut session = Session::start(run.model.clone(), options)?;
            let report = session.train(&set, &run.training)?;
            info!(
                batches = report.batches,
                generator_updates = report.generator_updates,
                discriminator_updates = report.discriminator_updates,
                discriminator_skips = report.discriminator_skips,
                "training finished"
            );
            let path = session.end()?;
            info!(path = %path.display(), "final checkpoint");
        }
        Command::Generate {
            config,
            out,
            count,
            steps,
            format,
            seed,
        } => {
            let run = load_config(&config)?;
            let options = SessionOptions {
                restore: true,
                ..SessionOptions::from_store(&run.store)
            };
            let session = Session::start(run.model.clone(), options)?;
            let samples = match seed {
                Some(seed) => session.generate_sequence_with(&mut SeqRng::new(seed), count, steps)?,
                None => session.generate_sequence(count, steps)?,
            };
            let format = SampleFormat::from(format);
            let writer = format.writer();
            let paths = write_sequences(&out, &tensor_to_sequences(&samples)?, writer.as_ref())?;
            info!(count = paths.len(), dir = %out.display(), "sequences written");
        }
    }
    Ok(())
}

fn load_config(path: &std::path::Path) -> Result<RunConfig> {
    RunConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}
