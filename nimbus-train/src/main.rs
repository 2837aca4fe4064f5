//! nimbus-train - builds the emotion model bundle served by nimbus-server

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nimbus_common::audio::FeatureKind;
use nimbus_common::model::{ForestParams, DEFAULT_EMOTIONS};
use nimbus_train::corpus::{scan_folders, scan_ravdess};
use nimbus_train::dataset::synthetic_dataset;
use nimbus_train::train::{train_on_clips, train_on_dataset, TrainOptions, TrainOutcome};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "nimbus-train")]
#[command(about = "Train the speech emotion classifier")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on the RAVDESS corpus (<dir>/<actor>/*.wav)
    Ravdess {
        /// Corpus root
        #[arg(long)]
        data_dir: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Train on one sub-directory per emotion
    Folders {
        /// Corpus root
        #[arg(long)]
        data_dir: PathBuf,

        /// Emotions to include (default: every sub-directory)
        #[arg(long, value_delimiter = ',')]
        emotions: Option<Vec<String>>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Train a dummy model on random features (testing only)
    Synthetic {
        /// Number of random samples
        #[arg(long, default_value_t = 1000)]
        samples: usize,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Feature layout: summary or sequence
    #[arg(long, default_value = "summary")]
    features: FeatureKind,

    /// Output model bundle
    #[arg(short, long, default_value = "model/emotion_model.json")]
    output: PathBuf,

    /// Number of trees
    #[arg(long, default_value_t = 100)]
    trees: usize,

    /// Maximum tree depth (unbounded when omitted)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Seed for splitting and training
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Fraction of clips held out for testing
    #[arg(long, default_value_t = 0.2)]
    test_size: f64,

    /// Fraction of clips held out for validation
    #[arg(long, default_value_t = 0.2)]
    val_size: f64,

    /// Write a JSON evaluation report here
    #[arg(long)]
    report: Option<PathBuf>,
}

impl CommonArgs {
    fn options(&self) -> TrainOptions {
        TrainOptions {
            features: self.features,
            output: self.output.clone(),
            forest: ForestParams {
                n_trees: self.trees,
                max_depth: self.max_depth,
                seed: self.seed,
                ..ForestParams::default()
            },
            test_size: self.test_size,
            val_size: self.val_size,
            report: self.report.clone(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nimbus_train=info,nimbus_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("nimbus-train v{}", env!("CARGO_PKG_VERSION"));

    let (outcome, opts) = match cli.command {
        Command::Ravdess { data_dir, common } => {
            let opts = common.options();
            let clips = scan_ravdess(&data_dir)
                .with_context(|| format!("Failed to scan {}", data_dir.display()))?;
            let corpus = format!("ravdess:{}", data_dir.display());
            (train_on_clips(&corpus, &clips, &opts)?, opts)
        }
        Command::Folders {
            data_dir,
            emotions,
            common,
        } => {
            let opts = common.options();
            let clips = scan_folders(&data_dir, emotions.as_deref())
                .with_context(|| format!("Failed to scan {}", data_dir.display()))?;
            let corpus = format!("folders:{}", data_dir.display());
            (train_on_clips(&corpus, &clips, &opts)?, opts)
        }
        Command::Synthetic { samples, common } => {
            let opts = common.options();
            let dataset = synthetic_dataset(
                samples,
                opts.features.dimension(),
                &DEFAULT_EMOTIONS,
                opts.forest.seed,
            )?;
            let outcome = train_on_dataset("synthetic", &dataset, &opts)?;
            println!("Note: This is a dummy model for testing purposes only.");
            (outcome, opts)
        }
    };

    print_summary(&outcome, &opts);
    Ok(())
}

fn print_summary(outcome: &TrainOutcome, opts: &TrainOptions) {
    let summary = &outcome.model.training_summary;
    println!();
    println!("Corpus:   {}", summary.corpus);
    println!("Labels:   {}", outcome.model.labels.join(", "));
    println!(
        "Samples:  {} train / {} validation / {} test",
        summary.train_samples, summary.validation_samples, summary.test_samples
    );
    if let Some(acc) = outcome.validation_accuracy {
        println!("Validation accuracy: {:.4}", acc);
    }
    println!();
    println!("Test set evaluation");
    println!("{}", outcome.test_report.render());
    println!("Model saved to {}", opts.output.display());
    if let Some(report) = &opts.report {
        println!("Report saved to {}", report.display());
    }
}
