use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;
use somno_lib::{
    pipeline::{run_extraction, ExtractionSummary},
    synth::{self, LABELS_FILE, PPG_FILE},
    PipelineConfig, PipelineError,
};
use somno_train::{format_report, train_from_files, write_report, Evaluation, TrainOptions};
use std::path::{Path, PathBuf};

const FEATURES_FILE: &str = "features.csv";
const LABELS_PROCESSED_FILE: &str = "labels_processed.csv";
const REPORT_FILE: &str = "evaluation.json";

#[derive(Parser)]
#[command(
    name = "somno",
    version,
    about = "Sleep staging from PPG: epoch features and classifier evaluation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Extraction settings shared by `extract` and `run`.
#[derive(Args, Clone)]
struct ExtractOpts {
    /// TOML file with sample rate, epoch length, filter and analyzer settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Sampling rate of the PPG file in Hz (overrides the config file)
    #[arg(long)]
    fs: Option<f64>,
    /// Epoch length in seconds (overrides the config file)
    #[arg(long)]
    epoch_s: Option<f64>,
}

/// Classifier settings shared by `train` and `run`.
#[derive(Args, Clone)]
struct TrainOpts {
    #[arg(long, default_value_t = 150)]
    trees: usize,
    #[arg(long, default_value_t = 0.3)]
    test_fraction: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long)]
    max_depth: Option<usize>,
    #[arg(long, default_value_t = 20)]
    top_features: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic PPG recording and matching sleep labels
    Generate {
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 10.0)]
        minutes: f64,
        #[arg(long, default_value_t = 100.0)]
        fs: f64,
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
    /// Filter, detect beats and aggregate biomarkers into one feature row per epoch
    Extract {
        #[arg(long)]
        ppg: PathBuf,
        #[arg(long)]
        labels: PathBuf,
        #[arg(long)]
        features_out: PathBuf,
        #[arg(long)]
        labels_out: PathBuf,
        #[command(flatten)]
        opts: ExtractOpts,
    },
    /// Train a random forest on extracted features and report test-set metrics
    Train {
        #[arg(long)]
        features: PathBuf,
        #[arg(long)]
        labels: PathBuf,
        #[arg(long)]
        report_out: Option<PathBuf>,
        /// Print a text classification report instead of JSON
        #[arg(long)]
        text: bool,
        #[command(flatten)]
        opts: TrainOpts,
    },
    /// Extract then train, using the standard file names inside --data-dir
    Run {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        #[command(flatten)]
        extract: ExtractOpts,
        #[command(flatten)]
        train: TrainOpts,
    },
}

#[derive(Serialize)]
struct RunOutput {
    extraction: ExtractionSummary,
    evaluation: Evaluation,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Generate {
            out_dir,
            minutes,
            fs,
            seed,
        } => cmd_generate(&out_dir, minutes, fs, seed)?,
        Commands::Extract {
            ppg,
            labels,
            features_out,
            labels_out,
            opts,
        } => cmd_extract(&ppg, &labels, &features_out, &labels_out, &opts)?,
        Commands::Train {
            features,
            labels,
            report_out,
            text,
            opts,
        } => cmd_train(&features, &labels, report_out.as_deref(), text, &opts)?,
        Commands::Run {
            data_dir,
            extract,
            train,
        } => cmd_run(&data_dir, &extract, &train)?,
    }
    Ok(())
}

fn load_config(opts: &ExtractOpts) -> Result<PipelineConfig> {
    let mut cfg = match &opts.config {
        Some(path) => PipelineConfig::read(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(fs) = opts.fs {
        cfg.fs = fs;
    }
    if let Some(epoch_s) = opts.epoch_s {
        cfg.epoch_s = epoch_s;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn train_options(opts: &TrainOpts) -> TrainOptions {
    let mut options = TrainOptions {
        test_fraction: opts.test_fraction,
        top_features: opts.top_features,
        ..Default::default()
    };
    options.forest.n_estimators = opts.trees;
    options.forest.seed = opts.seed;
    options.forest.max_depth = opts.max_depth;
    options
}

fn cmd_generate(out_dir: &Path, minutes: f64, fs: f64, seed: u64) -> Result<()> {
    let recording = synth::generate(minutes, fs, seed)?;
    synth::write_recording(out_dir, &recording)
        .with_context(|| format!("writing synthetic data to {}", out_dir.display()))?;
    info!(
        "wrote {} samples and {} labels to {}",
        recording.waveform.len(),
        recording.labels.len(),
        out_dir.display()
    );
    let js = serde_json::json!({
        "samples": recording.waveform.len(),
        "epochs": recording.labels.len(),
        "ppg": out_dir.join(PPG_FILE),
        "labels": out_dir.join(LABELS_FILE),
    });
    println!("{}", js);
    Ok(())
}

fn cmd_extract(
    ppg: &Path,
    labels: &Path,
    features_out: &Path,
    labels_out: &Path,
    opts: &ExtractOpts,
) -> Result<()> {
    let cfg = load_config(opts)?;
    let summary = run_extraction(&cfg, ppg, labels, features_out, labels_out)?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_train(
    features: &Path,
    labels: &Path,
    report_out: Option<&Path>,
    text: bool,
    opts: &TrainOpts,
) -> Result<()> {
    let eval = train_from_files(features, labels, &train_options(opts))?;
    if let Some(path) = report_out {
        write_report(path, &eval)?;
    }
    if text {
        print!("{}", format_report(&eval));
    } else {
        println!("{}", serde_json::to_string(&eval)?);
    }
    Ok(())
}

fn cmd_run(data_dir: &Path, extract: &ExtractOpts, train: &TrainOpts) -> Result<()> {
    let ppg = data_dir.join(PPG_FILE);
    let labels = data_dir.join(LABELS_FILE);
    let cfg = load_config(extract)?;
    let features_out = data_dir.join(FEATURES_FILE);
    let labels_out = data_dir.join(LABELS_PROCESSED_FILE);
    let extraction = match run_extraction(&cfg, &ppg, &labels, &features_out, &labels_out) {
        Err(err @ PipelineError::MissingInput { .. }) => {
            return Err(anyhow::Error::new(err).context(format!(
                "run `somno generate --out-dir {}` to create example data",
                data_dir.display()
            )));
        }
        result => result?,
    };
    let evaluation = train_from_files(&features_out, &labels_out, &train_options(train))?;
    write_report(&data_dir.join(REPORT_FILE), &evaluation)?;
    info!(
        "accuracy {:.4}, kappa {:.4}",
        evaluation.accuracy, evaluation.kappa
    );
    let output = RunOutput {
        extraction,
        evaluation,
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}
