//! Sleep-stage classifier training and evaluation over extracted epoch features.

pub mod forest;
pub mod metrics;
pub mod split;

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim};
use log::info;
use serde::{Deserialize, Serialize};
use somno_lib::{io::csv::read_labels, SleepStage};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub use forest::{ForestParams, RandomForest};
pub use metrics::ClassMetrics;
pub use split::{stratified_split, Split};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainOptions {
    pub test_fraction: f64,
    pub forest: ForestParams,
    /// How many of the most important features to report.
    pub top_features: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            test_fraction: 0.3,
            forest: ForestParams::default(),
            top_features: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub train_size: usize,
    pub test_size: usize,
    pub accuracy: f64,
    pub kappa: f64,
    pub confusion: Vec<Vec<usize>>,
    pub classes: Vec<ClassMetrics>,
    pub macro_f1: f64,
    pub top_features: Vec<FeatureImportance>,
}

/// Read the feature CSV written by the extraction stage.
pub fn read_feature_table(path: &Path) -> Result<FeatureTable> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening features {}", path.display()))?;
    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading feature row {}", idx + 1))?;
        let row = record
            .iter()
            .map(|field| {
                field
                    .parse::<f64>()
                    .with_context(|| format!("row {}: '{}' is not a number", idx + 1, field))
            })
            .collect::<Result<Vec<f64>>>()?;
        if row.len() != columns.len() {
            bail!(
                "row {} has {} values, header has {}",
                idx + 1,
                row.len(),
                columns.len()
            );
        }
        if row.iter().any(|v| !v.is_finite()) {
            bail!("row {} contains missing or non-finite values", idx + 1);
        }
        rows.push(row);
    }
    Ok(FeatureTable { columns, rows })
}

fn stage_names() -> Vec<&'static str> {
    SleepStage::ALL.iter().map(|s| s.name()).collect()
}

/// Stratified split, forest fit, and test-set metrics.
pub fn train_and_evaluate(
    table: &FeatureTable,
    labels: &[SleepStage],
    opts: &TrainOptions,
) -> Result<Evaluation> {
    if table.rows.len() != labels.len() {
        bail!(
            "feature rows ({}) and labels ({}) differ",
            table.rows.len(),
            labels.len()
        );
    }
    if !(opts.test_fraction > 0.0 && opts.test_fraction < 1.0) {
        bail!("test fraction must be in (0, 1), got {}", opts.test_fraction);
    }
    let y: Vec<usize> = labels.iter().map(|s| s.ordinal()).collect();
    let split = stratified_split(&y, opts.test_fraction, opts.forest.seed);
    if split.train.is_empty() || split.test.is_empty() {
        bail!(
            "not enough epochs to split ({} train, {} test)",
            split.train.len(),
            split.test.len()
        );
    }
    info!(
        "training on {} epochs, testing on {}",
        split.train.len(),
        split.test.len()
    );

    let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<usize>) {
        (
            idx.iter().map(|&i| table.rows[i].clone()).collect(),
            idx.iter().map(|&i| y[i]).collect(),
        )
    };
    let (x_train, y_train) = pick(&split.train);
    let (x_test, y_test) = pick(&split.test);

    let n_classes = SleepStage::ALL.len();
    let forest = RandomForest::fit(&x_train, &y_train, n_classes, &opts.forest);
    let y_pred = forest.predict(&x_test);

    let confusion = metrics::confusion_matrix(&y_test, &y_pred, n_classes);
    let classes = metrics::per_class(&confusion, &stage_names());
    let seen: Vec<&ClassMetrics> = classes
        .iter()
        .filter(|m| m.support > 0 || confusion.iter().any(|row| row[m.class] > 0))
        .collect();
    let macro_f1 = if seen.is_empty() {
        0.0
    } else {
        seen.iter().map(|m| m.f1).sum::<f64>() / seen.len() as f64
    };

    let mut ranked: Vec<FeatureImportance> = table
        .columns
        .iter()
        .zip(forest.feature_importances())
        .map(|(name, &importance)| FeatureImportance {
            feature: name.clone(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked.truncate(opts.top_features);

    Ok(Evaluation {
        train_size: split.train.len(),
        test_size: split.test.len(),
        accuracy: metrics::accuracy(&confusion),
        kappa: metrics::cohen_kappa(&confusion),
        confusion,
        classes,
        macro_f1,
        top_features: ranked,
    })
}

/// Load both CSVs and evaluate.
pub fn train_from_files(
    features_path: &Path,
    labels_path: &Path,
    opts: &TrainOptions,
) -> Result<Evaluation> {
    let table = read_feature_table(features_path)?;
    let labels = read_labels(labels_path)
        .with_context(|| format!("loading labels {}", labels_path.display()))?;
    train_and_evaluate(&table, &labels, opts)
}

/// Plain-text classification report.
pub fn format_report(eval: &Evaluation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "accuracy: {:.4}", eval.accuracy);
    let _ = writeln!(out, "cohen kappa: {:.4}", eval.kappa);
    let _ = writeln!(
        out,
        "\n{:>10} {:>9} {:>9} {:>9} {:>9}",
        "", "precision", "recall", "f1", "support"
    );
    for m in &eval.classes {
        let _ = writeln!(
            out,
            "{:>10} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            m.name, m.precision, m.recall, m.f1, m.support
        );
    }
    let _ = writeln!(out, "\nmacro f1: {:.4}", eval.macro_f1);
    let _ = writeln!(out, "\nconfusion (rows = true):");
    for row in &eval.confusion {
        let cells: Vec<String> = row.iter().map(|c| format!("{:>5}", c)).collect();
        let _ = writeln!(out, "{}", cells.join(""));
    }
    if !eval.top_features.is_empty() {
        let _ = writeln!(out, "\ntop features:");
        for f in &eval.top_features {
            let _ = writeln!(out, "  {:<24} {:.4}", f.feature, f.importance);
        }
    }
    out
}

pub fn write_report(path: &Path, eval: &Evaluation) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("creating report {}", path.display()))?;
    serde_json::to_writer_pretty(file, eval)?;
    Ok(())
}

pub fn read_report(path: &Path) -> Result<Evaluation> {
    let file = fs::File::open(path).with_context(|| format!("opening report {}", path.display()))?;
    let eval = serde_json::from_reader::<_, Evaluation>(file)
        .with_context(|| format!("parsing report {}", path.display()))?;
    Ok(eval)
}
