//! Extraction stage: waveform + labels → feature matrix + label passthrough.

use crate::{
    config::PipelineConfig,
    detectors::{BeatAnalyzer, PpgBeatAnalyzer},
    epoch::{aggregate, AggregationReport, FeatureMatrix},
    error::{PipelineError, Result},
    filter::bandpass,
    io::csv::{ensure_exists, persist_all, read_labels, read_waveform, stage_features, stage_labels},
    signal::{SleepStage, Waveform},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What an extraction run produced, printed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub samples: usize,
    pub duration_s: f64,
    pub beats: usize,
    pub epochs: usize,
    pub columns: usize,
    pub report: AggregationReport,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub features: FeatureMatrix,
    pub labels: Vec<SleepStage>,
    pub summary: ExtractionSummary,
}

/// Filter, detect beats and aggregate them into one row per label.
pub fn extract_with(
    analyzer: &dyn BeatAnalyzer,
    cfg: &PipelineConfig,
    raw: &Waveform,
    labels: Vec<SleepStage>,
) -> Result<Extraction> {
    cfg.validate()?;
    if labels.is_empty() {
        return Err(PipelineError::config("at least one epoch label is required"));
    }
    let filtered = bandpass(raw, &cfg.filter)?;
    let table = analyzer.detect_and_measure(&filtered)?;
    if let Some(last) = table.beats().last() {
        if last.time_s > raw.duration() {
            return Err(PipelineError::signal_quality(format!(
                "beat at {:.3} s is past the end of the {:.3} s recording",
                last.time_s,
                raw.duration()
            )));
        }
    }
    info!(
        "detected {} beats in {:.1} s of signal",
        table.len(),
        raw.duration()
    );

    let names = analyzer.biomarkers();
    let features = aggregate(&table, labels.len(), cfg.epoch_s, &names)?;
    if features.n_rows() != labels.len() {
        return Err(PipelineError::config(format!(
            "feature rows ({}) do not match labels ({})",
            features.n_rows(),
            labels.len()
        )));
    }

    let report = features.report;
    if report.empty_epochs > 0 {
        warn!(
            "{} of {} epochs contain no beats",
            report.empty_epochs, report.epochs
        );
    }
    if !report.is_complete() {
        warn!(
            "filled {} missing values ({} forward, {} backward, {} zero)",
            report.missing_cells, report.forward_filled, report.backward_filled, report.zero_filled
        );
    }

    let summary = ExtractionSummary {
        samples: raw.len(),
        duration_s: raw.duration(),
        beats: table.len(),
        epochs: features.n_rows(),
        columns: features.n_cols(),
        report,
    };
    Ok(Extraction {
        features,
        labels,
        summary,
    })
}

pub fn extract(cfg: &PipelineConfig, raw: &Waveform, labels: Vec<SleepStage>) -> Result<Extraction> {
    extract_with(&PpgBeatAnalyzer::new(cfg.analyzer), cfg, raw, labels)
}

/// File-to-file extraction. Both inputs are checked before anything is read.
/// Outputs are staged next to their targets and only renamed into place once
/// every one of them has been written.
pub fn run_extraction(
    cfg: &PipelineConfig,
    ppg_path: &Path,
    labels_path: &Path,
    features_out: &Path,
    labels_out: &Path,
) -> Result<ExtractionSummary> {
    ensure_exists(ppg_path)?;
    ensure_exists(labels_path)?;
    cfg.validate()?;

    info!("loading PPG from {}", ppg_path.display());
    let raw = read_waveform(ppg_path, cfg.fs)?;
    let labels = read_labels(labels_path)?;
    info!("{} samples, {} epoch labels", raw.len(), labels.len());

    let extraction = extract(cfg, &raw, labels)?;
    let staged = vec![
        stage_features(features_out, &extraction.features)?,
        stage_labels(labels_out, &extraction.labels)?,
    ];
    persist_all(staged)?;
    info!(
        "wrote {} x {} features to {}",
        extraction.features.n_rows(),
        extraction.features.n_cols(),
        features_out.display()
    );
    Ok(extraction.summary)
}
