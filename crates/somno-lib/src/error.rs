//! Error taxonomy for the feature extraction pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal pipeline errors. Data-completeness problems are not errors; they are
/// repaired by the epoch fill policy and only reported as counts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing input file: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("signal quality too low: {0}")]
    SignalQuality(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Configuration(msg.into())
    }

    pub fn signal_quality(msg: impl Into<String>) -> Self {
        PipelineError::SignalQuality(msg.into())
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
