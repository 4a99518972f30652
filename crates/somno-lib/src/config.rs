use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default PPG sampling rate (Hz).
pub const DEFAULT_FS: f64 = 100.0;
/// AASM scoring epoch (seconds).
pub const DEFAULT_EPOCH_S: f64 = 30.0;

/// Bandpass parameters applied before beat detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// High-pass cutoff (Hz).
    pub low_hz: f64,
    /// Low-pass cutoff (Hz).
    pub high_hz: f64,
    /// Number of cascaded single-pole stages per side.
    pub order: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            low_hz: 0.5,
            high_hz: 12.0,
            order: 4,
        }
    }
}

/// Parameters of the PPG beat analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Highest plausible heart rate; sets the refractory distance between peaks.
    pub max_hr_bpm: f64,
    /// Peak threshold as a fraction of the distance between mean and maximum.
    pub threshold_scale: f64,
    /// Leading segment excluded from the threshold estimate (seconds).
    pub settle_s: f64,
    /// Fewer beats than this in the whole recording is a signal-quality failure.
    pub min_beats: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_hr_bpm: 180.0,
            threshold_scale: 0.3,
            settle_s: 1.0,
            min_beats: 10,
        }
    }
}

/// Everything the extraction stage needs besides the input files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sampling rate of the waveform file (Hz); not stored in the file itself.
    pub fs: f64,
    /// Epoch duration (seconds).
    pub epoch_s: f64,
    pub filter: FilterConfig,
    pub analyzer: AnalyzerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fs: DEFAULT_FS,
            epoch_s: DEFAULT_EPOCH_S,
            filter: FilterConfig::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(text)
            .map_err(|e| PipelineError::config(format!("parsing config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fs.is_finite() && self.fs > 0.0) {
            return Err(PipelineError::config(format!(
                "sample rate must be positive, got {}",
                self.fs
            )));
        }
        if !(self.epoch_s.is_finite() && self.epoch_s > 0.0) {
            return Err(PipelineError::config(format!(
                "epoch duration must be positive, got {}",
                self.epoch_s
            )));
        }
        let f = &self.filter;
        if !(f.low_hz >= 0.0 && f.high_hz > f.low_hz) {
            return Err(PipelineError::config(format!(
                "filter band {}..{} Hz is empty",
                f.low_hz, f.high_hz
            )));
        }
        if f.high_hz >= self.fs * 0.5 {
            return Err(PipelineError::config(format!(
                "filter high cutoff {} Hz is at or above Nyquist ({} Hz)",
                f.high_hz,
                self.fs * 0.5
            )));
        }
        if f.order == 0 {
            return Err(PipelineError::config("filter order must be at least 1"));
        }
        let a = &self.analyzer;
        if !(a.max_hr_bpm > 0.0) || !(a.threshold_scale >= 0.0 && a.threshold_scale < 1.0) {
            return Err(PipelineError::config(
                "analyzer needs max_hr_bpm > 0 and threshold_scale in [0, 1)",
            ));
        }
        Ok(())
    }
}
