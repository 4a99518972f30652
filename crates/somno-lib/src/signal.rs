use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Uniformly sampled PPG trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waveform {
    /// Sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl Waveform {
    pub fn new(fs: f64, data: Vec<f64>) -> Result<Self> {
        if !(fs.is_finite() && fs > 0.0) {
            return Err(PipelineError::config(format!(
                "sample rate must be positive, got {}",
                fs
            )));
        }
        Ok(Self { fs, data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
}

/// AASM-style sleep stage, stored on disk as its ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SleepStage {
    Wake = 0,
    Light = 1,
    Deep = 2,
    Rem = 3,
}

impl SleepStage {
    pub const ALL: [SleepStage; 4] = [
        SleepStage::Wake,
        SleepStage::Light,
        SleepStage::Deep,
        SleepStage::Rem,
    ];

    pub fn from_ordinal(value: i64) -> Option<Self> {
        match value {
            0 => Some(SleepStage::Wake),
            1 => Some(SleepStage::Light),
            2 => Some(SleepStage::Deep),
            3 => Some(SleepStage::Rem),
            _ => None,
        }
    }

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            SleepStage::Wake => "Wake",
            SleepStage::Light => "Light",
            SleepStage::Deep => "Deep",
            SleepStage::Rem => "REM",
        }
    }
}

/// One detected heartbeat. `time_s` always comes from the systolic peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub onset: usize,
    pub peak: usize,
    pub time_s: f64,
    /// Biomarker values in catalog order; `None` when not computable for this beat.
    pub values: Vec<Option<f64>>,
}

/// Beats sorted by timestamp, plus the biomarker catalog every row is keyed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatTable {
    names: Vec<String>,
    beats: Vec<Beat>,
}

impl BeatTable {
    pub fn new(names: Vec<String>, beats: Vec<Beat>) -> Result<Self> {
        for (idx, name) in names.iter().enumerate() {
            if names[..idx].contains(name) {
                return Err(PipelineError::config(format!(
                    "duplicate biomarker name '{}'",
                    name
                )));
            }
        }
        for (idx, beat) in beats.iter().enumerate() {
            if beat.values.len() != names.len() {
                return Err(PipelineError::config(format!(
                    "beat {} has {} biomarker values, catalog has {}",
                    idx,
                    beat.values.len(),
                    names.len()
                )));
            }
            if !beat.time_s.is_finite() || beat.time_s < 0.0 {
                return Err(PipelineError::config(format!(
                    "beat {} has invalid timestamp {}",
                    idx, beat.time_s
                )));
            }
        }
        if beats.windows(2).any(|w| w[1].time_s < w[0].time_s) {
            return Err(PipelineError::config("beats are not sorted by timestamp"));
        }
        Ok(Self { names, beats })
    }

    /// Build a table from `(timestamp, [(name, value)])` pairs. Values are joined to
    /// the catalog by name, never by position; absent names become missing.
    pub fn from_named_rows(names: Vec<String>, rows: Vec<(f64, Vec<(String, f64)>)>) -> Result<Self> {
        let mut beats = Vec::with_capacity(rows.len());
        for (time_s, fields) in rows {
            let mut values = vec![None; names.len()];
            for (field, value) in fields {
                let slot = names.iter().position(|n| *n == field).ok_or_else(|| {
                    PipelineError::config(format!("biomarker '{}' is not in the catalog", field))
                })?;
                values[slot] = if value.is_finite() { Some(value) } else { None };
            }
            beats.push(Beat {
                onset: 0,
                peak: 0,
                time_s,
                values,
            });
        }
        beats.sort_by(|a, b| a.time_s.total_cmp(&b.time_s));
        Self::new(names, beats)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Beats of epoch `index` for epochs of `duration_s` seconds, i.e. every beat
    /// whose [`epoch_index`] is `index`.
    pub fn in_epoch(&self, index: usize, duration_s: f64) -> &[Beat] {
        let lo = self
            .beats
            .partition_point(|b| epoch_index(b.time_s, duration_s) < index);
        let hi = self
            .beats
            .partition_point(|b| epoch_index(b.time_s, duration_s) <= index);
        &self.beats[lo..hi.max(lo)]
    }
}

/// Relative tolerance under which a timestamp counts as sitting on a boundary.
const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Epoch holding a beat at `time_s`, for half-open epochs `[i·D, (i+1)·D)`.
///
/// A timestamp on a boundary `k·D` belongs to epoch `k` even when `k·D` and the
/// timestamp were rounded differently (`30.0 / 100.0` against `3.0 * 0.1`).
pub fn epoch_index(time_s: f64, duration_s: f64) -> usize {
    let q = time_s / duration_s;
    let nearest = q.round();
    let idx = if (q - nearest).abs() <= BOUNDARY_TOLERANCE * nearest.max(1.0) {
        nearest
    } else {
        q.floor()
    };
    idx.max(0.0) as usize
}
