pub mod ppg;

use crate::error::Result;
use crate::signal::{BeatTable, Waveform};

/// Turns a filtered waveform into a beat table. Implementations own the
/// fiducial detector and the biomarker catalog; aggregation only sees the table.
pub trait BeatAnalyzer {
    /// Ordered biomarker names every returned table is keyed to.
    fn biomarkers(&self) -> Vec<String>;

    /// Fails with `PipelineError::SignalQuality` when too few beats can be located.
    fn detect_and_measure(&self, filtered: &Waveform) -> Result<BeatTable>;
}

pub use ppg::PpgBeatAnalyzer;
