//! Synthetic PPG recording with a matching hypnogram, for demos and tests.

use crate::config::DEFAULT_EPOCH_S;
use crate::error::{PipelineError, Result};
use crate::io::csv::{write_labels, write_waveform};
use crate::signal::{SleepStage, Waveform};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

pub const PPG_FILE: &str = "ppg_signal.csv";
pub const LABELS_FILE: &str = "sleep_labels.csv";

#[derive(Debug, Clone)]
pub struct SyntheticRecording {
    pub waveform: Waveform,
    pub labels: Vec<SleepStage>,
}

/// Slowly varying heart rate (55–65 bpm), gaussian noise and respiratory
/// baseline drift. One label per complete 30 s epoch: 2 Wake, 6 Light, 6 Deep,
/// then REM.
pub fn generate(minutes: f64, fs: f64, seed: u64) -> Result<SyntheticRecording> {
    if !(minutes > 0.0 && fs > 0.0) {
        return Err(PipelineError::config(
            "synthetic recording needs positive duration and sample rate",
        ));
    }
    let samples = (minutes * 60.0 * fs).round() as usize;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut phase = 0.0;
    let mut data = Vec::with_capacity(samples);
    for i in 0..samples {
        let t = i as f64 / fs;
        let hr_hz = (60.0 + 5.0 * (2.0 * PI * 0.005 * t).sin()) / 60.0;
        phase += hr_hz;
        let pulse = (2.0 * PI * phase / fs).sin();
        let drift = 0.5 * (2.0 * PI * 0.2 * t).sin();
        data.push(pulse + 0.2 * rng.sample::<f64, _>(StandardNormal) + drift);
    }

    let epochs = (samples as f64 / (DEFAULT_EPOCH_S * fs)) as usize;
    let labels = (0..epochs)
        .map(|i| match i {
            0..=1 => SleepStage::Wake,
            2..=7 => SleepStage::Light,
            8..=13 => SleepStage::Deep,
            _ => SleepStage::Rem,
        })
        .collect();

    Ok(SyntheticRecording {
        waveform: Waveform::new(fs, data)?,
        labels,
    })
}

/// Write `ppg_signal.csv` and `sleep_labels.csv` into `dir`.
pub fn write_recording(dir: &Path, recording: &SyntheticRecording) -> Result<()> {
    fs::create_dir_all(dir)?;
    write_waveform(&dir.join(PPG_FILE), &recording.waveform, "ppg")?;
    write_labels(&dir.join(LABELS_FILE), &recording.labels)?;
    Ok(())
}
