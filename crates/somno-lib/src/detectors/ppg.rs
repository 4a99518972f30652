use crate::{
    config::AnalyzerConfig,
    detectors::BeatAnalyzer,
    error::{PipelineError, Result},
    signal::{Beat, BeatTable, Waveform},
};
use log::debug;

/// Per-beat biomarker catalog, in column order.
pub const PPG_BIOMARKERS: [&str; 13] = [
    "ibi",
    "hr",
    "tpi",
    "tsys",
    "tdia",
    "tsys_tdia",
    "amplitude",
    "rise_slope",
    "max_upslope",
    "pw50",
    "auc_sys",
    "auc_dia",
    "ipa",
];

/// Systolic-peak/onset detector with a small timing and morphology catalog.
#[derive(Debug, Clone, Default)]
pub struct PpgBeatAnalyzer {
    pub cfg: AnalyzerConfig,
}

impl PpgBeatAnalyzer {
    pub fn new(cfg: AnalyzerConfig) -> Self {
        Self { cfg }
    }
}

impl BeatAnalyzer for PpgBeatAnalyzer {
    fn biomarkers(&self) -> Vec<String> {
        PPG_BIOMARKERS.iter().map(|s| s.to_string()).collect()
    }

    fn detect_and_measure(&self, filtered: &Waveform) -> Result<BeatTable> {
        if filtered.data.iter().any(|x| !x.is_finite()) {
            return Err(PipelineError::signal_quality(
                "waveform contains non-finite samples",
            ));
        }
        let peaks = detect_systolic_peaks(filtered, &self.cfg);
        if peaks.len() < self.cfg.min_beats.max(1) {
            return Err(PipelineError::signal_quality(format!(
                "found {} beats, need at least {}",
                peaks.len(),
                self.cfg.min_beats
            )));
        }
        let onsets = locate_onsets(&filtered.data, &peaks, refractory(filtered.fs, &self.cfg));
        debug!("located {} systolic peaks", peaks.len());

        let beats = (0..peaks.len())
            .map(|k| Beat {
                onset: onsets[k],
                peak: peaks[k],
                time_s: peaks[k] as f64 / filtered.fs,
                values: measure_beat(filtered, &peaks, &onsets, k),
            })
            .collect();
        BeatTable::new(self.biomarkers(), beats)
    }
}

fn refractory(fs: f64, cfg: &AnalyzerConfig) -> usize {
    ((fs * 60.0 / cfg.max_hr_bpm).round() as usize).max(1)
}

/// Local maxima above an adaptive threshold, at least one refractory distance apart.
pub fn detect_systolic_peaks(wf: &Waveform, cfg: &AnalyzerConfig) -> Vec<usize> {
    let data = &wf.data;
    if data.len() < 3 {
        return Vec::new();
    }
    let settle = ((cfg.settle_s * wf.fs) as usize).min(data.len() / 4);
    let steady = &data[settle..];
    let mean = steady.iter().sum::<f64>() / steady.len() as f64;
    let max = steady.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let threshold = mean + cfg.threshold_scale * (max - mean);
    let min_dist = refractory(wf.fs, cfg);

    let mut peaks: Vec<usize> = Vec::new();
    for i in (settle + 1).max(1)..data.len() - 1 {
        let is_peak = data[i] > data[i - 1] && data[i] >= data[i + 1] && data[i] > threshold;
        if !is_peak {
            continue;
        }
        match peaks.last().copied() {
            Some(last) if i - last < min_dist => {
                if data[i] > data[last] {
                    let n = peaks.len();
                    peaks[n - 1] = i;
                }
            }
            _ => peaks.push(i),
        }
    }
    peaks
}

/// Pulse foot of each beat: the minimum between the previous peak and this one.
fn locate_onsets(data: &[f64], peaks: &[usize], search_back: usize) -> Vec<usize> {
    peaks
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            let start = if k == 0 {
                p.saturating_sub(search_back)
            } else {
                peaks[k - 1]
            };
            (start..=p).fold(start, |best, i| if data[i] < data[best] { i } else { best })
        })
        .collect()
}

fn ratio(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    match (num, den) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

fn measure_beat(wf: &Waveform, peaks: &[usize], onsets: &[usize], k: usize) -> Vec<Option<f64>> {
    let x = &wf.data;
    let fs = wf.fs;
    let p = peaks[k];
    let o = onsets[k];
    let next = onsets.get(k + 1).copied();
    let base = x[o];

    let ibi = (k > 0).then(|| (p - peaks[k - 1]) as f64 / fs);
    let hr = ratio(Some(60.0), ibi);
    let tpi = next.map(|n| (n - o) as f64 / fs);
    let tsys = (p > o).then(|| (p - o) as f64 / fs);
    let tdia = next.filter(|&n| n > p).map(|n| (n - p) as f64 / fs);
    let tsys_tdia = ratio(tsys, tdia);
    let amplitude = x[p] - base;
    let rise_slope = ratio(Some(amplitude), tsys);
    let max_upslope = (o + 1..=p)
        .map(|i| (x[i] - x[i - 1]) * fs)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
    let pw50 = pulse_width(x, o, p, next, base + amplitude * 0.5).map(|w| w as f64 / fs);
    let auc_sys = (p > o).then(|| x[o..p].iter().map(|v| v - base).sum::<f64>() / fs);
    let auc_dia = next
        .filter(|&n| n > p)
        .map(|n| x[p..n].iter().map(|v| v - base).sum::<f64>() / fs);
    let ipa = ratio(auc_dia, auc_sys.filter(|a| *a > 0.0));

    vec![
        ibi,
        hr,
        tpi,
        tsys,
        tdia,
        tsys_tdia,
        Some(amplitude),
        rise_slope,
        max_upslope,
        pw50,
        auc_sys,
        auc_dia,
        ipa,
    ]
}

/// Samples between the 50 % crossings around the peak.
fn pulse_width(x: &[f64], onset: usize, peak: usize, next: Option<usize>, level: f64) -> Option<usize> {
    let left = (onset..peak).rev().find(|&i| x[i] < level)?;
    let right = (peak..next?).find(|&i| x[i] < level)?;
    Some(right - left)
}
