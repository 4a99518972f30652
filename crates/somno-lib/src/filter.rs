//! Zero-phase bandpass used ahead of beat detection.

use crate::config::FilterConfig;
use crate::error::{PipelineError, Result};
use crate::signal::Waveform;

/// Bandpass `wf` with `order` cascaded single-pole high- and low-pass stages,
/// run forward and then backward so fiducial points keep their position.
pub fn bandpass(wf: &Waveform, cfg: &FilterConfig) -> Result<Waveform> {
    if cfg.high_hz >= wf.fs * 0.5 || cfg.high_hz <= cfg.low_hz {
        return Err(PipelineError::config(format!(
            "cannot bandpass {}..{} Hz at fs {} Hz",
            cfg.low_hz, cfg.high_hz, wf.fs
        )));
    }
    if wf.is_empty() {
        return Ok(wf.clone());
    }
    let mean = wf.data.iter().sum::<f64>() / wf.len() as f64;
    let mut data: Vec<f64> = wf.data.iter().map(|x| x - mean).collect();
    for _ in 0..2 {
        for _ in 0..cfg.order.max(1) {
            if cfg.low_hz > 0.0 {
                data = single_pole_highpass(&data, wf.fs, cfg.low_hz);
            }
            data = single_pole_lowpass(&data, wf.fs, cfg.high_hz);
        }
        data.reverse();
    }
    Ok(Waveform { fs: wf.fs, data })
}

fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev_y = 0.0;
    let mut prev_x = data[0];
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(fs: f64, hz: f64, secs: f64) -> Vec<f64> {
        (0..(fs * secs) as usize)
            .map(|i| (2.0 * PI * hz * i as f64 / fs).sin())
            .collect()
    }

    fn rms(data: &[f64]) -> f64 {
        (data.iter().map(|x| x * x).sum::<f64>() / data.len() as f64).sqrt()
    }

    #[test]
    fn removes_offset_and_keeps_cardiac_band() {
        let fs = 100.0;
        let data: Vec<f64> = sine(fs, 1.2, 20.0).iter().map(|x| x + 5.0).collect();
        let wf = Waveform::new(fs, data).unwrap();
        let out = bandpass(&wf, &FilterConfig::default()).unwrap();
        assert_eq!(out.len(), wf.len());
        let mid = &out.data[500..1500];
        let mean = mid.iter().sum::<f64>() / mid.len() as f64;
        assert!(mean.abs() < 0.1, "residual offset {}", mean);
        assert!(rms(mid) > 0.2, "passband attenuated to {}", rms(mid));
    }

    #[test]
    fn attenuates_high_frequency_noise() {
        let fs = 100.0;
        let wf = Waveform::new(fs, sine(fs, 40.0, 10.0)).unwrap();
        let out = bandpass(&wf, &FilterConfig::default()).unwrap();
        assert!(rms(&out.data[200..800]) < 0.2 * rms(&wf.data[200..800]));
    }

    #[test]
    fn peak_position_is_preserved() {
        let fs = 100.0;
        let wf = Waveform::new(fs, sine(fs, 1.0, 10.0)).unwrap();
        let out = bandpass(&wf, &FilterConfig::default()).unwrap();
        // sin peaks at 0.25 s + k; check the one at 5.25 s
        let window = &out.data[480..570];
        let (idx, _) = window
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        let peak = 480 + idx;
        assert!((peak as i64 - 525).abs() <= 3, "peak moved to {}", peak);
    }

    #[test]
    fn rejects_cutoff_above_nyquist() {
        let wf = Waveform::new(20.0, vec![0.0; 100]).unwrap();
        assert!(bandpass(&wf, &FilterConfig::default()).is_err());
    }
}
