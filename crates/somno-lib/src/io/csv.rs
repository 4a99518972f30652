use ::csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::epoch::FeatureMatrix;
use crate::error::{PipelineError, Result};
use crate::signal::{SleepStage, Waveform};

/// Header of the label passthrough file.
pub const LABEL_COLUMN: &str = "sleep_stage";

pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        })
    }
}

fn records(path: &Path) -> Result<Vec<StringRecord>> {
    ensure_exists(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;
    let mut out = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        out.push(record);
    }
    Ok(out)
}

/// Read the first column of a PPG export. A non-numeric first row is a header.
/// The file carries no timing, so `fs` comes from configuration.
pub fn read_waveform(path: &Path, fs: f64) -> Result<Waveform> {
    let rows = records(path)?;
    let mut data = Vec::with_capacity(rows.len());
    for (idx, record) in rows.iter().enumerate() {
        let field = record.get(0).unwrap_or("");
        match field.parse::<f64>() {
            Ok(value) => data.push(value),
            Err(_) if idx == 0 => continue,
            Err(_) => {
                return Err(PipelineError::config(format!(
                    "{} line {}: '{}' is not a number",
                    path.display(),
                    idx + 1,
                    field
                )))
            }
        }
    }
    Waveform::new(fs, data)
}

fn parse_stage(field: &str) -> Option<SleepStage> {
    if let Ok(v) = field.parse::<i64>() {
        return SleepStage::from_ordinal(v);
    }
    // pandas round-trips integer columns with NaN as floats ("2.0")
    let v = field.parse::<f64>().ok()?;
    if v.fract() == 0.0 {
        SleepStage::from_ordinal(v as i64)
    } else {
        None
    }
}

/// Read one sleep stage per epoch from the `sleep_stage` column (or the only column).
pub fn read_labels(path: &Path) -> Result<Vec<SleepStage>> {
    let rows = records(path)?;
    let mut column = 0;
    let mut body = &rows[..];
    if let Some(first) = rows.first() {
        if let Some(idx) = first
            .iter()
            .position(|h| h.eq_ignore_ascii_case(LABEL_COLUMN))
        {
            column = idx;
            body = &rows[1..];
        } else if first.get(0).map_or(true, |f| f.parse::<f64>().is_err()) {
            body = &rows[1..];
        }
    }
    let header_offset = rows.len() - body.len();
    let mut labels = Vec::with_capacity(body.len());
    for (idx, record) in body.iter().enumerate() {
        let field = record.get(column).unwrap_or("");
        let stage = parse_stage(field).ok_or_else(|| {
            PipelineError::config(format!(
                "{} line {}: sleep stage '{}' is not one of 0, 1, 2, 3",
                path.display(),
                idx + header_offset + 1,
                field
            ))
        })?;
        labels.push(stage);
    }
    if labels.is_empty() {
        return Err(PipelineError::config(format!(
            "{} contains no sleep stage labels",
            path.display()
        )));
    }
    Ok(labels)
}

/// Output written to a sibling temp file, not yet visible at its target path.
/// Dropping it without [`StagedFile::persist`] removes the temp file.
#[derive(Debug)]
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename into place.
    pub fn persist(self) -> Result<()> {
        self.tmp
            .persist(&self.target)
            .map_err(|e| PipelineError::Io(e.error))?;
        Ok(())
    }
}

/// Persist every staged file, or none if any one of them cannot be staged.
/// A rename failure part way removes the files already moved into place.
pub fn persist_all(staged: Vec<StagedFile>) -> Result<()> {
    let mut done: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for file in staged {
        let target = file.target.clone();
        if let Err(err) = file.persist() {
            for path in &done {
                let _ = fs::remove_file(path);
            }
            return Err(err);
        }
        done.push(target);
    }
    Ok(())
}

fn stage<F>(path: &Path, fill: F) -> Result<StagedFile>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    fill(tmp.as_file_mut())?;
    tmp.as_file_mut().sync_all()?;
    Ok(StagedFile {
        tmp,
        target: path.to_path_buf(),
    })
}

pub fn stage_features(path: &Path, matrix: &FeatureMatrix) -> Result<StagedFile> {
    stage(path, |out| {
        let mut writer = WriterBuilder::new().from_writer(out);
        writer.write_record(&matrix.columns)?;
        for row in &matrix.rows {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    })
}

pub fn stage_labels(path: &Path, labels: &[SleepStage]) -> Result<StagedFile> {
    stage(path, |out| {
        let mut writer = WriterBuilder::new().from_writer(out);
        writer.write_record([LABEL_COLUMN])?;
        for stage in labels {
            writer.write_record([stage.ordinal().to_string()])?;
        }
        writer.flush()?;
        Ok(())
    })
}

pub fn write_labels(path: &Path, labels: &[SleepStage]) -> Result<()> {
    stage_labels(path, labels)?.persist()
}

pub fn write_waveform(path: &Path, wf: &Waveform, column: &str) -> Result<()> {
    stage(path, |out| {
        let mut writer = WriterBuilder::new().from_writer(out);
        writer.write_record([column])?;
        for v in &wf.data {
            writer.write_record([v.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    })?
    .persist()
}
