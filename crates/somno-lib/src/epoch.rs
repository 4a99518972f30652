//! Epoch aggregation: per-beat biomarkers → one fixed-width feature row per epoch.
//!
//! Epoch `i` covers `[i·D, (i+1)·D)`. Each biomarker contributes a `_mean` and a
//! `_std` column (sample standard deviation). Cells that cannot be computed are
//! resolved column by column: forward fill, then backward fill, then zero.

use crate::error::{PipelineError, Result};
use crate::signal::{Beat, BeatTable};
use serde::{Deserialize, Serialize};

/// Counts describing how much of the matrix had to be repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub epochs: usize,
    pub empty_epochs: usize,
    pub missing_cells: usize,
    pub forward_filled: usize,
    pub backward_filled: usize,
    pub zero_filled: usize,
}

impl AggregationReport {
    pub fn is_complete(&self) -> bool {
        self.missing_cells == 0
    }
}

/// Dense feature matrix, one row per epoch. Never contains NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub report: AggregationReport,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }
}

/// Column header for every biomarker, `[b1_mean, b1_std, b2_mean, …]`.
pub fn feature_columns(biomarker_names: &[String]) -> Vec<String> {
    biomarker_names
        .iter()
        .flat_map(|name| [format!("{}_mean", name), format!("{}_std", name)])
        .collect()
}

/// Aggregate a beat table into `num_epochs` rows of `epoch_duration_s` seconds.
///
/// `biomarker_names` selects (and orders) catalog columns; every name must exist
/// in the beat table. An empty beat table is valid and yields an all-zero matrix.
pub fn aggregate(
    table: &BeatTable,
    num_epochs: usize,
    epoch_duration_s: f64,
    biomarker_names: &[String],
) -> Result<FeatureMatrix> {
    if num_epochs == 0 {
        return Err(PipelineError::config("number of epochs must be at least 1"));
    }
    if !(epoch_duration_s.is_finite() && epoch_duration_s > 0.0) {
        return Err(PipelineError::config(format!(
            "epoch duration must be positive, got {}",
            epoch_duration_s
        )));
    }
    let slots = biomarker_names
        .iter()
        .map(|name| {
            table.column_index(name).ok_or_else(|| {
                PipelineError::config(format!("biomarker '{}' is not in the beat table", name))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut report = AggregationReport {
        epochs: num_epochs,
        ..Default::default()
    };
    let mut cells: Vec<Vec<Option<f64>>> = Vec::with_capacity(num_epochs);
    for i in 0..num_epochs {
        let beats = table.in_epoch(i, epoch_duration_s);
        if beats.is_empty() {
            report.empty_epochs += 1;
            cells.push(vec![None; slots.len() * 2]);
            continue;
        }
        let mut row = Vec::with_capacity(slots.len() * 2);
        for &slot in &slots {
            let (mean, std) = mean_and_sample_std(beats, slot);
            row.push(mean);
            row.push(std);
        }
        cells.push(row);
    }

    report.missing_cells = cells.iter().flatten().filter(|c| c.is_none()).count();
    let rows = resolve_missing(cells, slots.len() * 2, &mut report);

    Ok(FeatureMatrix {
        columns: feature_columns(biomarker_names),
        rows,
        report,
    })
}

/// Mean and N-1 standard deviation over the beats that carry a value in `slot`.
fn mean_and_sample_std(beats: &[Beat], slot: usize) -> (Option<f64>, Option<f64>) {
    let mut n = 0usize;
    let mut sum = 0.0;
    for value in beats.iter().filter_map(|b| b.values[slot]) {
        n += 1;
        sum += value;
    }
    if n == 0 {
        return (None, None);
    }
    let mean = sum / n as f64;
    if n < 2 {
        return (Some(mean), None);
    }
    let ss: f64 = beats
        .iter()
        .filter_map(|b| b.values[slot])
        .map(|v| (v - mean).powi(2))
        .sum();
    (Some(mean), Some((ss / (n as f64 - 1.0)).sqrt()))
}

fn resolve_missing(
    mut cells: Vec<Vec<Option<f64>>>,
    width: usize,
    report: &mut AggregationReport,
) -> Vec<Vec<f64>> {
    for col in 0..width {
        let mut last = None;
        for row in cells.iter_mut() {
            match row[col] {
                Some(v) => last = Some(v),
                None if last.is_some() => {
                    row[col] = last;
                    report.forward_filled += 1;
                }
                None => {}
            }
        }
        let mut next = None;
        for row in cells.iter_mut().rev() {
            match row[col] {
                Some(v) => next = Some(v),
                None if next.is_some() => {
                    row[col] = next;
                    report.backward_filled += 1;
                }
                None => {}
            }
        }
    }
    cells
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| {
                    cell.unwrap_or_else(|| {
                        report.zero_filled += 1;
                        0.0
                    })
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hr_table(rows: &[(f64, Option<f64>)]) -> BeatTable {
        let beats = rows
            .iter()
            .map(|&(t, hr)| Beat {
                onset: 0,
                peak: (t * 100.0) as usize,
                time_s: t,
                values: vec![hr],
            })
            .collect();
        BeatTable::new(vec!["hr".into()], beats).unwrap()
    }

    fn hr() -> Vec<String> {
        vec!["hr".into()]
    }

    #[test]
    fn worked_example_three_epochs() {
        let table = hr_table(&[(5.0, Some(60.0)), (35.0, Some(62.0)), (35.5, Some(58.0))]);
        let m = aggregate(&table, 3, 30.0, &hr()).unwrap();
        assert_eq!(m.columns, vec!["hr_mean", "hr_std"]);
        let std1 = 8.0f64.sqrt();
        assert_eq!(m.rows[0], vec![60.0, std1]);
        assert_eq!(m.rows[1], vec![60.0, std1]);
        assert_eq!(m.rows[2], vec![60.0, std1]);
        assert_eq!(m.report.empty_epochs, 1);
        assert_eq!(m.report.missing_cells, 3);
        assert_eq!(m.report.backward_filled, 1);
        assert_eq!(m.report.forward_filled, 2);
    }

    #[test]
    fn row_count_matches_epochs_for_sparse_tables() {
        let table = hr_table(&[(1.0, Some(70.0))]);
        for n in [1, 2, 17, 960] {
            let m = aggregate(&table, n, 30.0, &hr()).unwrap();
            assert_eq!(m.n_rows(), n);
            assert!(m.rows.iter().all(|r| r.len() == 2));
        }
    }

    #[test]
    fn empty_table_becomes_zeros() {
        let table = BeatTable::new(vec!["hr".into(), "ibi".into()], Vec::new()).unwrap();
        let names: Vec<String> = vec!["hr".into(), "ibi".into()];
        let m = aggregate(&table, 4, 30.0, &names).unwrap();
        assert_eq!(m.n_rows(), 4);
        assert_eq!(m.columns, vec!["hr_mean", "hr_std", "ibi_mean", "ibi_std"]);
        assert!(m.rows.iter().flatten().all(|&v| v == 0.0));
        assert_eq!(m.report.zero_filled, 16);
        assert_eq!(m.report.empty_epochs, 4);
    }

    #[test]
    fn boundary_beat_belongs_to_later_epoch() {
        let table = hr_table(&[(10.0, Some(50.0)), (30.0, Some(80.0)), (45.0, Some(80.0))]);
        let m = aggregate(&table, 2, 30.0, &hr()).unwrap();
        assert_eq!(m.rows[0][0], 50.0);
        assert_eq!(m.rows[1][0], 80.0);

        let d = 0.1;
        let k = 3;
        let table = hr_table(&[(k as f64 * d, Some(1.0))]);
        let m = aggregate(&table, 5, d, &hr()).unwrap();
        assert_eq!(m.report.empty_epochs, 4);
        // only epoch 3 holds a real value; its neighbours are filled from it
        assert_eq!(m.report.forward_filled, 1);
        assert_eq!(m.report.backward_filled, 3);
    }

    #[test]
    fn peak_timestamp_on_boundary_lands_in_later_epoch() {
        // 30.0 / 100.0 rounds below 3.0 * 0.1
        let table = hr_table(&[(0.05, Some(9.0)), (30.0 / 100.0, Some(1.0))]);
        let m = aggregate(&table, 5, 0.1, &hr()).unwrap();
        assert_eq!(m.column("hr_mean").unwrap(), vec![9.0, 9.0, 9.0, 1.0, 1.0]);
        assert_eq!(m.report.forward_filled, 3);
        assert_eq!(m.report.backward_filled, 0);
    }

    #[test]
    fn leading_gap_is_backward_filled_not_zeroed() {
        let table = hr_table(&[(95.0, Some(64.0)), (96.0, Some(66.0))]);
        let m = aggregate(&table, 4, 30.0, &hr()).unwrap();
        let means = m.column("hr_mean").unwrap();
        assert_eq!(means, vec![65.0; 4]);
        assert_eq!(m.report.zero_filled, 0);
    }

    #[test]
    fn forward_fill_takes_precedence() {
        let table = hr_table(&[(1.0, Some(55.0)), (2.0, Some(57.0))]);
        let m = aggregate(&table, 6, 30.0, &hr()).unwrap();
        let means = m.column("hr_mean").unwrap();
        assert_eq!(means, vec![56.0; 6]);
        assert_eq!(m.report.backward_filled, 0);
    }

    #[test]
    fn interior_gap_uses_preceding_value() {
        let table = hr_table(&[(1.0, Some(50.0)), (91.0, Some(90.0))]);
        let m = aggregate(&table, 4, 30.0, &hr()).unwrap();
        assert_eq!(m.column("hr_mean").unwrap(), vec![50.0, 50.0, 50.0, 90.0]);
    }

    #[test]
    fn missing_values_are_skipped_within_epoch() {
        let table = hr_table(&[(1.0, None), (2.0, Some(60.0)), (3.0, Some(64.0)), (4.0, None)]);
        let m = aggregate(&table, 1, 30.0, &hr()).unwrap();
        assert_eq!(m.rows[0][0], 62.0);
        assert!((m.rows[0][1] - 8.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn biomarker_with_no_valid_values_is_missing_not_zero() {
        let beats = vec![
            Beat {
                onset: 0,
                peak: 100,
                time_s: 1.0,
                values: vec![Some(60.0), None],
            },
            Beat {
                onset: 0,
                peak: 3100,
                time_s: 31.0,
                values: vec![Some(62.0), Some(0.4)],
            },
        ];
        let names: Vec<String> = vec!["hr".into(), "ipa".into()];
        let table = BeatTable::new(names.clone(), beats).unwrap();
        let m = aggregate(&table, 2, 30.0, &names).unwrap();
        // epoch 0 ipa_mean was missing and is backward filled from epoch 1
        assert_eq!(m.column("ipa_mean").unwrap(), vec![0.4, 0.4]);
        // a single valid value has no sample std anywhere; zero is the last resort
        assert_eq!(m.column("ipa_std").unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn selects_and_orders_requested_biomarkers() {
        let beats = vec![Beat {
            onset: 0,
            peak: 0,
            time_s: 0.0,
            values: vec![Some(1.0), Some(2.0), Some(3.0)],
        }];
        let table = BeatTable::new(vec!["a".into(), "b".into(), "c".into()], beats).unwrap();
        let names: Vec<String> = vec!["c".into(), "a".into()];
        let m = aggregate(&table, 1, 30.0, &names).unwrap();
        assert_eq!(m.columns, vec!["c_mean", "c_std", "a_mean", "a_std"]);
        assert_eq!(m.rows[0][0], 3.0);
        assert_eq!(m.rows[0][2], 1.0);

        let unknown: Vec<String> = vec!["z".into()];
        assert!(aggregate(&table, 1, 30.0, &unknown).is_err());
    }

    #[test]
    fn rejects_invalid_configuration() {
        let table = hr_table(&[]);
        assert!(matches!(
            aggregate(&table, 0, 30.0, &hr()),
            Err(PipelineError::Configuration(_))
        ));
        assert!(aggregate(&table, 3, 0.0, &hr()).is_err());
        assert!(aggregate(&table, 3, -30.0, &hr()).is_err());
        assert!(aggregate(&table, 3, f64::NAN, &hr()).is_err());
    }

    #[test]
    fn aggregation_is_deterministic() {
        let rows: Vec<(f64, Option<f64>)> = (0..500)
            .map(|i| (i as f64 * 0.83, Some(55.0 + (i % 13) as f64 * 0.7)))
            .collect();
        let table = hr_table(&rows);
        let a = aggregate(&table, 20, 30.0, &hr()).unwrap();
        let b = aggregate(&table, 20, 30.0, &hr()).unwrap();
        let bits = |m: &FeatureMatrix| -> Vec<u64> {
            m.rows.iter().flatten().map(|v| v.to_bits()).collect()
        };
        assert_eq!(bits(&a), bits(&b));
        assert!(a.rows.iter().flatten().all(|v| v.is_finite()));
    }
}
