use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: usize,
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Rows are true classes, columns predicted classes.
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Vec<Vec<usize>> {
    let mut cm = vec![vec![0usize; n_classes]; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        cm[t][p] += 1;
    }
    cm
}

pub fn accuracy(cm: &[Vec<usize>]) -> f64 {
    let total: usize = cm.iter().flatten().sum();
    if total == 0 {
        return 0.0;
    }
    let correct: usize = (0..cm.len()).map(|i| cm[i][i]).sum();
    correct as f64 / total as f64
}

/// Cohen's kappa: agreement corrected for chance.
pub fn cohen_kappa(cm: &[Vec<usize>]) -> f64 {
    let total: usize = cm.iter().flatten().sum();
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    let po = accuracy(cm);
    let pe: f64 = (0..cm.len())
        .map(|i| {
            let row: usize = cm[i].iter().sum();
            let col: usize = cm.iter().map(|r| r[i]).sum();
            (row as f64 / n) * (col as f64 / n)
        })
        .sum();
    if (1.0 - pe).abs() < f64::EPSILON {
        return if po >= 1.0 { 1.0 } else { 0.0 };
    }
    (po - pe) / (1.0 - pe)
}

pub fn per_class(cm: &[Vec<usize>], names: &[&str]) -> Vec<ClassMetrics> {
    (0..cm.len())
        .map(|c| {
            let tp = cm[c][c] as f64;
            let predicted: usize = cm.iter().map(|r| r[c]).sum();
            let support: usize = cm[c].iter().sum();
            let precision = if predicted > 0 { tp / predicted as f64 } else { 0.0 };
            let recall = if support > 0 { tp / support as f64 } else { 0.0 };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                class: c,
                name: names.get(c).map_or_else(|| c.to_string(), |s| s.to_string()),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let y = vec![0, 1, 2, 3, 1, 2];
        let cm = confusion_matrix(&y, &y, 4);
        assert_eq!(accuracy(&cm), 1.0);
        assert!((cohen_kappa(&cm) - 1.0).abs() < 1e-12);
        assert!(per_class(&cm, &[]).iter().all(|m| m.f1 == 1.0));
    }

    #[test]
    fn kappa_matches_hand_computation() {
        // 2x2 agreement table [[20, 5], [10, 15]]
        let mut t = Vec::new();
        let mut p = Vec::new();
        for (truth, pred, n) in [(0, 0, 20), (0, 1, 5), (1, 0, 10), (1, 1, 15)] {
            for _ in 0..n {
                t.push(truth);
                p.push(pred);
            }
        }
        let cm = confusion_matrix(&t, &p, 2);
        assert_eq!(cm, vec![vec![20, 5], vec![10, 15]]);
        // po = 0.7, pe = 0.5*0.6 + 0.5*0.4 = 0.5
        assert!((cohen_kappa(&cm) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn precision_recall_per_class() {
        let t = vec![0, 0, 1, 1];
        let p = vec![0, 1, 1, 1];
        let cm = confusion_matrix(&t, &p, 2);
        let m = per_class(&cm, &["Wake", "Light"]);
        assert_eq!(m[0].precision, 1.0);
        assert_eq!(m[0].recall, 0.5);
        assert!((m[1].precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m[1].recall, 1.0);
        assert_eq!(m[1].name, "Light");
        assert_eq!(m[1].support, 2);
    }
}
