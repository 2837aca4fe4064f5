//! Classification metrics
//!
//! Precision, recall and F1 follow the usual convention of reporting 0 when
//! a denominator is zero.

use serde::Serialize;
use std::fmt::Write;

/// Fraction of matching predictions
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// `matrix[true][predicted]` counts
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0usize; n_classes]; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t < n_classes && p < n_classes {
            matrix[t][p] += 1;
        }
    }
    matrix
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class and averaged scores for one evaluation set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub classes: Vec<ClassMetrics>,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub labels: Vec<String>,
    pub confusion_matrix: Vec<Vec<usize>>,
}

impl ClassificationReport {
    pub fn new(y_true: &[usize], y_pred: &[usize], labels: &[String]) -> Self {
        let n = labels.len();
        let matrix = confusion_matrix(y_true, y_pred, n);

        let classes: Vec<ClassMetrics> = (0..n)
            .map(|c| {
                let tp = matrix[c][c];
                let predicted: usize = matrix.iter().map(|row| row[c]).sum();
                let support: usize = matrix[c].iter().sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: labels[c].clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let total: usize = classes.iter().map(|c| c.support).sum();
        let mean = |f: fn(&ClassMetrics) -> f64| {
            if n == 0 {
                0.0
            } else {
                classes.iter().map(f).sum::<f64>() / n as f64
            }
        };
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / total as f64
            }
        };

        let macro_avg = AverageMetrics {
            precision: mean(|c| c.precision),
            recall: mean(|c| c.recall),
            f1: mean(|c| c.f1),
            support: total,
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total,
        };

        Self {
            accuracy: accuracy(y_true, y_pred),
            classes,
            macro_avg,
            weighted_avg,
            labels: labels.to_vec(),
            confusion_matrix: matrix,
        }
    }

    /// Text tables: per-class scores followed by the confusion matrix
    pub fn render(&self) -> String {
        let width = self
            .labels
            .iter()
            .map(|l| l.len())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        );
        let _ = writeln!(out);
        for c in &self.classes {
            let _ = writeln!(
                out,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        );
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            let _ = writeln!(
                out,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1, avg.support
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Confusion matrix (rows: true, columns: predicted)");
        let cell = self
            .confusion_matrix
            .iter()
            .flatten()
            .map(|v| v.to_string().len())
            .chain(self.labels.iter().map(|l| l.len()))
            .max()
            .unwrap_or(1);
        let _ = write!(out, "{:>width$}", "");
        for label in &self.labels {
            let _ = write!(out, " {:>cell$}", label);
        }
        let _ = writeln!(out);
        for (label, row) in self.labels.iter().zip(&self.confusion_matrix) {
            let _ = write!(out, "{:>width$}", label);
            for v in row {
                let _ = write!(out, " {:>cell$}", v);
            }
            let _ = writeln!(out);
        }
        out
    }
}
