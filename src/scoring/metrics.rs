//! Precision / recall / F-measure and interval overlap

use serde::{Deserialize, Serialize};

/// Accuracy of one matching variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
    pub average_overlap_ratio: f64,
    /// Number of matched pairs (true positives)
    pub matched: usize,
}

impl Metrics {
    /// Metrics for `matched` pairs between `n_reference` and `n_estimate`
    /// notes with the given per-pair overlap ratios
    pub fn from_counts(n_reference: usize, n_estimate: usize, overlaps: &[f64]) -> Self {
        let matched = overlaps.len();
        let (precision, recall, f_measure) = precision_recall_f(n_reference, n_estimate, matched);
        let average_overlap_ratio = if matched == 0 {
            0.0
        } else {
            overlaps.iter().sum::<f64>() / matched as f64
        };
        Self {
            precision,
            recall,
            f_measure,
            average_overlap_ratio,
            matched,
        }
    }
}

/// Precision, recall and their harmonic mean.
///
/// An empty side scores 1.0 when the other side is empty too, else 0.0.
pub fn precision_recall_f(
    n_reference: usize,
    n_estimate: usize,
    matched: usize,
) -> (f64, f64, f64) {
    let precision = if n_estimate == 0 {
        if n_reference == 0 {
            1.0
        } else {
            0.0
        }
    } else {
        matched as f64 / n_estimate as f64
    };
    let recall = if n_reference == 0 {
        if n_estimate == 0 {
            1.0
        } else {
            0.0
        }
    } else {
        matched as f64 / n_reference as f64
    };
    (precision, recall, f_measure(precision, recall))
}

/// Harmonic mean, 0 when both inputs are 0
pub fn f_measure(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Temporal Jaccard index of two `[start, end]` intervals.
///
/// Two identical zero-length intervals overlap completely.
pub fn overlap_ratio(a: (f64, f64), b: (f64, f64)) -> f64 {
    let union = a.1.max(b.1) - a.0.min(b.0);
    if union <= 0.0 {
        return 1.0;
    }
    let intersection = (a.1.min(b.1) - a.0.max(b.0)).max(0.0);
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sides() {
        assert_eq!(precision_recall_f(0, 0, 0), (1.0, 1.0, 1.0));
        let (p, r, f) = precision_recall_f(0, 3, 0);
        assert_eq!((p, r), (0.0, 1.0));
        assert_eq!(f, 0.0);
        let (p, r, _) = precision_recall_f(2, 0, 0);
        assert_eq!((p, r), (1.0, 0.0));
    }

    #[test]
    fn test_f_measure() {
        assert_eq!(f_measure(0.0, 0.0), 0.0);
        assert!((f_measure(0.5, 1.0) - 2.0 / 3.0).abs() < 1e-12);
        assert!((f_measure(1.0, 1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_overlap_ratio() {
        assert!((overlap_ratio((0.0, 1.0), (0.02, 0.95)) - 0.93).abs() < 1e-9);
        assert!((overlap_ratio((0.0, 1.0), (0.5, 1.5)) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(overlap_ratio((0.0, 1.0), (2.0, 3.0)), 0.0);
        assert_eq!(overlap_ratio((1.0, 1.0), (1.0, 1.0)), 1.0);
        assert_eq!(overlap_ratio((1.0, 1.0), (1.0, 1.04)), 0.0);
    }

    #[test]
    fn test_average_overlap_zero_without_matches() {
        let metrics = Metrics::from_counts(3, 2, &[]);
        assert_eq!(metrics.average_overlap_ratio, 0.0);
        assert_eq!(metrics.matched, 0);
        assert_eq!(metrics.f_measure, 0.0);
    }
}
