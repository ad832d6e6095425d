use serde::{Deserialize, Serialize};

/// Regression diagnostics for one data partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
    pub samples: usize,
}

impl RegressionMetrics {
    /// `None` for empty or mismatched inputs. A constant target gives
    /// R² = 1 for a perfect fit and 0 otherwise.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Option<Self> {
        if actual.is_empty() || actual.len() != predicted.len() {
            return None;
        }
        let n = actual.len() as f64;

        let sq_err: f64 = predicted
            .iter()
            .zip(actual)
            .map(|(p, t)| (p - t).powi(2))
            .sum();
        let mae = predicted
            .iter()
            .zip(actual)
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / n;
        let rmse = (sq_err / n).sqrt();

        let mean_y = actual.iter().sum::<f64>() / n;
        let ss_tot: f64 = actual.iter().map(|t| (t - mean_y).powi(2)).sum();
        let r2 = if ss_tot > 0.0 {
            1.0 - sq_err / ss_tot
        } else if sq_err == 0.0 {
            1.0
        } else {
            0.0
        };

        Some(Self {
            r2,
            mae,
            rmse,
            samples: actual.len(),
        })
    }
}

/// Metrics on both partitions; a partition without rows has `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub train: Option<RegressionMetrics>,
    pub test: Option<RegressionMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub fold_scores: Vec<f64>,
    pub mean_r2: f64,
    pub std_r2: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_fit() {
        let m = RegressionMetrics::compute(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.samples, 3);
    }

    #[test]
    fn test_known_errors() {
        let m = RegressionMetrics::compute(&[1.0, 2.0, 3.0, 4.0], &[2.0, 2.0, 3.0, 2.0]).unwrap();
        // errors: 1, 0, 0, -2
        assert!((m.mae - 0.75).abs() < 1e-12);
        assert!((m.rmse - (5.0f64 / 4.0).sqrt()).abs() < 1e-12);
        // ss_tot = 5
        assert!((m.r2 - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(RegressionMetrics::compute(&[], &[]).is_none());
        assert!(RegressionMetrics::compute(&[1.0], &[1.0, 2.0]).is_none());
        let constant = RegressionMetrics::compute(&[5.0, 5.0], &[4.0, 6.0]).unwrap();
        assert_eq!(constant.r2, 0.0);
    }
}
