//! Accuracy metrics for held-out predictions

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Percentage error of one prediction, undefined when the actual value is zero
pub fn percentage_error(actual: f64, predicted: f64) -> Option<f64> {
    if actual == 0.0 {
        None
    } else {
        Some((actual - predicted).abs() / actual.abs() * 100.0)
    }
}

/// Evaluate predictions against actual values
pub fn evaluate_predictions(actual: &[f64], predicted: &[f64]) -> Result<EvaluationMetrics> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return Err(ForecastError::EmptyPartition(
            "Actual and predicted values must have the same non-zero length".to_string(),
        ));
    }

    let n = actual.len() as f64;
    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| a - p)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let ss_res = errors.iter().map(|e| e.powi(2)).sum::<f64>();
    let rmse = (ss_res / n).sqrt();

    let mean_actual = actual.iter().sum::<f64>() / n;
    let ss_tot = actual
        .iter()
        .map(|a| (a - mean_actual).powi(2))
        .sum::<f64>();
    // A constant actual series has no variance to explain
    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    let percentage: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .filter_map(|(&a, &p)| percentage_error(a, p))
        .collect();
    let mape = if percentage.is_empty() {
        None
    } else {
        Some(percentage.iter().sum::<f64>() / percentage.len() as f64)
    };

    Ok(EvaluationMetrics {
        mae,
        rmse,
        r2,
        mape,
        mape_excluded: actual.len() - percentage.len(),
        n_samples: actual.len(),
    })
}

/// Error statistics for one entity's test partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Coefficient of determination
    pub r2: f64,
    /// Mean Absolute Percentage Error over rows with non-zero actuals
    pub mape: Option<f64>,
    /// Rows left out of MAPE because their actual was zero
    pub mape_excluded: usize,
    pub n_samples: usize,
}

impl std::fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Accuracy ({} rows):", self.n_samples)?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        writeln!(f, "  RMSE:  {:.4}", self.rmse)?;
        writeln!(f, "  R2:    {:.4}", self.r2)?;
        match self.mape {
            Some(mape) => writeln!(
                f,
                "  MAPE:  {:.4}% ({} zero-demand rows excluded)",
                mape, self.mape_excluded
            )?,
            None => writeln!(f, "  MAPE:  undefined (all actuals zero)")?,
        }
        Ok(())
    }
}
