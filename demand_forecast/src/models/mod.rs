//! Supervised regressors mapping a feature vector to next-period demand

use crate::error::{ForecastError, Result};
use std::fmt::Debug;

/// Regressor that has been fitted and can score feature vectors
pub trait FittedRegressor: Debug + Send + Sync {
    /// Predict the target for one feature vector
    fn predict_one(&self, features: &[f64]) -> Result<f64>;

    /// Predict the target for every row
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict_one(row)).collect()
    }

    /// Width of the feature vectors the model was fitted on
    fn n_features(&self) -> usize;

    /// Normalized impurity-based importances, when the model tracks them
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }

    /// Name of the model
    fn name(&self) -> &str;
}

/// Regressor that can be fitted on a feature matrix
pub trait Regressor: Debug + Clone + Send + Sync {
    /// The type of fitted model produced
    type Fitted: FittedRegressor;

    /// Fit on rows of features `x` and targets `y`
    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<Self::Fitted>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

/// Check a training matrix and return its width
pub(crate) fn validate_training_data(x: &[Vec<f64>], y: &[f64]) -> Result<usize> {
    if x.is_empty() {
        return Err(ForecastError::ModelError(
            "Cannot fit on an empty training set".to_string(),
        ));
    }
    if x.len() != y.len() {
        return Err(ForecastError::ModelError(format!(
            "Feature rows ({}) don't match targets ({})",
            x.len(),
            y.len()
        )));
    }

    let width = x[0].len();
    if width == 0 {
        return Err(ForecastError::ModelError(
            "Feature vectors are empty".to_string(),
        ));
    }

    for (i, row) in x.iter().enumerate() {
        if row.len() != width {
            return Err(ForecastError::ModelError(format!(
                "Row {} has {} features, expected {}",
                i,
                row.len(),
                width
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ModelError(format!(
                "Row {} contains a non-finite feature",
                i
            )));
        }
    }
    if let Some(i) = y.iter().position(|v| !v.is_finite()) {
        return Err(ForecastError::ModelError(format!(
            "Target {} is not finite",
            i
        )));
    }

    Ok(width)
}

/// Check one feature vector before scoring it
pub(crate) fn validate_sample(features: &[f64], n_features: usize) -> Result<()> {
    if features.len() != n_features {
        return Err(ForecastError::ModelError(format!(
            "Expected {} features, got {}",
            n_features,
            features.len()
        )));
    }
    if features.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::ModelError(
            "Feature vector contains a non-finite value".to_string(),
        ));
    }
    Ok(())
}

pub mod forest;
pub mod tree;

pub use forest::{FittedForest, RandomForest, RandomForestConfig};
pub use tree::{FittedTree, RegressionTree, TreeConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_data_checks() {
        let x = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(validate_training_data(&x, &[1.0, 2.0]).unwrap(), 2);

        assert!(validate_training_data(&[], &[]).is_err());
        assert!(validate_training_data(&x, &[1.0]).is_err());
        assert!(validate_training_data(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0]).is_err());
        assert!(validate_training_data(&[vec![f64::NAN]], &[1.0]).is_err());
        assert!(validate_training_data(&[vec![1.0]], &[f64::INFINITY]).is_err());
    }

    #[test]
    fn test_sample_checks() {
        assert!(validate_sample(&[1.0, 2.0], 2).is_ok());
        assert!(validate_sample(&[1.0], 2).is_err());
        assert!(validate_sample(&[1.0, f64::NAN], 2).is_err());
    }
}
