//! Column standardization fitted on training rows only

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Per-column `(x - mean) / std` with population standard deviation
///
/// Columns with zero spread get a scale of 1 so constant inputs map to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let width = rows.first().map(Vec::len).ok_or_else(|| {
            ForecastError::EmptyPartition("Cannot fit a scaler on zero rows".to_string())
        })?;

        let mut means = Vec::with_capacity(width);
        let mut scales = Vec::with_capacity(width);
        for col in 0..width {
            let column = rows
                .iter()
                .map(|row| {
                    row.get(col).copied().ok_or_else(|| {
                        ForecastError::ModelError(format!(
                            "Ragged feature matrix: expected {} columns",
                            width
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;

            let mean = column.iter().mean();
            let std = column.iter().population_std_dev();
            if !mean.is_finite() || !std.is_finite() {
                return Err(ForecastError::ModelError(format!(
                    "Column {} contains non-finite values",
                    col
                )));
            }

            means.push(mean);
            scales.push(if std < 1e-12 { 1.0 } else { std });
        }

        Ok(Self { means, scales })
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.means.len() {
            return Err(ForecastError::ModelError(format!(
                "Scaler expects {} columns, got {}",
                self.means.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (mean, scale))| (v - mean) / scale)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_standardizes_columns() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();

        assert_eq!(scaler.means(), &[2.0, 5.0]);
        assert_eq!(scaler.scales(), &[1.0, 1.0]);

        let scaled = scaler.transform(&rows).unwrap();
        assert_relative_eq!(scaled[0][0], -1.0);
        assert_relative_eq!(scaled[1][0], 1.0);
        assert_eq!(scaled[0][1], 0.0);
    }

    #[test]
    fn test_uses_training_statistics_only() {
        let scaler = StandardScaler::fit(&[vec![0.0], vec![4.0]]).unwrap();
        let unseen = scaler.transform_row(&[10.0]).unwrap();
        assert_relative_eq!(unseen[0], 4.0);
    }

    #[test]
    fn test_errors() {
        assert!(StandardScaler::fit(&[]).is_err());
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(scaler.transform_row(&[1.0]).is_err());
    }
}
