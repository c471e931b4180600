//! Stock recommendations derived from forecast demand

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Safety stock settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryPolicy {
    pub safety_stock_multiplier: f64,
    /// Replenishment lead time in days
    pub lead_time_days: f64,
}

impl Default for InventoryPolicy {
    fn default() -> Self {
        Self {
            safety_stock_multiplier: 1.5,
            lead_time_days: 3.0,
        }
    }
}

impl InventoryPolicy {
    pub fn new(safety_stock_multiplier: f64, lead_time_days: f64) -> Result<Self> {
        let policy = Self {
            safety_stock_multiplier,
            lead_time_days,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("safety_stock_multiplier", self.safety_stock_multiplier),
            ("lead_time_days", self.lead_time_days),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ForecastError::InvalidParameter(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Lead time expressed in weekly periods
    pub fn lead_time_periods(&self) -> f64 {
        self.lead_time_days / 7.0
    }

    /// `forecast * (1 + multiplier * lead_days / 7)`, rounded to whole units
    ///
    /// Never below the forecast itself: small forecasts that would round
    /// down are lifted to the next whole unit.
    pub fn recommend(&self, forecast: f64) -> Result<u64> {
        self.validate()?;
        if !forecast.is_finite() || forecast < 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Forecast demand must be a non-negative number, got {}",
                forecast
            )));
        }

        let target = forecast * (1.0 + self.safety_stock_multiplier * self.lead_time_periods());
        Ok(target.round().max(forecast.ceil()) as u64)
    }
}

/// Recommend stock for one forecast period
pub fn recommend_inventory(forecast: f64, policy: &InventoryPolicy) -> Result<u64> {
    policy.recommend(forecast)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(100.0, 164)]
    #[case(0.0, 0)]
    #[case(14.0, 23)]
    #[case(0.3, 1)]
    fn test_default_policy(#[case] forecast: f64, #[case] expected: u64) {
        let policy = InventoryPolicy::default();
        assert_eq!(recommend_inventory(forecast, &policy).unwrap(), expected);
    }

    #[test]
    fn test_recommendation_covers_forecast() {
        let policy = InventoryPolicy::new(0.0, 0.0).unwrap();
        for forecast in [0.0, 0.4, 1.5, 99.6, 250.0] {
            let rec = policy.recommend(forecast).unwrap();
            assert!(rec as f64 >= forecast, "{} < {}", rec, forecast);
        }
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let policy = InventoryPolicy::default();
        assert!(policy.recommend(-1.0).is_err());
        assert!(policy.recommend(f64::NAN).is_err());
        assert!(InventoryPolicy::new(-0.5, 3.0).is_err());
        assert!(InventoryPolicy::new(1.5, f64::INFINITY).is_err());
    }
}
