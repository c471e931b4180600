//! # Shelfcast
//!
//! Weekly demand forecasting and inventory recommendations per product and store.
//!
//! The workspace is split into two crates, re-exported here:
//!
//! - [`math`]: lag buffers, trailing means and ISO-week calendar rules
//! - [`forecast`]: loading, aggregation, features, models, the pipeline and its outputs
//!
//! ## Example
//!
//! ```
//! use shelfcast::forecast::inventory::InventoryPolicy;
//!
//! let policy = InventoryPolicy::default();
//! assert_eq!(policy.recommend(100.0).unwrap(), 164);
//! ```

pub use demand_forecast as forecast;
pub use demand_math as math;

pub use demand_forecast::{
    ConfigLoader, DataLoader, EntityForecast, EntityKey, Event, ForecastError, ForecastPoint,
    Pipeline, PipelineConfig, PipelineOutput, RunSummary,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let config = PipelineConfig::default();
        assert!(Pipeline::new(config).is_ok());
        assert_eq!(math::WeekKey { year: 2024, week: 1 }.to_string(), "2024-W01");
        assert!(!VERSION.is_empty());
    }
}
