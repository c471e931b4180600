//! # Demand Forecast
//!
//! Weekly demand forecasting and inventory recommendations per product and store.
//!
//! ## Stages
//!
//! - Temporal aggregation of daily sales events into ISO weeks
//! - Lagged, rolling, calendar and economic features per weekly row
//! - A single chronological train/test cutoff shared by every entity
//! - A per-entity random forest with holdout metrics and recursive extrapolation
//! - Safety-stock inventory recommendations for each forecast period
//!
//! ## Quick Start
//!
//! ```ignore
//! use demand_forecast::config::ConfigLoader;
//! use demand_forecast::data::DataLoader;
//! use demand_forecast::export::export_all;
//! use demand_forecast::pipeline::Pipeline;
//!
//! let config = ConfigLoader::load(None)?;
//! let events = DataLoader::from_csv_with_catalogs(
//!     "sales_inventory_data.csv",
//!     "product_data.csv",
//!     "store_data.csv",
//! )?;
//!
//! let output = Pipeline::new(config.clone())?.run(&events)?;
//! for forecast in &output.forecasts {
//!     if let Some(metrics) = &forecast.metrics {
//!         println!("{}\n{}", forecast.entity, metrics);
//!     }
//! }
//! export_all("out", &output, &config.features)?;
//! ```

pub mod aggregate;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod export;
pub mod features;
pub mod inventory;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod split;
pub mod synthetic;

pub use config::{ConfigLoader, PipelineConfig};
pub use data::{DataLoader, EntityKey, Event};
pub use engine::{EntityForecast, ForecastPoint};
pub use error::{ForecastError, Result};
pub use pipeline::{Pipeline, PipelineOutput, RunSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
