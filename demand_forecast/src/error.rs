//! Error types for the demand_forecast crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the demand_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A record could not be interpreted (bad timestamp, null cell, unknown id)
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// A required input column is absent
    #[error("Missing required column '{column}' in {table}")]
    MissingColumn { table: String, column: String },

    /// An entity does not have enough periods for the requested features or fit
    #[error("Insufficient history for {entity}: need {needed}, got {got}")]
    InsufficientHistory {
        entity: String,
        needed: usize,
        got: usize,
    },

    /// A partition an operation depends on is empty
    #[error("Empty partition: {0}")]
    EmptyPartition(String),

    /// The regressor rejected its input or was used before fitting
    #[error("Model error: {0}")]
    ModelError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from window or calendar math
    #[error("Math error: {0}")]
    Math(#[from] demand_math::MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error writing delimited output
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error encoding JSON output
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),
}

impl ForecastError {
    /// Whether the error only affects one entity, so the run can carry on with the others
    pub fn is_entity_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::InsufficientHistory { .. }
                | ForecastError::EmptyPartition(_)
                | ForecastError::ModelError(_)
        )
    }

    pub(crate) fn missing_column(table: &str, column: &str) -> Self {
        ForecastError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}
