//! # Demand Math
//!
//! Numeric building blocks for weekly demand series.
//! This crate provides the trailing-window and lag primitives used to derive
//! forecasting features, together with the ISO-week calendar rules that turn
//! daily timestamps into fixed-width periods.

use thiserror::Error;

pub mod calendar;
pub mod rolling;

pub use calendar::{CalendarFeatures, WeekKey};
pub use rolling::{LagBuffer, TrailingMean};

/// Errors that can occur in window and calendar calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calendar error: {0}")]
    CalendarError(String),
}

/// Result type for demand math operations
pub type Result<T> = std::result::Result<T, MathError>;
