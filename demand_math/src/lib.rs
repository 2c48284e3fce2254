//! # Demand Math
//!
//! Numeric building blocks for the demand forecasting pipeline.
//! This crate provides trailing-window statistics, summary statistics and
//! calendar encodings used when turning daily stream counts into model features.

use thiserror::Error;

pub mod calendar;
pub mod rolling;
pub mod stats;

pub use rolling::RollingWindow;
pub use stats::Standardizer;

/// Errors that can occur in demand-related calculations
#[derive(Error, Debug, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for demand math operations
pub type Result<T> = std::result::Result<T, MathError>;
