//! Error types for the demand_forecast crate

use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the demand_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Invalid parameters, raised before any computation starts
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Hard data-quality failure; training must not start
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Loss became non-finite during training
    #[error("Training diverged at epoch {epoch}: loss is not finite (last checkpoint: {})",
        last_checkpoint.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "none".to_string()))]
    DivergenceError {
        epoch: usize,
        last_checkpoint: Option<PathBuf>,
    },

    /// Error related to data shape or content outside the validator's checks
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from CSV parsing
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Error encoding or decoding checkpoints, reports and config files
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::CsvError(err.to_string())
    }
}

impl From<bincode::Error> for ForecastError {
    fn from(err: bincode::Error) -> Self {
        ForecastError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::SerializationError(err.to_string())
    }
}

impl From<toml::ser::Error> for ForecastError {
    fn from(err: toml::ser::Error) -> Self {
        ForecastError::SerializationError(err.to_string())
    }
}

impl From<demand_math::MathError> for ForecastError {
    fn from(err: demand_math::MathError) -> Self {
        ForecastError::DataError(err.to_string())
    }
}
