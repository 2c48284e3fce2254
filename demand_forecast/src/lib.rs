//! # Demand Forecast
//!
//! Daily demand forecasting for music tracks.
//!
//! ## Features
//!
//! - Synthetic daily stream histories generated from catalog metadata
//! - Sliding-window feature engineering (lags, rolling statistics, calendar, covariates)
//! - Data-quality validation with hard and soft checks
//! - A GRU forecaster trained with mini-batch Adam and full back-propagation through time
//! - Checkpointing, held-out evaluation against a naive baseline, and forecast tables
//!
//! ## Quick Start
//!
//! ```no_run
//! use demand_forecast::catalog::Catalog;
//! use demand_forecast::config::PipelineConfig;
//! use demand_forecast::pipeline::Pipeline;
//! use chrono::NaiveDate;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! # fn main() -> demand_forecast::Result<()> {
//! let catalog = Catalog::from_csv("catalog.csv")?;
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//!
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
//! let series = pipeline.generate(&catalog, start, end)?;
//!
//! let outcome = pipeline.train(&series, Some(&catalog), Some((start, end)), Arc::new(AtomicBool::new(false)))?;
//! println!("{}", outcome.evaluation);
//! outcome.forecasts.write_csv("forecasts.csv")?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod metrics;
pub mod model;
pub mod optimizer;
pub mod pipeline;
pub mod series;
pub mod trainer;
pub mod validation;
pub mod windowing;

// Re-export commonly used types
pub use crate::catalog::{Catalog, Track};
pub use crate::checkpoint::Checkpoint;
pub use crate::config::PipelineConfig;
pub use crate::error::{ForecastError, Result};
pub use crate::evaluator::{EvaluationReport, Evaluator, ForecastRow, ForecastTable};
pub use crate::generator::{GeneratorConfig, SyntheticSeriesGenerator};
pub use crate::metrics::AccuracyMetrics;
pub use crate::model::{DemandForecastModel, ModelConfig, Normalizer};
pub use crate::pipeline::{Pipeline, PipelineOutcome};
pub use crate::series::{DailyObservation, SeriesSet};
pub use crate::trainer::{StopReason, Trainer, TrainerConfig, TrainingRun};
pub use crate::validation::{DataQualityValidator, ValidationReport};
pub use crate::windowing::{FeatureWindow, FeatureWindower, WindowConfig, WindowedDataset};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
