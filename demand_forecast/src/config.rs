//! Pipeline configuration loaded from TOML
//!
//! Every key is optional; omitted keys take the [`PipelineConfig::default`]
//! values. Generator coefficients live in a `[generator]` table.

use crate::error::{ForecastError, Result};
use crate::generator::GeneratorConfig;
use crate::trainer::TrainerConfig;
use crate::validation::ValidatorConfig;
use crate::windowing::WindowConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub window_length: usize,
    pub horizon: usize,
    pub stride: usize,
    pub lag_set: Vec<usize>,
    pub rolling_spans: Vec<usize>,
    pub calendar_features: bool,
    pub include_covariates: bool,

    pub hidden_size: usize,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub random_seed: u64,
    pub validation_split_fraction: f64,
    pub checkpoint_interval: usize,
    pub checkpoint_dir: Option<PathBuf>,
    pub gradient_clip: Option<f64>,

    pub outlier_std_threshold: f64,

    pub generator: GeneratorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let window = WindowConfig::default();
        let trainer = TrainerConfig::default();
        Self {
            window_length: window.window_length,
            horizon: window.horizon,
            stride: window.stride,
            lag_set: window.lag_set,
            rolling_spans: window.rolling_spans,
            calendar_features: window.calendar_features,
            include_covariates: window.include_covariates,
            hidden_size: trainer.hidden_size,
            num_epochs: trainer.num_epochs,
            batch_size: trainer.batch_size,
            learning_rate: trainer.learning_rate,
            random_seed: trainer.random_seed,
            validation_split_fraction: trainer.validation_split_fraction,
            checkpoint_interval: trainer.checkpoint_interval,
            checkpoint_dir: trainer.checkpoint_dir,
            gradient_clip: trainer.gradient_clip,
            outlier_std_threshold: ValidatorConfig::default().outlier_std_threshold,
            generator: GeneratorConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ForecastError::SerializationError(msg) => ForecastError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                msg
            )),
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every section; the first problem found is returned
    pub fn validate(&self) -> Result<()> {
        self.window_config().validate()?;
        self.trainer_config().validate()?;
        self.generator.validate()?;
        if !(self.outlier_std_threshold > 0.0) {
            return Err(ForecastError::ConfigError(format!(
                "outlier_std_threshold must be positive, got {}",
                self.outlier_std_threshold
            )));
        }
        Ok(())
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            window_length: self.window_length,
            horizon: self.horizon,
            stride: self.stride,
            lag_set: self.lag_set.clone(),
            rolling_spans: self.rolling_spans.clone(),
            calendar_features: self.calendar_features,
            include_covariates: self.include_covariates,
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            hidden_size: self.hidden_size,
            num_epochs: self.num_epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            random_seed: self.random_seed,
            validation_split_fraction: self.validation_split_fraction,
            checkpoint_interval: self.checkpoint_interval,
            checkpoint_dir: self.checkpoint_dir.clone(),
            gradient_clip: self.gradient_clip,
        }
    }

    pub fn validator_config(&self, declared_range: Option<(NaiveDate, NaiveDate)>) -> ValidatorConfig {
        ValidatorConfig {
            declared_range,
            outlier_std_threshold: self.outlier_std_threshold,
            window_length: self.window_length,
            horizon: self.horizon,
        }
    }
}
