//! End-to-end driver: series → windows → validation → training → evaluation

use crate::catalog::Catalog;
use crate::checkpoint::Checkpoint;
use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::evaluator::{EvaluationReport, Evaluator, ForecastTable};
use crate::generator::SyntheticSeriesGenerator;
use crate::model::DemandForecastModel;
use crate::series::SeriesSet;
use crate::trainer::{Trainer, TrainingRun};
use crate::validation::{DataQualityValidator, ValidationReport};
use crate::windowing::{FeatureWindower, WindowedDataset};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub validation: ValidationReport,
    pub run: TrainingRun,
    pub model: DemandForecastModel,
    pub evaluation: EvaluationReport,
    /// Held-out and future forecasts, ordered by track then date
    pub forecasts: ForecastTable,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    windower: FeatureWindower,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let windower = FeatureWindower::new(config.window_config())?;
        Ok(Self { config, windower })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn windower(&self) -> &FeatureWindower {
        &self.windower
    }

    /// Synthetic history for every catalog track over `[start, end]`
    pub fn generate(&self, catalog: &Catalog, start: NaiveDate, end: NaiveDate) -> Result<SeriesSet> {
        let generator = SyntheticSeriesGenerator::new(self.config.generator.clone())?;
        generator.generate(catalog.tracks(), start, end)
    }

    /// Window a series set and run every data-quality check over it
    pub fn prepare(
        &self,
        series: &SeriesSet,
        declared_range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<(WindowedDataset, ValidationReport)> {
        let validator = DataQualityValidator::new(self.config.validator_config(declared_range))?;
        let series_report = validator.validate_series(series);
        if series_report.has_hard_failure() {
            // windowing needs clean rows; report without it
            series_report.log();
            return Ok((WindowedDataset::default(), series_report));
        }
        let dataset = self.windower.transform(series)?;
        let report = validator.validate(series, &dataset);
        report.log();
        Ok((dataset, report))
    }

    /// Validate, train, evaluate and forecast
    ///
    /// Fails with `ValidationError` before training when a hard check fails.
    pub fn train(
        &self,
        series: &SeriesSet,
        catalog: Option<&Catalog>,
        declared_range: Option<(NaiveDate, NaiveDate)>,
        stop: Arc<AtomicBool>,
    ) -> Result<PipelineOutcome> {
        self.train_from(series, catalog, declared_range, stop, None)
    }

    /// [`Pipeline::train`], continuing from `resume` when one is given
    pub fn train_from(
        &self,
        series: &SeriesSet,
        catalog: Option<&Catalog>,
        declared_range: Option<(NaiveDate, NaiveDate)>,
        stop: Arc<AtomicBool>,
        resume: Option<Checkpoint>,
    ) -> Result<PipelineOutcome> {
        let (dataset, report) = self.prepare(series, declared_range)?;
        let validation = report.into_result()?;
        for warning in validation.warnings() {
            warn!("Proceeding despite soft check failure: {}", warning);
        }

        let mut trainer = Trainer::new(self.config.trainer_config())?.with_stop_flag(stop);
        let run = match resume {
            Some(checkpoint) => trainer.resume(&dataset, checkpoint)?,
            None => trainer.fit(&dataset)?,
        };
        let model = trainer
            .into_best_model()
            .ok_or_else(|| ForecastError::DataError("Training produced no model".to_string()))?;

        let held_out = if run.split.validation.is_empty() {
            info!("No validation tracks; evaluating in-sample");
            dataset.clone()
        } else {
            WindowedDataset {
                feature_names: dataset.feature_names.clone(),
                windows: dataset
                    .windows
                    .iter()
                    .filter(|w| run.split.is_validation(&w.track_id))
                    .cloned()
                    .collect(),
            }
        };

        let evaluator = Evaluator::new(
            catalog.map(|c| c.genre_index()).unwrap_or_else(BTreeMap::new),
        );
        let (evaluation, mut forecasts) = evaluator.evaluate(&model, &held_out)?;
        forecasts.extend(self.forecast(&model, series)?);
        info!("{}", evaluation);

        Ok(PipelineOutcome {
            validation,
            run,
            model,
            evaluation,
            forecasts,
        })
    }

    /// Forecast the days after each track's last observation
    ///
    /// The windowing settings must rebuild the features and horizon the model
    /// was trained on.
    pub fn forecast(&self, model: &DemandForecastModel, series: &SeriesSet) -> Result<ForecastTable> {
        let horizon = self.windower.config().horizon;
        if model.config().horizon != horizon {
            return Err(ForecastError::ConfigError(format!(
                "Model forecasts {} days but the windowing settings use a horizon of {}",
                model.config().horizon,
                horizon
            )));
        }
        let inference = self.windower.inference_windows(series)?;
        if !model.feature_names().is_empty() && model.feature_names() != inference.feature_names.as_slice() {
            return Err(ForecastError::ConfigError(format!(
                "Model expects features {:?} but the windowing settings produce {:?}",
                model.feature_names(),
                inference.feature_names
            )));
        }
        Evaluator::default().forecast_future(model, &inference)
    }
}
