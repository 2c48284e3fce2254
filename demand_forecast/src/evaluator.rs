//! Held-out evaluation and the forecast table

use crate::error::{ForecastError, Result};
use crate::metrics::{AccuracyAccumulator, AccuracyMetrics, Improvement};
use crate::model::DemandForecastModel;
use crate::series::DATE_FORMAT;
use crate::windowing::{FeatureWindow, WindowedDataset};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Genre bucket for tracks absent from the catalog
pub const UNKNOWN_GENRE: &str = "unknown";

/// Model and naive-baseline accuracy over one bucket of windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub model: AccuracyMetrics,
    pub baseline: AccuracyMetrics,
    pub improvement: Improvement,
}

impl MetricSet {
    fn from_accumulators(model: &AccuracyAccumulator, baseline: &AccuracyAccumulator) -> Self {
        let model = model.finish();
        let baseline = baseline.finish();
        Self {
            improvement: model.improvement_over(&baseline),
            model,
            baseline,
        }
    }
}

/// Accuracy overall and per genre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub windows: usize,
    pub overall: MetricSet,
    pub by_genre: BTreeMap<String, MetricSet>,
}

impl EvaluationReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        create_parent(path)?;
        std::fs::write(path, self.to_json()?)?;
        info!("Saved evaluation report to {}", path.display());
        Ok(())
    }
}

impl std::fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Evaluation over {} windows:", self.windows)?;
        writeln!(f, "  model:    {}", self.overall.model)?;
        writeln!(f, "  baseline: {}", self.overall.baseline)?;
        writeln!(
            f,
            "  MAE improvement over baseline: {:.1}%",
            self.overall.improvement.mae * 100.0
        )?;
        for (genre, set) in &self.by_genre {
            writeln!(f, "  [{}] {}", genre, set.model)?;
        }
        Ok(())
    }
}

/// One (track, anchor, horizon step) forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub track_id: String,
    pub anchor_date: NaiveDate,
    pub target_date: NaiveDate,
    pub predicted_demand: f64,
    /// Observed demand; `None` for dates past the end of the data
    pub actual_demand: Option<f64>,
}

/// Forecast rows ordered by track, anchor date, then horizon step
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForecastTable {
    pub rows: Vec<ForecastRow>,
}

impl ForecastTable {
    /// Rows for windows and their predictions, matched by position
    pub fn from_predictions(windows: &[FeatureWindow], predictions: &[Vec<f64>]) -> Result<Self> {
        if windows.len() != predictions.len() {
            return Err(ForecastError::DataError(format!(
                "{} windows but {} predictions",
                windows.len(),
                predictions.len()
            )));
        }

        let mut rows = Vec::new();
        for (window, predicted) in windows.iter().zip(predictions) {
            if predicted.len() != window.target_dates.len() {
                return Err(ForecastError::DataError(format!(
                    "Window {} @ {} has {} target dates but {} predictions",
                    window.track_id,
                    window.anchor_date,
                    window.target_dates.len(),
                    predicted.len()
                )));
            }
            for (step, (target_date, value)) in window.target_dates.iter().zip(predicted).enumerate() {
                rows.push(ForecastRow {
                    track_id: window.track_id.clone(),
                    anchor_date: window.anchor_date,
                    target_date: *target_date,
                    predicted_demand: *value,
                    actual_demand: window.target.get(step).copied(),
                });
            }
        }
        Ok(Self { rows })
    }

    /// Add rows, keeping the table ordered
    pub fn extend(&mut self, other: ForecastTable) {
        self.rows.extend(other.rows);
        self.rows.sort_by(|a, b| {
            (&a.track_id, a.anchor_date, a.target_date).cmp(&(&b.track_id, b.anchor_date, b.target_date))
        });
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let track_ids: Vec<&str> = self.rows.iter().map(|r| r.track_id.as_str()).collect();
        let anchors: Vec<String> = self
            .rows
            .iter()
            .map(|r| r.anchor_date.format(DATE_FORMAT).to_string())
            .collect();
        let targets: Vec<String> = self
            .rows
            .iter()
            .map(|r| r.target_date.format(DATE_FORMAT).to_string())
            .collect();
        let predicted: Vec<f64> = self.rows.iter().map(|r| r.predicted_demand).collect();
        let actual: Vec<Option<f64>> = self.rows.iter().map(|r| r.actual_demand).collect();

        Ok(DataFrame::new(vec![
            Series::new("track_id", track_ids),
            Series::new("anchor_date", anchors),
            Series::new("target_date", targets),
            Series::new("predicted_demand", predicted),
            Series::new("actual_demand", actual),
        ])?)
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        create_parent(path)?;
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).has_header(true).finish(&mut df)?;
        info!("Saved {} forecast rows to {}", df.height(), path.display());
        Ok(())
    }
}

/// Scores a trained model against the naive last-value baseline
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    genres: BTreeMap<String, String>,
}

impl Evaluator {
    /// `genres` maps track id to genre bucket
    pub fn new(genres: BTreeMap<String, String>) -> Self {
        Self { genres }
    }

    pub fn genre_of(&self, track_id: &str) -> &str {
        self.genres
            .get(track_id)
            .map(|g| g.as_str())
            .unwrap_or(UNKNOWN_GENRE)
    }

    /// Naive forecast: the anchor day's demand repeated over the horizon
    pub fn baseline(window: &FeatureWindow) -> Vec<f64> {
        vec![window.last_observed(); window.target_dates.len()]
    }

    /// Predict every window and score model and baseline
    pub fn evaluate(
        &self,
        model: &DemandForecastModel,
        dataset: &WindowedDataset,
    ) -> Result<(EvaluationReport, ForecastTable)> {
        let predictions = model.predict_batch(&dataset.windows)?;
        let report = self.score(&dataset.windows, &predictions)?;
        let table = ForecastTable::from_predictions(&dataset.windows, &predictions)?;
        info!(
            "Evaluated {} windows: model MAE {:.2}, baseline MAE {:.2}",
            report.windows, report.overall.model.mae, report.overall.baseline.mae
        );
        Ok((report, table))
    }

    /// Score precomputed predictions; windows without targets are ignored
    pub fn score(
        &self,
        windows: &[FeatureWindow],
        predictions: &[Vec<f64>],
    ) -> Result<EvaluationReport> {
        if windows.len() != predictions.len() {
            return Err(ForecastError::DataError(format!(
                "{} windows but {} predictions",
                windows.len(),
                predictions.len()
            )));
        }

        let mut overall = (AccuracyAccumulator::default(), AccuracyAccumulator::default());
        let mut genres: BTreeMap<String, (AccuracyAccumulator, AccuracyAccumulator)> =
            BTreeMap::new();
        let mut scored = 0;

        for (window, predicted) in windows.iter().zip(predictions) {
            if !window.has_target() {
                continue;
            }
            if predicted.len() != window.target.len() {
                return Err(ForecastError::DataError(format!(
                    "Window {} @ {} has {} targets but {} predictions",
                    window.track_id,
                    window.anchor_date,
                    window.target.len(),
                    predicted.len()
                )));
            }

            let bucket = genres
                .entry(self.genre_of(&window.track_id).to_string())
                .or_default();
            let naive = window.last_observed();
            for (p, actual) in predicted.iter().zip(&window.target) {
                overall.0.push(*p, *actual);
                overall.1.push(naive, *actual);
                bucket.0.push(*p, *actual);
                bucket.1.push(naive, *actual);
            }
            scored += 1;
        }

        if scored == 0 {
            return Err(ForecastError::DataError(
                "No windows with observed targets to evaluate".to_string(),
            ));
        }

        Ok(EvaluationReport {
            windows: scored,
            overall: MetricSet::from_accumulators(&overall.0, &overall.1),
            by_genre: genres
                .iter()
                .map(|(genre, (m, b))| (genre.clone(), MetricSet::from_accumulators(m, b)))
                .collect(),
        })
    }

    /// Forecast rows for the days after each track's last observation
    pub fn forecast_future(
        &self,
        model: &DemandForecastModel,
        inference: &WindowedDataset,
    ) -> Result<ForecastTable> {
        let predictions = model.predict_batch(&inference.windows)?;
        ForecastTable::from_predictions(&inference.windows, &predictions)
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
