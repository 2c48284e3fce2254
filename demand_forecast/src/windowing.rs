//! Sliding-window feature engineering
//!
//! Turns each track's ascending daily series into fixed-length supervised
//! windows. Every per-day feature is computed from that day and earlier days
//! of the same track only, and windows never cross a track boundary.
//!
//! Per-day feature layout (feature 0 is always the raw stream count):
//!
//! | block | columns |
//! |---|---|
//! | demand | `stream_count` |
//! | lags | `lag_{k}` for each configured k |
//! | rolling | `rolling_mean_{s}`, `rolling_std_{s}` for each configured span |
//! | calendar | `day_of_week`, `is_weekend`, `day_of_year` |
//! | covariates | upstream engineered columns, in file order |

use crate::error::{ForecastError, Result};
use crate::series::{DailyObservation, SeriesSet};
use chrono::{Duration, NaiveDate};
use demand_math::calendar::{day_of_week_fraction, day_of_year_fraction, is_weekend};
use demand_math::rolling::{lagged, rolling_mean, rolling_std};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Index of the raw stream count inside every feature vector
pub const STREAM_COUNT_FEATURE: usize = 0;

/// Windowing parameters and enabled derived features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Number of days in each input sequence (L)
    pub window_length: usize,
    /// Number of future days predicted per window (H)
    pub horizon: usize,
    /// Distance between consecutive anchors
    pub stride: usize,
    pub lag_set: Vec<usize>,
    pub rolling_spans: Vec<usize>,
    pub calendar_features: bool,
    pub include_covariates: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_length: 14,
            horizon: 1,
            stride: 1,
            lag_set: vec![1, 7],
            rolling_spans: vec![7],
            calendar_features: true,
            include_covariates: true,
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_length == 0 {
            return Err(ForecastError::ConfigError(
                "window_length must be greater than zero".to_string(),
            ));
        }
        if self.horizon == 0 {
            return Err(ForecastError::ConfigError(
                "horizon must be greater than zero".to_string(),
            ));
        }
        if self.stride == 0 {
            return Err(ForecastError::ConfigError(
                "stride must be greater than zero".to_string(),
            ));
        }
        if self.lag_set.iter().any(|&k| k == 0) {
            return Err(ForecastError::ConfigError(
                "lag_set entries must be greater than zero".to_string(),
            ));
        }
        if self.rolling_spans.iter().any(|&s| s == 0) {
            return Err(ForecastError::ConfigError(
                "rolling_spans entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of windows a track with `len` observations yields
    pub fn windows_for_length(&self, len: usize) -> usize {
        let needed = self.window_length + self.horizon;
        if len < needed {
            0
        } else {
            (len - needed) / self.stride + 1
        }
    }
}

/// One supervised example: L days of features and H future targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWindow {
    pub track_id: String,
    /// Last day of the input sequence
    pub anchor_date: NaiveDate,
    /// Dates of the input rows, ascending
    pub input_dates: Vec<NaiveDate>,
    /// `L` rows of `F` features
    pub input_sequence: Vec<Vec<f64>>,
    /// Dates the targets refer to: anchor + 1 ..= anchor + H
    pub target_dates: Vec<NaiveDate>,
    /// Observed stream counts on `target_dates`; empty for inference windows
    pub target: Vec<f64>,
}

impl FeatureWindow {
    /// Raw stream count on the anchor date
    pub fn last_observed(&self) -> f64 {
        self.input_sequence
            .last()
            .and_then(|row| row.get(STREAM_COUNT_FEATURE))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn feature_count(&self) -> usize {
        self.input_sequence.first().map(|row| row.len()).unwrap_or(0)
    }

    /// Whether the window carries observed targets
    pub fn has_target(&self) -> bool {
        !self.target.is_empty()
    }
}

/// Windows plus the names of their feature columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowedDataset {
    pub feature_names: Vec<String>,
    pub windows: Vec<FeatureWindow>,
}

impl WindowedDataset {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Number of windows per track, ascending by id
    pub fn counts_by_track(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for window in &self.windows {
            match counts.last_mut() {
                Some((id, n)) if *id == window.track_id => *n += 1,
                _ => counts.push((window.track_id.clone(), 1)),
            }
        }
        counts
    }
}

/// Builds [`FeatureWindow`]s from per-track daily series
#[derive(Debug, Clone)]
pub struct FeatureWindower {
    config: WindowConfig,
}

impl FeatureWindower {
    pub fn new(config: WindowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Column names of the per-day feature vector for a given series set
    pub fn feature_names(&self, covariate_names: &[String]) -> Vec<String> {
        let mut names = vec!["stream_count".to_string()];
        names.extend(self.config.lag_set.iter().map(|k| format!("lag_{}", k)));
        for span in &self.config.rolling_spans {
            names.push(format!("rolling_mean_{}", span));
            names.push(format!("rolling_std_{}", span));
        }
        if self.config.calendar_features {
            names.extend(
                ["day_of_week", "is_weekend", "day_of_year"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        if self.config.include_covariates {
            names.extend(covariate_names.iter().cloned());
        }
        names
    }

    /// Per-day feature rows for one track, in date order
    pub fn feature_rows(&self, rows: &[DailyObservation]) -> Result<Vec<Vec<f64>>> {
        let counts: Vec<f64> = rows.iter().map(|o| o.stream_count).collect();

        let lags = self
            .config
            .lag_set
            .iter()
            .map(|&k| lagged(&counts, k))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut rolling = Vec::with_capacity(self.config.rolling_spans.len() * 2);
        for &span in &self.config.rolling_spans {
            rolling.push(rolling_mean(&counts, span)?);
            rolling.push(rolling_std(&counts, span)?);
        }

        let features = rows
            .iter()
            .enumerate()
            .map(|(i, observation)| {
                let mut row = Vec::with_capacity(1 + lags.len() + rolling.len() + 3);
                row.push(observation.stream_count);
                row.extend(lags.iter().map(|lag| lag[i]));
                row.extend(rolling.iter().map(|stat| stat[i]));
                if self.config.calendar_features {
                    row.push(day_of_week_fraction(observation.date));
                    row.push(if is_weekend(observation.date) { 1.0 } else { 0.0 });
                    row.push(day_of_year_fraction(observation.date));
                }
                if self.config.include_covariates {
                    row.extend_from_slice(&observation.covariates);
                }
                row
            })
            .collect();

        Ok(features)
    }

    /// Supervised windows for one track
    pub fn track_windows(&self, rows: &[DailyObservation]) -> Result<Vec<FeatureWindow>> {
        let (l, h) = (self.config.window_length, self.config.horizon);
        if rows.len() < l + h {
            return Ok(Vec::new());
        }

        let features = self.feature_rows(rows)?;
        let windows = (l - 1..rows.len() - h)
            .step_by(self.config.stride)
            .map(|anchor| FeatureWindow {
                track_id: rows[anchor].track_id.clone(),
                anchor_date: rows[anchor].date,
                input_dates: rows[anchor + 1 - l..=anchor].iter().map(|o| o.date).collect(),
                input_sequence: features[anchor + 1 - l..=anchor].to_vec(),
                target_dates: rows[anchor + 1..=anchor + h].iter().map(|o| o.date).collect(),
                target: rows[anchor + 1..=anchor + h]
                    .iter()
                    .map(|o| o.stream_count)
                    .collect(),
            })
            .collect();

        Ok(windows)
    }

    /// Supervised windows for every track, grouped by track then anchor date
    pub fn transform(&self, series: &SeriesSet) -> Result<WindowedDataset> {
        let tracks: Vec<(&String, &Vec<DailyObservation>)> = series.iter().collect();
        let per_track = tracks
            .par_iter()
            .map(|(_, rows)| self.track_windows(rows))
            .collect::<Result<Vec<_>>>()?;

        let windows: Vec<FeatureWindow> = per_track.into_iter().flatten().collect();
        debug!(
            "Built {} windows from {} tracks (L={}, H={}, stride={})",
            windows.len(),
            series.track_count(),
            self.config.window_length,
            self.config.horizon,
            self.config.stride
        );

        Ok(WindowedDataset {
            feature_names: self.feature_names(series.covariate_names()),
            windows,
        })
    }

    /// One window per track anchored on its last observed day
    ///
    /// Targets are empty; `target_dates` holds the H days that follow the
    /// anchor. Tracks shorter than L are skipped.
    pub fn inference_windows(&self, series: &SeriesSet) -> Result<WindowedDataset> {
        let l = self.config.window_length;
        let mut windows = Vec::new();
        for (_, rows) in series.iter() {
            if rows.len() < l {
                continue;
            }
            let features = self.feature_rows(rows)?;
            let anchor = rows.len() - 1;
            let anchor_date = rows[anchor].date;
            windows.push(FeatureWindow {
                track_id: rows[anchor].track_id.clone(),
                anchor_date,
                input_dates: rows[anchor + 1 - l..].iter().map(|o| o.date).collect(),
                input_sequence: features[anchor + 1 - l..].to_vec(),
                target_dates: (1..=self.config.horizon as i64)
                    .map(|d| anchor_date + Duration::days(d))
                    .collect(),
                target: Vec::new(),
            });
        }

        Ok(WindowedDataset {
            feature_names: self.feature_names(series.covariate_names()),
            windows,
        })
    }
}
