//! Daily demand series, partitioned by track
//!
//! A [`SeriesSet`] is the arena-by-track view of a daily demand table: every
//! track owns its own ascending run of [`DailyObservation`]s, so windowing and
//! leakage invariants can be checked one track at a time. Series sets are
//! written as the staging dataset and read back from the upstream mart table.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Date format used by every tabular file the pipeline reads or writes
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Columns every daily demand table must carry
pub const REQUIRED_COLUMNS: [&str; 3] = ["track_id", "date", "stream_count"];

/// Largest magnitude below which every integer is exactly representable in `f64`
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// One (track, date) row of demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub track_id: String,
    pub date: NaiveDate,
    pub stream_count: f64,
    /// Extra numeric columns, in the owning set's covariate order
    pub covariates: Vec<f64>,
}

impl DailyObservation {
    pub fn new(track_id: impl Into<String>, date: NaiveDate, stream_count: f64) -> Self {
        Self {
            track_id: track_id.into(),
            date,
            stream_count,
            covariates: Vec::new(),
        }
    }

    pub fn with_covariates(mut self, covariates: Vec<f64>) -> Self {
        self.covariates = covariates;
        self
    }
}

/// Daily observations grouped by track id, each track sorted by date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSet {
    tracks: BTreeMap<String, Vec<DailyObservation>>,
    covariate_names: Vec<String>,
}

impl SeriesSet {
    /// Create an empty set with the given covariate columns
    pub fn new(covariate_names: Vec<String>) -> Self {
        Self {
            tracks: BTreeMap::new(),
            covariate_names,
        }
    }

    /// Build a set from unordered rows
    ///
    /// Rows are grouped by track and sorted by date. Duplicated or missing
    /// dates are kept as-is so the validator can report them.
    pub fn from_observations(
        observations: Vec<DailyObservation>,
        covariate_names: Vec<String>,
    ) -> Result<Self> {
        let mut set = Self::new(covariate_names);
        for observation in observations {
            set.push(observation)?;
        }
        for rows in set.tracks.values_mut() {
            rows.sort_by_key(|o| o.date);
        }
        Ok(set)
    }

    /// Append one row to its track, checking the covariate arity
    pub fn push(&mut self, observation: DailyObservation) -> Result<()> {
        if observation.covariates.len() != self.covariate_names.len() {
            return Err(ForecastError::DataError(format!(
                "Observation for '{}' on {} has {} covariates, expected {}",
                observation.track_id,
                observation.date,
                observation.covariates.len(),
                self.covariate_names.len()
            )));
        }
        self.tracks
            .entry(observation.track_id.clone())
            .or_default()
            .push(observation);
        Ok(())
    }

    /// Replace one track's rows wholesale
    pub fn insert_track(&mut self, track_id: impl Into<String>, rows: Vec<DailyObservation>) {
        self.tracks.insert(track_id.into(), rows);
    }

    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// Tracks in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<DailyObservation>)> {
        self.tracks.iter()
    }

    pub fn track(&self, track_id: &str) -> Option<&[DailyObservation]> {
        self.tracks.get(track_id).map(|rows| rows.as_slice())
    }

    pub fn track_ids(&self) -> Vec<&str> {
        self.tracks.keys().map(|k| k.as_str()).collect()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Total number of rows across tracks
    pub fn len(&self) -> usize {
        self.tracks.values().map(|rows| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest and latest date across all tracks
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.tracks.values().filter_map(|r| r.first()).map(|o| o.date).min()?;
        let last = self.tracks.values().filter_map(|r| r.last()).map(|o| o.date).max()?;
        Some((first, last))
    }

    /// Sum of stream counts across all rows
    pub fn total_streams(&self) -> f64 {
        self.tracks
            .values()
            .flat_map(|rows| rows.iter())
            .map(|o| o.stream_count)
            .sum()
    }

    /// Flatten into a data frame with `track_id`, `date`, `stream_count` and covariates
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let rows = self.len();
        let mut track_ids = Vec::with_capacity(rows);
        let mut dates = Vec::with_capacity(rows);
        let mut counts = Vec::with_capacity(rows);
        let mut covariates: Vec<Vec<f64>> =
            vec![Vec::with_capacity(rows); self.covariate_names.len()];

        for observation in self.tracks.values().flat_map(|r| r.iter()) {
            track_ids.push(observation.track_id.clone());
            dates.push(observation.date.format(DATE_FORMAT).to_string());
            counts.push(observation.stream_count);
            for (column, value) in covariates.iter_mut().zip(&observation.covariates) {
                column.push(*value);
            }
        }

        // Whole counts keep the integer staging schema; fractional ones stay f64.
        let whole = counts
            .iter()
            .all(|c| c.fract() == 0.0 && c.abs() < MAX_EXACT_INTEGER);
        let stream_counts = if whole {
            let integral: Vec<i64> = counts.iter().map(|c| *c as i64).collect();
            Series::new("stream_count", integral)
        } else {
            Series::new("stream_count", counts)
        };
        let mut columns = vec![
            Series::new("track_id", track_ids),
            Series::new("date", dates),
            stream_counts,
        ];
        for (name, values) in self.covariate_names.iter().zip(covariates) {
            columns.push(Series::new(name, values));
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Write the set as a staging CSV
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).has_header(true).finish(&mut df)?;
        info!(
            "Saved {} daily rows for {} tracks to {}",
            df.height(),
            self.track_count(),
            path.display()
        );
        Ok(())
    }

    /// Read a mart (or staging) CSV
    ///
    /// `track_id`, `date` and `stream_count` are required. Every other
    /// numeric column becomes a covariate in file order; non-numeric extra
    /// columns are skipped.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading daily demand table from {}", path.display());
        let df = CsvReader::from_path(path)?
            .has_header(true)
            .infer_schema(Some(1000))
            .finish()?;
        Self::from_dataframe(&df)
    }

    /// Build a set from an in-memory data frame
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let columns: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|required| !columns.iter().any(|c| c == required))
            .collect();
        if !missing.is_empty() {
            return Err(ForecastError::ValidationError(format!(
                "Missing required columns: {:?}",
                missing
            )));
        }

        let track_ids = string_column(df, "track_id")?;
        let dates = string_column(df, "date")?;
        let counts = numeric_column(df, "stream_count")?;

        let mut covariate_names = Vec::new();
        let mut covariate_values = Vec::new();
        for name in columns.iter().filter(|c| !REQUIRED_COLUMNS.contains(&c.as_str())) {
            let dtype = df.column(name)?.dtype().clone();
            if dtype.is_numeric() {
                covariate_values.push(numeric_column(df, name)?);
                covariate_names.push(name.clone());
            } else {
                debug!("Skipping non-numeric column '{}' ({:?})", name, dtype);
            }
        }

        let mut observations = Vec::with_capacity(df.height());
        for row in 0..df.height() {
            let track_id = track_ids[row].clone().ok_or_else(|| {
                ForecastError::ValidationError(format!("Row {} has an empty track_id", row + 1))
            })?;
            let raw_date = dates[row].as_deref().ok_or_else(|| {
                ForecastError::ValidationError(format!("Row {} has an empty date", row + 1))
            })?;
            let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT).map_err(|e| {
                ForecastError::ValidationError(format!(
                    "Row {} has an invalid date '{}': {}",
                    row + 1,
                    raw_date,
                    e
                ))
            })?;
            let stream_count = counts[row].ok_or_else(|| {
                ForecastError::ValidationError(format!("Row {} has an empty stream_count", row + 1))
            })?;
            let covariates = covariate_values
                .iter()
                .map(|column| column[row].unwrap_or(f64::NAN))
                .collect();

            observations.push(
                DailyObservation::new(track_id, date, stream_count).with_covariates(covariates),
            );
        }

        let set = Self::from_observations(observations, covariate_names)?;
        info!(
            "Loaded {} rows for {} tracks ({} covariates)",
            set.len(),
            set.track_count(),
            set.covariate_names.len()
        );
        Ok(set)
    }
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(name)?.cast(&DataType::Utf8)?;
    let values = series
        .utf8()?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .collect();
    Ok(values)
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64).map_err(|e| {
        ForecastError::ValidationError(format!("Column '{}' is not numeric: {}", name, e))
    })?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}
