//! Data-quality checks over series and windows
//!
//! Checks never stop at the first problem: each one collects every issue it
//! finds and the results are aggregated into a [`ValidationReport`]. Only
//! hard checks can block training.

use crate::error::{ForecastError, Result};
use crate::series::SeriesSet;
use crate::windowing::WindowedDataset;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

/// Number of issues quoted in a check's summary line
const SUMMARY_ISSUES: usize = 5;

pub const SCHEMA_CHECK: &str = "schema";
pub const COMPLETENESS_CHECK: &str = "completeness";
pub const DISTRIBUTION_CHECK: &str = "distribution";
pub const LEAKAGE_CHECK: &str = "leakage";
pub const WINDOW_COUNT_CHECK: &str = "window_count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Failure blocks training
    Hard,
    /// Failure is reported as a warning
    Soft,
}

/// Outcome of one named check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub severity: Severity,
    pub passed: bool,
    pub issues: Vec<String>,
}

impl CheckResult {
    fn from_issues(name: &str, severity: Severity, issues: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            severity,
            passed: issues.is_empty(),
            issues,
        }
    }

    /// One-line human summary
    pub fn detail(&self) -> String {
        if self.passed {
            return "ok".to_string();
        }
        let mut quoted: Vec<&str> = self
            .issues
            .iter()
            .take(SUMMARY_ISSUES)
            .map(|s| s.as_str())
            .collect();
        let more = self.issues.len().saturating_sub(SUMMARY_ISSUES);
        let suffix = if more > 0 {
            format!(" (+{} more)", more)
        } else {
            String::new()
        };
        if quoted.is_empty() {
            quoted.push("failed");
        }
        format!("{}{}", quoted.join("; "), suffix)
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "PASS" } else { "FAIL" };
        write!(
            f,
            "[{}] {} ({:?}): {}",
            status,
            self.name,
            self.severity,
            self.detail()
        )
    }
}

/// Aggregated check results
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn builder() -> ValidationReportBuilder {
        ValidationReportBuilder::default()
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn has_hard_failure(&self) -> bool {
        self.checks
            .iter()
            .any(|c| c.severity == Severity::Hard && !c.passed)
    }

    /// Whether every check, hard or soft, passed
    pub fn is_clean(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Failed soft checks
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.severity == Severity::Soft && !c.passed)
            .collect()
    }

    /// Log every result at the matching level
    pub fn log(&self) {
        for check in &self.checks {
            if check.passed {
                info!("{}", check);
            } else {
                warn!("{}", check);
            }
        }
    }

    /// Fail with `ValidationError` when any hard check failed
    pub fn into_result(self) -> Result<Self> {
        if !self.has_hard_failure() {
            return Ok(self);
        }
        let failed: Vec<String> = self
            .checks
            .iter()
            .filter(|c| c.severity == Severity::Hard && !c.passed)
            .map(|c| format!("{}: {}", c.name, c.detail()))
            .collect();
        Err(ForecastError::ValidationError(failed.join(" | ")))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Accumulates check results into a report
#[derive(Debug, Default)]
pub struct ValidationReportBuilder {
    checks: Vec<CheckResult>,
}

impl ValidationReportBuilder {
    pub fn check(mut self, result: CheckResult) -> Self {
        self.push(result);
        self
    }

    /// Add or replace a check result by name
    pub fn push(&mut self, result: CheckResult) {
        match self.checks.iter_mut().find(|c| c.name == result.name) {
            Some(existing) => *existing = result,
            None => self.checks.push(result),
        }
    }

    pub fn build(self) -> ValidationReport {
        ValidationReport {
            checks: self.checks,
        }
    }
}

/// Thresholds and expectations the checks run against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Inclusive date range every observation must fall in
    pub declared_range: Option<(NaiveDate, NaiveDate)>,
    /// Outlier cut-off in per-track standard deviations
    pub outlier_std_threshold: f64,
    pub window_length: usize,
    pub horizon: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            declared_range: None,
            outlier_std_threshold: 4.0,
            window_length: 14,
            horizon: 1,
        }
    }
}

/// Runs schema, completeness, distribution and leakage checks
#[derive(Debug, Clone)]
pub struct DataQualityValidator {
    config: ValidatorConfig,
}

impl DataQualityValidator {
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        if !(config.outlier_std_threshold > 0.0) {
            return Err(ForecastError::ConfigError(format!(
                "outlier_std_threshold must be positive, got {}",
                config.outlier_std_threshold
            )));
        }
        if let Some((start, end)) = config.declared_range {
            if end < start {
                return Err(ForecastError::ConfigError(format!(
                    "Declared range end {} is before start {}",
                    end, start
                )));
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Series-level checks only
    pub fn validate_series(&self, series: &SeriesSet) -> ValidationReport {
        self.series_checks(series).build()
    }

    /// Series-level checks followed by window checks
    pub fn validate(&self, series: &SeriesSet, dataset: &WindowedDataset) -> ValidationReport {
        self.series_checks(series)
            .check(self.check_leakage(dataset))
            .check(self.check_window_count(series, dataset))
            .build()
    }

    fn series_checks(&self, series: &SeriesSet) -> ValidationReportBuilder {
        ValidationReport::builder()
            .check(self.check_schema(series))
            .check(self.check_completeness(series))
            .check(self.check_distribution(series))
    }

    pub fn check_schema(&self, series: &SeriesSet) -> CheckResult {
        let mut issues = Vec::new();
        if series.is_empty() {
            issues.push("dataset has no rows".to_string());
        }

        for (track_id, rows) in series.iter() {
            if track_id.trim().is_empty() {
                issues.push(format!("{} rows have an empty track_id", rows.len()));
            }
            let mut seen = HashSet::with_capacity(rows.len());
            for observation in rows {
                let date = observation.date;
                if !observation.stream_count.is_finite() {
                    issues.push(format!("{} {}: stream_count is not finite", track_id, date));
                } else if observation.stream_count < 0.0 {
                    issues.push(format!(
                        "{} {}: negative stream_count {}",
                        track_id, date, observation.stream_count
                    ));
                }
                for (name, value) in series.covariate_names().iter().zip(&observation.covariates) {
                    if !value.is_finite() {
                        issues.push(format!("{} {}: {} is not finite", track_id, date, name));
                    }
                }
                if let Some((start, end)) = self.config.declared_range {
                    if date < start || date > end {
                        issues.push(format!(
                            "{} {}: date outside declared range {}..={}",
                            track_id, date, start, end
                        ));
                    }
                }
                if !seen.insert(date) {
                    issues.push(format!("{} {}: duplicate row", track_id, date));
                }
            }
        }

        CheckResult::from_issues(SCHEMA_CHECK, Severity::Hard, issues)
    }

    pub fn check_completeness(&self, series: &SeriesSet) -> CheckResult {
        let mut issues = Vec::new();
        for (track_id, rows) in series.iter() {
            for pair in rows.windows(2) {
                let gap = (pair[1].date - pair[0].date).num_days();
                if gap > 1 {
                    issues.push(format!(
                        "{}: {} missing day(s) between {} and {}",
                        track_id,
                        gap - 1,
                        pair[0].date,
                        pair[1].date
                    ));
                }
            }
        }
        CheckResult::from_issues(COMPLETENESS_CHECK, Severity::Hard, issues)
    }

    pub fn check_distribution(&self, series: &SeriesSet) -> CheckResult {
        let threshold = self.config.outlier_std_threshold;
        let mut issues = Vec::new();
        for (track_id, rows) in series.iter() {
            let counts: Vec<f64> = rows
                .iter()
                .map(|o| o.stream_count)
                .filter(|v| v.is_finite())
                .collect();
            if counts.len() < 2 {
                continue;
            }
            let mean = counts.iter().mean();
            let std_dev = counts.iter().population_std_dev();
            if !(std_dev > 0.0) {
                continue;
            }
            for observation in rows {
                let deviation = (observation.stream_count - mean).abs();
                if deviation > threshold * std_dev {
                    issues.push(format!(
                        "{} {}: stream_count {} is {:.1} std from mean {:.1}",
                        track_id,
                        observation.date,
                        observation.stream_count,
                        deviation / std_dev,
                        mean
                    ));
                }
            }
        }
        CheckResult::from_issues(DISTRIBUTION_CHECK, Severity::Soft, issues)
    }

    pub fn check_leakage(&self, dataset: &WindowedDataset) -> CheckResult {
        let (l, h) = (self.config.window_length, self.config.horizon);
        let mut issues = Vec::new();
        for window in &dataset.windows {
            let label = format!("{} @ {}", window.track_id, window.anchor_date);
            if window.input_sequence.len() != l || window.input_dates.len() != l {
                issues.push(format!(
                    "{}: input length {} != {}",
                    label,
                    window.input_sequence.len(),
                    l
                ));
            }
            if window.target.len() != h || window.target_dates.len() != h {
                issues.push(format!(
                    "{}: target length {} != {}",
                    label,
                    window.target.len(),
                    h
                ));
            }
            if let Some(first_target) = window.target_dates.first() {
                if window.input_dates.iter().any(|d| d >= first_target) {
                    issues.push(format!(
                        "{}: input dates reach first target date {}",
                        label, first_target
                    ));
                }
            }
        }
        CheckResult::from_issues(LEAKAGE_CHECK, Severity::Soft, issues)
    }

    pub fn check_window_count(&self, series: &SeriesSet, dataset: &WindowedDataset) -> CheckResult {
        let produced: HashSet<&str> = dataset.windows.iter().map(|w| w.track_id.as_str()).collect();
        let issues = series
            .iter()
            .filter(|(id, _)| !produced.contains(id.as_str()))
            .map(|(id, rows)| {
                format!(
                    "{}: {} days is shorter than window_length + horizon = {}",
                    id,
                    rows.len(),
                    self.config.window_length + self.config.horizon
                )
            })
            .collect();
        CheckResult::from_issues(WINDOW_COUNT_CHECK, Severity::Soft, issues)
    }
}
