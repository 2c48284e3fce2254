//! Metrics for evaluating forecast accuracy

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Evaluate forecast accuracy against actual values
pub fn evaluate_forecast(forecast: &[f64], actual: &[f64]) -> Result<AccuracyMetrics> {
    if forecast.len() != actual.len() || forecast.is_empty() {
        return Err(ForecastError::DataError(
            "Forecast and actual values must have the same non-zero length".to_string(),
        ));
    }

    let mut acc = AccuracyAccumulator::default();
    for (f, a) in forecast.iter().zip(actual) {
        acc.push(*f, *a);
    }
    Ok(acc.finish())
}

/// Forecast accuracy metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error over non-zero actuals, in percent;
    /// `None` when every actual is zero
    pub mape: Option<f64>,
    /// Number of (prediction, actual) pairs
    pub count: usize,
}

impl AccuracyMetrics {
    /// Relative improvement of `self` over `baseline`, per metric
    pub fn improvement_over(&self, baseline: &AccuracyMetrics) -> Improvement {
        Improvement {
            mae: relative_improvement(baseline.mae, self.mae),
            rmse: relative_improvement(baseline.rmse, self.rmse),
            mape: match (baseline.mape, self.mape) {
                (Some(base), Some(model)) => Some(relative_improvement(base, model)),
                _ => None,
            },
        }
    }
}

impl std::fmt::Display for AccuracyMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MAE {:.2}  RMSE {:.2}  MAPE ", self.mae, self.rmse)?;
        match self.mape {
            Some(mape) => write!(f, "{:.2}%", mape)?,
            None => write!(f, "n/a")?,
        }
        write!(f, "  (n={})", self.count)
    }
}

/// `(baseline - model) / baseline`; positive means the model is better
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub mae: f64,
    pub rmse: f64,
    pub mape: Option<f64>,
}

/// Zero when the baseline error is zero
pub fn relative_improvement(baseline: f64, model: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (baseline - model) / baseline
    }
}

/// Running sums behind [`AccuracyMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccuracyAccumulator {
    abs_error: f64,
    sq_error: f64,
    pct_error: f64,
    count: usize,
    nonzero: usize,
}

impl AccuracyAccumulator {
    pub fn push(&mut self, forecast: f64, actual: f64) {
        let error = forecast - actual;
        self.abs_error += error.abs();
        self.sq_error += error * error;
        self.count += 1;
        if actual != 0.0 {
            self.pct_error += (error / actual).abs();
            self.nonzero += 1;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finish(&self) -> AccuracyMetrics {
        if self.count == 0 {
            return AccuracyMetrics {
                mae: 0.0,
                rmse: 0.0,
                mape: None,
                count: 0,
            };
        }
        let n = self.count as f64;
        AccuracyMetrics {
            mae: self.abs_error / n,
            rmse: (self.sq_error / n).sqrt(),
            mape: (self.nonzero > 0).then(|| self.pct_error / self.nonzero as f64 * 100.0),
            count: self.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_metrics_skip_zero_actuals_for_mape() {
        let m = evaluate_forecast(&[10.0, 5.0, 2.0], &[8.0, 0.0, 4.0]).unwrap();
        assert_relative_eq!(m.mae, 3.0);
        assert_relative_eq!(m.rmse, (33.0f64 / 3.0).sqrt());
        // (2/8 + 2/4) / 2 = 37.5%
        assert_relative_eq!(m.mape.unwrap(), 37.5);
    }

    #[test]
    fn test_all_zero_actuals_have_no_mape() {
        let m = evaluate_forecast(&[1.0], &[0.0]).unwrap();
        assert_eq!(m.mape, None);
    }

    #[test]
    fn test_relative_improvement() {
        assert_relative_eq!(relative_improvement(10.0, 7.5), 0.25);
        assert_eq!(relative_improvement(0.0, 3.0), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(evaluate_forecast(&[1.0, 2.0], &[1.0]).is_err());
    }
}
