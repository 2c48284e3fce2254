//! Trailing-window statistics
//!
//! Contains the rolling mean and rolling standard deviation used for
//! engineered demand features. Unlike a classic simple moving average, a
//! rolling window here reports over the values it has seen so far when fewer
//! than `span` values are available, so the first days of a series still
//! receive a feature value computed only from the past.

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Trailing window over the last `span` values
#[derive(Debug, Clone)]
pub struct RollingWindow {
    span: usize,
    values: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
}

impl RollingWindow {
    /// Create a new rolling window with the specified span
    pub fn new(span: usize) -> Result<Self> {
        if span == 0 {
            return Err(MathError::InvalidInput(
                "Span must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            span,
            values: VecDeque::with_capacity(span),
            sum: 0.0,
            sum_sq: 0.0,
        })
    }

    /// Push a new value, evicting the oldest one once the window is full
    pub fn update(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "Rolling window received a non-finite value: {}",
                value
            )));
        }

        self.values.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;

        if self.values.len() > self.span {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
                self.sum_sq -= old_value * old_value;
            }
        }

        Ok(())
    }

    /// Mean of the values currently in the window
    pub fn mean(&self) -> Result<f64> {
        if self.values.is_empty() {
            return Err(MathError::InsufficientData(
                "Rolling window is empty".to_string(),
            ));
        }

        Ok(self.sum / self.values.len() as f64)
    }

    /// Population standard deviation of the values currently in the window
    pub fn std_dev(&self) -> Result<f64> {
        let mean = self.mean()?;
        let n = self.values.len() as f64;
        // Running sums drift slightly; clamp tiny negative variances.
        let variance = (self.sum_sq / n - mean * mean).max(0.0);

        Ok(variance.sqrt())
    }

    /// Number of values currently held
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the window has seen no values yet
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the window holds a full `span` of values
    pub fn is_full(&self) -> bool {
        self.values.len() == self.span
    }

    /// Get the configured span
    pub fn span(&self) -> usize {
        self.span
    }
}

/// Trailing mean for every position of `values` over at most `span` values
pub fn rolling_mean(values: &[f64], span: usize) -> Result<Vec<f64>> {
    let mut window = RollingWindow::new(span)?;
    let mut out = Vec::with_capacity(values.len());
    for &value in values {
        window.update(value)?;
        out.push(window.mean()?);
    }
    Ok(out)
}

/// Trailing population standard deviation for every position of `values`
pub fn rolling_std(values: &[f64], span: usize) -> Result<Vec<f64>> {
    let mut window = RollingWindow::new(span)?;
    let mut out = Vec::with_capacity(values.len());
    for &value in values {
        window.update(value)?;
        out.push(window.std_dev()?);
    }
    Ok(out)
}

/// Value `lag` positions earlier, backfilled with the first value
///
/// Position `i` receives `values[i - lag]` when it exists and `values[0]`
/// otherwise, so a lagged feature never reads ahead of its own position.
pub fn lagged(values: &[f64], lag: usize) -> Result<Vec<f64>> {
    if lag == 0 {
        return Err(MathError::InvalidInput(
            "Lag must be greater than zero".to_string(),
        ));
    }

    let Some(&first) = values.first() else {
        return Ok(Vec::new());
    };

    Ok((0..values.len())
        .map(|i| if i >= lag { values[i - lag] } else { first })
        .collect())
}
