//! Summary statistics and standardization

use crate::{MathError, Result};
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Arithmetic mean of a slice
pub fn mean<T: Float>(values: &[T]) -> Result<T> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot compute the mean of an empty slice".to_string(),
        ));
    }

    let sum = values.iter().fold(T::zero(), |acc, &v| acc + v);
    let n = T::from(values.len()).ok_or_else(|| {
        MathError::CalculationError("Slice length is not representable".to_string())
    })?;

    Ok(sum / n)
}

/// Population standard deviation of a slice
pub fn population_std<T: Float>(values: &[T]) -> Result<T> {
    let m = mean(values)?;
    let n = T::from(values.len()).ok_or_else(|| {
        MathError::CalculationError("Slice length is not representable".to_string())
    })?;
    let variance = values
        .iter()
        .fold(T::zero(), |acc, &v| acc + (v - m) * (v - m))
        / n;

    Ok(variance.sqrt())
}

/// Zero-mean, unit-variance scaling fitted once and reused unchanged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    mean: f64,
    std_dev: f64,
}

impl Standardizer {
    /// Fit on a sample; a zero spread falls back to a unit scale
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MathError::InvalidInput(
                "Cannot fit a standardizer on non-finite values".to_string(),
            ));
        }

        let mean = mean(values)?;
        let std_dev = population_std(values)?;

        Ok(Self {
            mean,
            std_dev: if std_dev > f64::EPSILON { std_dev } else { 1.0 },
        })
    }

    /// Identity scaling
    pub fn identity() -> Self {
        Self {
            mean: 0.0,
            std_dev: 1.0,
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }

    pub fn inverse(&self, value: f64) -> f64 {
        value * self.std_dev + self.mean
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_std() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&data).unwrap(), 5.0);
        assert_eq!(population_std(&data).unwrap(), 2.0);

        let data32 = [1.0f32, 3.0];
        assert_eq!(mean(&data32).unwrap(), 2.0);

        let empty: [f64; 0] = [];
        assert!(mean(&empty).is_err());
    }

    #[test]
    fn test_standardizer_round_trip() {
        let scaler = Standardizer::fit(&[10.0, 20.0, 30.0]).unwrap();
        assert_relative_eq!(scaler.transform(20.0), 0.0);
        assert_relative_eq!(scaler.inverse(scaler.transform(27.5)), 27.5, epsilon = 1e-12);

        let flat = Standardizer::fit(&[5.0, 5.0]).unwrap();
        assert_eq!(flat.std_dev(), 1.0);
        assert!(Standardizer::fit(&[1.0, f64::INFINITY]).is_err());
    }
}
