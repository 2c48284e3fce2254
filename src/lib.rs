//! # Streamcast
//!
//! `streamcast` bundles the workspace crates behind one dependency:
//! [`forecast`] holds the generation, windowing, validation, training and
//! evaluation pipeline, and [`math`] the rolling statistics and calendar
//! encodings it is built on.
//!
//! ## Example
//!
//! ```
//! use streamcast::math::rolling::rolling_mean;
//!
//! let smoothed = rolling_mean(&[2.0, 4.0, 6.0, 8.0], 2).unwrap();
//! assert_eq!(smoothed.last(), Some(&7.0));
//! ```

pub use demand_forecast as forecast;
pub use demand_math as math;

pub use demand_forecast::{
    Catalog, DemandForecastModel, ForecastError, Pipeline, PipelineConfig, SeriesSet, Track,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facade_exposes_pipeline() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        assert_eq!(pipeline.config().window_length, 14);
        assert_eq!(forecast::NAME, "demand_forecast");
    }
}
