//! Synthetic daily demand generation from catalog metadata
//!
//! The generated signal for a track on day `t` is
//!
//! ```text
//! base     = popularity_score * base_streams_per_point
//! signal   = base * weekly(t) * trend(t) * summer(t) * viral(t)
//! streams  = max(0, round(signal + U(-noise_scale, noise_scale) * base))
//! ```
//!
//! Every track draws from its own seeded generator, so the output depends only
//! on the seed and the inputs, never on thread scheduling.

use crate::catalog::Track;
use crate::error::{ForecastError, Result};
use crate::series::{DailyObservation, SeriesSet};
use chrono::{Datelike, Duration, NaiveDate};
use demand_math::calendar::{is_peak_listening_day, is_summer_month};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::PI;
use tracing::info;

/// Shape of the slow demand trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendKind {
    /// `1 + slope * t`
    #[default]
    Linear,
    /// `1 + slope * ln(1 + t)`
    Log,
}

/// Coefficients of the synthetic demand formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Daily streams per popularity point
    pub base_streams_per_point: f64,
    /// Amplitude of the sinusoidal weekly cycle
    pub seasonality_amplitude: f64,
    pub trend: TrendKind,
    /// Per-day slope of the trend factor
    pub trend_slope: f64,
    /// Half-width of the uniform noise, as a fraction of base demand
    pub noise_scale: f64,
    /// Extra demand on Fridays and Saturdays, drawn uniformly from this range
    pub weekend_boost_min: f64,
    pub weekend_boost_max: f64,
    /// Extra demand during June, July and August
    pub summer_boost: f64,
    pub viral_spike_probability: f64,
    pub viral_multiplier_min: f64,
    pub viral_multiplier_max: f64,
    /// Emit a derived `playlist_adds` covariate
    pub emit_playlist_adds: bool,
    pub playlist_adds_divisor: f64,
    pub random_seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_streams_per_point: 1000.0,
            seasonality_amplitude: 0.1,
            trend: TrendKind::Linear,
            trend_slope: 0.001,
            noise_scale: 0.05,
            weekend_boost_min: 0.1,
            weekend_boost_max: 0.3,
            summer_boost: 0.15,
            viral_spike_probability: 0.01,
            viral_multiplier_min: 2.0,
            viral_multiplier_max: 5.0,
            emit_playlist_adds: false,
            playlist_adds_divisor: 50.0,
            random_seed: 42,
        }
    }
}

impl GeneratorConfig {
    /// Reject coefficient combinations that cannot produce a sane series
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("base_streams_per_point", self.base_streams_per_point),
            ("seasonality_amplitude", self.seasonality_amplitude),
            ("noise_scale", self.noise_scale),
            ("weekend_boost_min", self.weekend_boost_min),
            ("summer_boost", self.summer_boost),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ForecastError::ConfigError(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        let finite = [
            ("trend_slope", self.trend_slope),
            ("weekend_boost_max", self.weekend_boost_max),
            ("viral_multiplier_min", self.viral_multiplier_min),
            ("viral_multiplier_max", self.viral_multiplier_max),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ForecastError::ConfigError(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        if !(self.weekend_boost_max >= self.weekend_boost_min) {
            return Err(ForecastError::ConfigError(format!(
                "weekend_boost_max ({}) must not be below weekend_boost_min ({})",
                self.weekend_boost_max, self.weekend_boost_min
            )));
        }
        if !(0.0..=1.0).contains(&self.viral_spike_probability) {
            return Err(ForecastError::ConfigError(format!(
                "viral_spike_probability must be within [0, 1], got {}",
                self.viral_spike_probability
            )));
        }
        if !(self.viral_multiplier_min >= 1.0 && self.viral_multiplier_max >= self.viral_multiplier_min)
        {
            return Err(ForecastError::ConfigError(format!(
                "viral multipliers must satisfy 1 <= min <= max, got [{}, {}]",
                self.viral_multiplier_min, self.viral_multiplier_max
            )));
        }
        if self.emit_playlist_adds && !(self.playlist_adds_divisor > 0.0) {
            return Err(ForecastError::ConfigError(
                "playlist_adds_divisor must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Turns static catalog metadata into a daily demand history
#[derive(Debug, Clone)]
pub struct SyntheticSeriesGenerator {
    config: GeneratorConfig,
}

impl SyntheticSeriesGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Deterministic base demand of a track
    pub fn base_demand(&self, track: &Track) -> f64 {
        track.popularity_score * self.config.base_streams_per_point
    }

    /// Generate one observation per (track, date) over `[start, end]`
    pub fn generate(&self, tracks: &[Track], start: NaiveDate, end: NaiveDate) -> Result<SeriesSet> {
        if end < start {
            return Err(ForecastError::ConfigError(format!(
                "End date {} is before start date {}",
                end, start
            )));
        }

        let mut seen = HashSet::with_capacity(tracks.len());
        for track in tracks {
            track.check_attributes()?;
            if !seen.insert(track.track_id.as_str()) {
                return Err(ForecastError::ConfigError(format!(
                    "Duplicate track_id '{}'",
                    track.track_id
                )));
            }
        }

        let num_days = (end - start).num_days() + 1;
        info!(
            "Generating {} days of streaming data for {} tracks",
            num_days,
            tracks.len()
        );

        // Seeds follow id order so the caller's slice order does not matter.
        let mut ordered: Vec<&Track> = tracks.iter().collect();
        ordered.sort_by(|a, b| a.track_id.cmp(&b.track_id));

        let per_track: Vec<(String, Vec<DailyObservation>)> = ordered
            .par_iter()
            .enumerate()
            .map(|(position, track)| {
                let seed = derive_seed(self.config.random_seed, position as u64);
                let rows = self.generate_track(track, start, num_days, seed);
                (track.track_id.clone(), rows)
            })
            .collect();

        let covariates = if self.config.emit_playlist_adds {
            vec!["playlist_adds".to_string()]
        } else {
            Vec::new()
        };
        let mut set = SeriesSet::new(covariates);
        for (track_id, rows) in per_track {
            set.insert_track(track_id, rows);
        }

        info!(
            "Generated {} streaming records, {:.0} total streams",
            set.len(),
            set.total_streams()
        );
        Ok(set)
    }

    fn generate_track(
        &self,
        track: &Track,
        start: NaiveDate,
        num_days: i64,
        seed: u64,
    ) -> Vec<DailyObservation> {
        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(seed);
        let base = self.base_demand(track);
        let noise = Uniform::new_inclusive(-cfg.noise_scale, cfg.noise_scale);
        let weekend = Uniform::new_inclusive(cfg.weekend_boost_min, cfg.weekend_boost_max);
        let viral = Uniform::new_inclusive(cfg.viral_multiplier_min, cfg.viral_multiplier_max);
        let playlist_variance = Uniform::new_inclusive(0.8, 1.2);

        (0..num_days)
            .map(|t| {
                let date = start + Duration::days(t);
                let weekday = date.weekday().num_days_from_monday() as f64;

                let mut signal =
                    base * (1.0 + cfg.seasonality_amplitude * (2.0 * PI * weekday / 7.0).sin());
                signal *= trend_factor(cfg.trend, cfg.trend_slope, t as f64);

                // Draws happen unconditionally so every day consumes the same
                // amount of randomness.
                let weekend_boost = weekend.sample(&mut rng);
                let spike_roll: f64 = rng.gen();
                let spike = viral.sample(&mut rng);
                let jitter = noise.sample(&mut rng);
                let playlist_jitter = playlist_variance.sample(&mut rng);

                if is_peak_listening_day(date) {
                    signal *= 1.0 + weekend_boost;
                }
                if is_summer_month(date) {
                    signal *= 1.0 + cfg.summer_boost;
                }
                if spike_roll < cfg.viral_spike_probability {
                    signal *= spike;
                }

                let stream_count = (signal + jitter * base).round().max(0.0);
                let mut observation =
                    DailyObservation::new(track.track_id.clone(), date, stream_count);
                if cfg.emit_playlist_adds {
                    let adds = (stream_count / cfg.playlist_adds_divisor * playlist_jitter).floor();
                    observation = observation.with_covariates(vec![adds]);
                }
                observation
            })
            .collect()
    }
}

fn trend_factor(kind: TrendKind, slope: f64, t: f64) -> f64 {
    let factor = match kind {
        TrendKind::Linear => 1.0 + slope * t,
        TrendKind::Log => 1.0 + slope * t.ln_1p(),
    };
    factor.max(0.0)
}

/// Mix a run seed with a stream index into an independent seed
pub(crate) fn derive_seed(seed: u64, stream: u64) -> u64 {
    // splitmix64 finalizer
    let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_factor_never_negative() {
        assert_eq!(trend_factor(TrendKind::Linear, -0.1, 20.0), 0.0);
        assert_eq!(trend_factor(TrendKind::Log, 0.5, 0.0), 1.0);
    }

    #[test]
    fn test_derived_seeds_differ_by_stream() {
        assert_ne!(derive_seed(42, 0), derive_seed(42, 1));
        assert_eq!(derive_seed(7, 3), derive_seed(7, 3));
    }
}
