use chrono::{Duration, NaiveDate};
use demand_forecast::catalog::Track;
use demand_forecast::error::ForecastError;
use demand_forecast::generator::{GeneratorConfig, SyntheticSeriesGenerator, TrendKind};
use pretty_assertions::assert_eq;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn track(id: &str, genre: &str, popularity: f64) -> Track {
    Track {
        track_id: id.to_string(),
        genre: genre.to_string(),
        popularity_score: popularity,
        duration_seconds: 200,
        release_date: date(2020, 5, 1),
        artist_id: format!("artist-{}", id),
        track_name: None,
    }
}

fn catalog() -> Vec<Track> {
    vec![
        track("T001", "pop", 80.0),
        track("T002", "rock", 35.0),
        track("T003", "jazz", 0.0),
    ]
}

#[test]
fn test_generation_is_deterministic() {
    let generator = SyntheticSeriesGenerator::new(GeneratorConfig::default()).unwrap();
    let a = generator.generate(&catalog(), date(2024, 1, 1), date(2024, 3, 31)).unwrap();
    let b = generator.generate(&catalog(), date(2024, 1, 1), date(2024, 3, 31)).unwrap();
    assert_eq!(a, b);

    let mut reversed = catalog();
    reversed.reverse();
    let c = generator.generate(&reversed, date(2024, 1, 1), date(2024, 3, 31)).unwrap();
    assert_eq!(a, c);
}

#[test]
fn test_different_seeds_differ() {
    let a = SyntheticSeriesGenerator::new(GeneratorConfig::default())
        .unwrap()
        .generate(&catalog(), date(2024, 1, 1), date(2024, 1, 31))
        .unwrap();
    let b = SyntheticSeriesGenerator::new(GeneratorConfig {
        random_seed: 7,
        ..Default::default()
    })
    .unwrap()
    .generate(&catalog(), date(2024, 1, 1), date(2024, 1, 31))
    .unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_one_row_per_day_without_gaps() {
    let generator = SyntheticSeriesGenerator::new(GeneratorConfig::default()).unwrap();
    let start = date(2024, 2, 1);
    let end = date(2024, 3, 1);
    let series = generator.generate(&catalog(), start, end).unwrap();

    assert_eq!(series.track_count(), 3);
    assert_eq!(series.len(), 3 * 30);
    for (_, rows) in series.iter() {
        assert_eq!(rows.first().unwrap().date, start);
        assert_eq!(rows.last().unwrap().date, end);
        for pair in rows.windows(2) {
            assert_eq!(pair[1].date - pair[0].date, Duration::days(1));
        }
        for row in rows {
            assert!(row.stream_count >= 0.0);
            assert_eq!(row.stream_count, row.stream_count.round());
        }
    }
}

#[test]
fn test_zero_popularity_stays_near_zero() {
    let generator = SyntheticSeriesGenerator::new(GeneratorConfig::default()).unwrap();
    let series = generator
        .generate(&catalog(), date(2024, 1, 1), date(2024, 1, 31))
        .unwrap();
    assert!(series.track("T003").unwrap().iter().all(|o| o.stream_count == 0.0));
}

#[test]
fn test_single_day_range() {
    let generator = SyntheticSeriesGenerator::new(GeneratorConfig::default()).unwrap();
    let series = generator
        .generate(&catalog(), date(2024, 6, 1), date(2024, 6, 1))
        .unwrap();
    assert_eq!(series.len(), 3);
}

#[test]
fn test_end_before_start_is_config_error() {
    let generator = SyntheticSeriesGenerator::new(GeneratorConfig::default()).unwrap();
    let err = generator
        .generate(&catalog(), date(2024, 2, 1), date(2024, 1, 1))
        .unwrap_err();
    assert!(matches!(err, ForecastError::ConfigError(_)));
}

#[test]
fn test_missing_attribute_is_config_error() {
    let mut tracks = catalog();
    tracks[1].genre = "  ".to_string();
    let generator = SyntheticSeriesGenerator::new(GeneratorConfig::default()).unwrap();
    let err = generator
        .generate(&tracks, date(2024, 1, 1), date(2024, 1, 10))
        .unwrap_err();
    assert!(matches!(err, ForecastError::ConfigError(_)));
}

#[test]
fn test_duplicate_track_is_config_error() {
    let mut tracks = catalog();
    tracks.push(track("T001", "pop", 10.0));
    let generator = SyntheticSeriesGenerator::new(GeneratorConfig::default()).unwrap();
    assert!(generator
        .generate(&tracks, date(2024, 1, 1), date(2024, 1, 10))
        .is_err());
}

#[test]
fn test_invalid_coefficients_rejected() {
    let defaults = GeneratorConfig::default;
    for config in [
        GeneratorConfig { viral_spike_probability: 1.5, ..defaults() },
        GeneratorConfig { weekend_boost_max: f64::INFINITY, ..defaults() },
        GeneratorConfig { viral_multiplier_max: f64::INFINITY, ..defaults() },
        GeneratorConfig {
            viral_multiplier_min: f64::INFINITY,
            viral_multiplier_max: f64::INFINITY,
            ..defaults()
        },
        GeneratorConfig { trend_slope: f64::NAN, ..defaults() },
    ] {
        assert!(matches!(
            SyntheticSeriesGenerator::new(config),
            Err(ForecastError::ConfigError(_))
        ));
    }
}

#[test]
fn test_infinite_bounds_in_toml_are_config_errors() {
    let config: GeneratorConfig = toml::from_str("weekend_boost_max = inf").unwrap();
    assert!(matches!(config.validate(), Err(ForecastError::ConfigError(_))));
}

#[test]
fn test_noise_free_signal_follows_formula() {
    // no noise, no spikes, no weekend boost: only the weekly cycle and trend remain
    let config = GeneratorConfig {
        noise_scale: 0.0,
        weekend_boost_min: 0.0,
        weekend_boost_max: 0.0,
        summer_boost: 0.0,
        viral_spike_probability: 0.0,
        seasonality_amplitude: 0.0,
        trend: TrendKind::Linear,
        trend_slope: 0.01,
        ..Default::default()
    };
    let generator = SyntheticSeriesGenerator::new(config).unwrap();
    let series = generator
        .generate(&[track("T1", "pop", 10.0)], date(2024, 1, 1), date(2024, 1, 11))
        .unwrap();
    let rows = series.track("T1").unwrap();
    assert_eq!(rows[0].stream_count, 10_000.0);
    assert_eq!(rows[10].stream_count, 11_000.0);
}

#[test]
fn test_playlist_adds_covariate() {
    let config = GeneratorConfig {
        emit_playlist_adds: true,
        ..Default::default()
    };
    let generator = SyntheticSeriesGenerator::new(config).unwrap();
    let series = generator
        .generate(&catalog(), date(2024, 1, 1), date(2024, 1, 14))
        .unwrap();
    assert_eq!(series.covariate_names(), &["playlist_adds".to_string()]);
    for (_, rows) in series.iter() {
        for row in rows {
            assert_eq!(row.covariates.len(), 1);
            assert!(row.covariates[0] >= 0.0);
            assert!(row.covariates[0] <= row.stream_count);
        }
    }
}
