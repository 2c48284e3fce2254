use chrono::{Duration, NaiveDate};
use demand_forecast::catalog::{Catalog, Track};
use demand_forecast::config::PipelineConfig;
use demand_forecast::error::ForecastError;
use demand_forecast::model::{DemandForecastModel, ModelConfig, Normalizer};
use demand_forecast::pipeline::Pipeline;
use demand_forecast::validation::{COMPLETENESS_CHECK, WINDOW_COUNT_CHECK};
use pretty_assertions::assert_eq;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
}

fn catalog() -> Catalog {
    let tracks = [("T1", "pop", 80.0), ("T2", "rock", 45.0), ("T3", "jazz", 20.0)]
        .iter()
        .map(|(id, genre, popularity)| Track {
            track_id: id.to_string(),
            genre: genre.to_string(),
            popularity_score: *popularity,
            duration_seconds: 180,
            release_date: NaiveDate::from_ymd_opt(2022, 3, 4).unwrap(),
            artist_id: format!("A-{}", id),
            track_name: None,
        })
        .collect();
    Catalog::new(tracks).unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig {
        window_length: 14,
        horizon: 2,
        hidden_size: 8,
        num_epochs: 2,
        batch_size: 16,
        learning_rate: 0.01,
        validation_split_fraction: 0.3,
        checkpoint_dir: None,
        ..Default::default()
    }
}

fn no_stop() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

#[test]
fn test_train_evaluates_and_forecasts() {
    let pipeline = Pipeline::new(config()).unwrap();
    let catalog = catalog();
    let series = pipeline.generate(&catalog, start(), end()).unwrap();

    let outcome = pipeline
        .train(&series, Some(&catalog), Some((start(), end())), no_stop())
        .unwrap();

    assert!(!outcome.validation.has_hard_failure());
    assert_eq!(outcome.run.epochs.len(), 2);
    assert_eq!(outcome.run.split.validation.len(), 1);
    // 60 days, L=14, H=2: 45 windows per track
    assert_eq!(outcome.run.validation_windows, 45);
    assert_eq!(outcome.evaluation.windows, 45);
    assert_eq!(outcome.evaluation.by_genre.len(), 1);
    assert_eq!(
        outcome.model.feature_names(),
        pipeline.windower().feature_names(&[]).as_slice()
    );

    // held-out rows plus two future days for every track
    let future: Vec<_> = outcome
        .forecasts
        .rows
        .iter()
        .filter(|r| r.actual_demand.is_none())
        .collect();
    assert_eq!(future.len(), 6);
    assert!(future.iter().all(|r| r.anchor_date == end() && r.target_date > end()));
    assert_eq!(outcome.forecasts.len(), 45 * 2 + 6);
    assert!(outcome.forecasts.rows.iter().all(|r| r.predicted_demand >= 0.0));
}

#[test]
fn test_missing_day_blocks_training() {
    let pipeline = Pipeline::new(config()).unwrap();
    let mut series = pipeline.generate(&catalog(), start(), end()).unwrap();
    let mut rows = series.track("T2").unwrap().to_vec();
    rows.remove(20);
    series.insert_track("T2", rows);

    let (dataset, report) = pipeline.prepare(&series, None).unwrap();
    assert!(dataset.is_empty());
    assert!(report.has_hard_failure());
    assert!(!report.check(COMPLETENESS_CHECK).unwrap().passed);

    match pipeline.train(&series, None, None, no_stop()) {
        Err(ForecastError::ValidationError(msg)) => assert!(msg.contains(COMPLETENESS_CHECK)),
        other => panic!("expected a validation error, got {:?}", other.map(|o| o.run.epochs)),
    }
}

#[test]
fn test_prepare_reports_window_counts() {
    let pipeline = Pipeline::new(config()).unwrap();
    let series = pipeline.generate(&catalog(), start(), end()).unwrap();
    let (dataset, report) = pipeline.prepare(&series, Some((start(), end()))).unwrap();

    assert_eq!(dataset.len(), 3 * 45);
    assert!(report.check(WINDOW_COUNT_CHECK).unwrap().passed);
}

#[test]
fn test_forecast_rejects_feature_mismatch() {
    let pipeline = Pipeline::new(config()).unwrap();
    let series = pipeline.generate(&catalog(), start(), end()).unwrap();
    let model = DemandForecastModel::new(
        ModelConfig {
            input_size: 1,
            hidden_size: 4,
            horizon: 2,
            seed: 1,
        },
        Normalizer::identity(1),
        vec!["stream_count".to_string()],
    )
    .unwrap();

    assert!(matches!(
        pipeline.forecast(&model, &series),
        Err(ForecastError::ConfigError(_))
    ));
}

#[test]
fn test_forecast_rejects_horizon_mismatch() {
    let pipeline = Pipeline::new(config()).unwrap();
    let series = pipeline.generate(&catalog(), start(), end()).unwrap();
    let names = pipeline.windower().feature_names(series.covariate_names());
    let model = DemandForecastModel::new(
        ModelConfig {
            input_size: names.len(),
            hidden_size: 4,
            horizon: 3,
            seed: 1,
        },
        Normalizer::identity(names.len()),
        names,
    )
    .unwrap();

    match pipeline.forecast(&model, &series) {
        Err(ForecastError::ConfigError(msg)) => assert!(msg.contains("horizon")),
        other => panic!("expected a config error, got {:?}", other.map(|t| t.len())),
    }
}

#[test]
fn test_forecast_with_saved_model() {
    let pipeline = Pipeline::new(config()).unwrap();
    let catalog = catalog();
    let series = pipeline.generate(&catalog, start(), end()).unwrap();
    let outcome = pipeline.train(&series, Some(&catalog), None, no_stop()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.ckpt");
    outcome.model.save(&path).unwrap();
    let restored = DemandForecastModel::load(&path).unwrap();

    let table = pipeline.forecast(&restored, &series).unwrap();
    assert_eq!(table.len(), 6);
    assert_eq!(table.rows[0].target_date, end() + Duration::days(1));
    assert_eq!(table.rows[1].target_date, end() + Duration::days(2));
    let from_outcome: Vec<_> = outcome
        .forecasts
        .rows
        .iter()
        .filter(|r| r.actual_demand.is_none())
        .cloned()
        .collect();
    assert_eq!(table.rows, from_outcome);
}
