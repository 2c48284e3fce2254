use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use demand_forecast::evaluator::{Evaluator, ForecastTable, UNKNOWN_GENRE};
use demand_forecast::model::{DemandForecastModel, ModelConfig, Normalizer};
use demand_forecast::windowing::{FeatureWindow, WindowedDataset};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use tempfile::tempdir;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

/// Two-day window with a single stream-count feature
fn window(track: &str, anchor: NaiveDate, last: f64, target: Vec<f64>, horizon: usize) -> FeatureWindow {
    FeatureWindow {
        track_id: track.to_string(),
        anchor_date: anchor,
        input_dates: vec![anchor - Duration::days(1), anchor],
        input_sequence: vec![vec![last * 0.9], vec![last]],
        target_dates: (1..=horizon as i64).map(|h| anchor + Duration::days(h)).collect(),
        target,
    }
}

fn genres() -> BTreeMap<String, String> {
    [("T1", "pop"), ("T2", "rock")]
        .iter()
        .map(|(t, g)| (t.to_string(), g.to_string()))
        .collect()
}

#[test]
fn test_score_against_naive_baseline() {
    let windows = vec![
        window("T1", day(10), 100.0, vec![110.0], 1),
        window("T2", day(10), 50.0, vec![40.0], 1),
        window("T3", day(10), 0.0, vec![0.0], 1),
        window("T1", day(11), 110.0, vec![], 1),
    ];
    let predictions = vec![vec![108.0], vec![45.0], vec![1.0], vec![120.0]];

    let report = Evaluator::new(genres()).score(&windows, &predictions).unwrap();

    assert_eq!(report.windows, 3);
    assert_eq!(report.overall.model.count, 3);
    assert_relative_eq!(report.overall.model.mae, 8.0 / 3.0);
    assert_relative_eq!(report.overall.baseline.mae, 20.0 / 3.0);
    assert_relative_eq!(report.overall.improvement.mae, 0.6);
    assert_relative_eq!(
        report.overall.model.mape.unwrap(),
        (2.0 / 110.0 + 5.0 / 40.0) / 2.0 * 100.0,
        epsilon = 1e-9
    );
    assert_relative_eq!(
        report.overall.baseline.rmse,
        (200.0f64 / 3.0).sqrt(),
        epsilon = 1e-9
    );

    let keys: Vec<&str> = report.by_genre.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["pop", "rock", UNKNOWN_GENRE]);
    let unknown = &report.by_genre[UNKNOWN_GENRE];
    assert_eq!(unknown.baseline.mae, 0.0);
    assert_eq!(unknown.improvement.mae, 0.0);
    assert_eq!(unknown.model.mape, None);
    assert_relative_eq!(report.by_genre["rock"].improvement.mae, 0.5);
}

#[test]
fn test_score_requires_observed_targets() {
    let windows = vec![window("T1", day(10), 5.0, vec![], 2)];
    assert!(Evaluator::default().score(&windows, &[vec![1.0, 2.0]]).is_err());
}

#[test]
fn test_score_rejects_mismatched_lengths() {
    let windows = vec![window("T1", day(10), 5.0, vec![6.0, 7.0], 2)];
    assert!(Evaluator::default().score(&windows, &[]).is_err());
    assert!(Evaluator::default().score(&windows, &[vec![1.0]]).is_err());
}

#[test]
fn test_baseline_repeats_last_value() {
    let w = window("T1", day(10), 42.0, vec![1.0, 2.0, 3.0], 3);
    assert_eq!(Evaluator::baseline(&w), vec![42.0, 42.0, 42.0]);
    assert_eq!(Evaluator::default().genre_of("T9"), UNKNOWN_GENRE);
    assert_eq!(Evaluator::new(genres()).genre_of("T2"), "rock");
}

#[test]
fn test_forecast_table_rows_and_csv() {
    let windows = vec![
        window("T2", day(10), 5.0, vec![], 2),
        window("T1", day(10), 5.0, vec![6.0, 7.0], 2),
    ];
    let mut table = ForecastTable::from_predictions(&windows[1..], &[vec![6.5, 7.5]]).unwrap();
    table.extend(ForecastTable::from_predictions(&windows[..1], &[vec![4.0, 3.0]]).unwrap());

    assert_eq!(table.len(), 4);
    let order: Vec<(&str, NaiveDate)> = table
        .rows
        .iter()
        .map(|r| (r.track_id.as_str(), r.target_date))
        .collect();
    assert_eq!(
        order,
        vec![("T1", day(11)), ("T1", day(12)), ("T2", day(11)), ("T2", day(12))]
    );
    assert_eq!(table.rows[1].actual_demand, Some(7.0));
    assert_eq!(table.rows[2].actual_demand, None);

    let dir = tempdir().unwrap();
    let path = dir.path().join("out").join("forecast.csv");
    table.write_csv(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "track_id,anchor_date,target_date,predicted_demand,actual_demand"
    );
    assert_eq!(lines.len(), 5);
    assert!(lines[1].starts_with("T1,2024-01-10,2024-01-11,"));
    assert!(lines[3].starts_with("T2,2024-01-10,2024-01-11,"));
    assert!(lines[3].ends_with(','));
}

#[test]
fn test_evaluate_with_model() {
    let model = DemandForecastModel::new(
        ModelConfig {
            input_size: 1,
            hidden_size: 4,
            horizon: 2,
            seed: 3,
        },
        Normalizer::identity(1),
        Vec::new(),
    )
    .unwrap();
    let dataset = WindowedDataset {
        feature_names: vec!["stream_count".into()],
        windows: vec![
            window("T1", day(10), 5.0, vec![6.0, 7.0], 2),
            window("T2", day(10), 8.0, vec![8.0, 9.0], 2),
        ],
    };

    let (report, table) = Evaluator::new(genres()).evaluate(&model, &dataset).unwrap();
    assert_eq!(report.windows, 2);
    assert_eq!(report.overall.model.count, 4);
    assert_eq!(table.len(), 4);
    assert!(table.rows.iter().all(|r| r.predicted_demand >= 0.0));

    let json = report.to_json().unwrap();
    assert!(json.contains("\"by_genre\""));
    assert!(report.to_string().contains("Evaluation over 2 windows"));
}

#[test]
fn test_forecast_future_has_no_actuals() {
    let model = DemandForecastModel::new(
        ModelConfig {
            input_size: 1,
            hidden_size: 4,
            horizon: 3,
            seed: 3,
        },
        Normalizer::identity(1),
        Vec::new(),
    )
    .unwrap();
    let inference = WindowedDataset {
        feature_names: Vec::new(),
        windows: vec![window("T1", day(20), 5.0, vec![], 3)],
    };
    let table = Evaluator::default().forecast_future(&model, &inference).unwrap();
    assert_eq!(table.len(), 3);
    assert!(table.rows.iter().all(|r| r.actual_demand.is_none()));
    assert_eq!(table.rows[2].target_date, day(23));
}

#[test]
fn test_forecast_table_rejects_step_count_mismatch() {
    let windows = vec![window("T1", day(10), 5.0, vec![], 1)];
    assert!(ForecastTable::from_predictions(&windows, &[vec![1.0, 2.0, 3.0]]).is_err());
}
