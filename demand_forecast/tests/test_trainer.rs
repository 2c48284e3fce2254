use chrono::NaiveDate;
use demand_forecast::catalog::Track;
use demand_forecast::error::ForecastError;
use demand_forecast::generator::{GeneratorConfig, SyntheticSeriesGenerator};
use demand_forecast::model::{ModelConfig, Normalizer};
use demand_forecast::trainer::{
    epoch_checkpoint_path, StopReason, Trainer, TrainerConfig, BEST_CHECKPOINT,
    DEFAULT_CHECKPOINT_DIR, LAST_CHECKPOINT,
};
use demand_forecast::windowing::{FeatureWindower, WindowConfig, WindowedDataset};
use demand_forecast::{Checkpoint, DemandForecastModel};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tempfile::tempdir;

fn track(id: &str, popularity: f64) -> Track {
    Track {
        track_id: id.to_string(),
        genre: "pop".into(),
        popularity_score: popularity,
        duration_seconds: 200,
        release_date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
        artist_id: "A1".into(),
        track_name: None,
    }
}

/// 2 tracks x 60 days, seed 42, L=14, H=1, stride 1
fn dataset() -> WindowedDataset {
    let series = SyntheticSeriesGenerator::new(GeneratorConfig {
        random_seed: 42,
        ..Default::default()
    })
    .unwrap()
    .generate(
        &[track("T1", 70.0), track("T2", 30.0)],
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
    )
    .unwrap();
    FeatureWindower::new(WindowConfig {
        window_length: 14,
        horizon: 1,
        stride: 1,
        ..Default::default()
    })
    .unwrap()
    .transform(&series)
    .unwrap()
}

fn config() -> TrainerConfig {
    TrainerConfig {
        hidden_size: 16,
        num_epochs: 5,
        batch_size: 8,
        learning_rate: 0.01,
        random_seed: 42,
        validation_split_fraction: 0.5,
        checkpoint_interval: 0,
        checkpoint_dir: None,
        gradient_clip: Some(1.0),
    }
}

#[test]
fn test_end_to_end_training_reduces_loss() {
    let data = dataset();
    assert_eq!(data.len(), 92);

    let mut trainer = Trainer::new(config()).unwrap();
    let run = trainer.fit(&data).unwrap();

    assert_eq!(run.stop_reason, StopReason::Completed);
    assert_eq!(run.epochs.len(), 5);
    assert_eq!(run.split.train.len(), 1);
    assert_eq!(run.split.validation.len(), 1);
    assert_eq!(run.train_windows + run.validation_windows, 92);
    assert_eq!(run.train_windows, 46);

    let losses: Vec<f64> = run.epochs.iter().map(|e| e.train_loss).collect();
    assert!(losses.iter().all(|l| l.is_finite()));
    assert!(run.epochs.iter().all(|e| e.validation_loss.map_or(false, f64::is_finite)));
    assert!(losses[4] < losses[0], "losses did not decrease: {:?}", losses);
    assert!((losses[3] + losses[4]) / 2.0 <= (losses[0] + losses[1]) / 2.0);

    assert!(trainer.best_model().is_some());
    let best_epoch = run.best_epoch.unwrap();
    let best_loss = run.best_loss.unwrap();
    assert_eq!(run.epochs[best_epoch - 1].monitored_loss(), best_loss);
    assert!(run.epochs.iter().all(|e| e.monitored_loss() >= best_loss));
}

#[test]
fn test_training_is_reproducible() {
    let data = dataset();
    let mut a = Trainer::new(config()).unwrap();
    let mut b = Trainer::new(config()).unwrap();
    let run_a = a.fit(&data).unwrap();
    let run_b = b.fit(&data).unwrap();

    let losses = |run: &demand_forecast::TrainingRun| -> Vec<(f64, Option<f64>)> {
        run.epochs.iter().map(|e| (e.train_loss, e.validation_loss)).collect()
    };
    assert_eq!(losses(&run_a), losses(&run_b));
    assert_eq!(a.best_model(), b.best_model());
}

#[test]
fn test_checkpoints_are_written_and_loadable() {
    let data = dataset();
    let dir = tempdir().unwrap();
    let mut trainer = Trainer::new(TrainerConfig {
        num_epochs: 4,
        checkpoint_interval: 2,
        checkpoint_dir: Some(dir.path().to_path_buf()),
        ..config()
    })
    .unwrap();
    let run = trainer.fit(&data).unwrap();

    assert!(dir.path().join(BEST_CHECKPOINT).exists());
    assert!(epoch_checkpoint_path(dir.path(), 2).exists());
    assert!(epoch_checkpoint_path(dir.path(), 4).exists());
    assert!(!epoch_checkpoint_path(dir.path(), 3).exists());
    assert!(run.checkpoints.contains(&dir.path().join(BEST_CHECKPOINT)));

    let best = Checkpoint::load(dir.path().join(BEST_CHECKPOINT)).unwrap();
    assert_eq!(Some(best.epoch), run.best_epoch);
    let restored = best.into_model().unwrap();
    assert_eq!(Some(&restored), trainer.best_model());

    let from_file = DemandForecastModel::load(epoch_checkpoint_path(dir.path(), 4)).unwrap();
    assert_eq!(Some(&from_file), trainer.model());
}

#[test]
fn test_zero_fraction_monitors_training_loss() {
    let data = dataset();
    let mut trainer = Trainer::new(TrainerConfig {
        validation_split_fraction: 0.0,
        num_epochs: 2,
        ..config()
    })
    .unwrap();
    let run = trainer.fit(&data).unwrap();

    assert!(run.split.validation.is_empty());
    assert_eq!(run.train_windows, 92);
    assert!(run.epochs.iter().all(|e| e.validation_loss.is_none()));
    assert_eq!(run.best_loss, Some(run.epochs[run.best_epoch.unwrap() - 1].train_loss));
}

#[test]
fn test_stop_flag_interrupts_and_writes_last_checkpoint() {
    let data = dataset();
    let dir = tempdir().unwrap();
    let mut trainer = Trainer::new(TrainerConfig {
        checkpoint_dir: Some(dir.path().to_path_buf()),
        ..config()
    })
    .unwrap();
    trainer.stop_flag().store(true, Ordering::SeqCst);

    let run = trainer.fit(&data).unwrap();
    assert_eq!(run.stop_reason, StopReason::Interrupted);
    assert!(run.epochs.is_empty());
    assert!(dir.path().join(LAST_CHECKPOINT).exists());
    assert!(trainer.model().is_some());
}

#[test]
fn test_divergence_keeps_last_good_parameters() {
    let data = dataset();
    let mut trainer = Trainer::new(TrainerConfig {
        learning_rate: 1e300,
        gradient_clip: None,
        num_epochs: 3,
        ..config()
    })
    .unwrap();

    match trainer.fit(&data) {
        Err(ForecastError::DivergenceError { epoch, .. }) => {
            assert!(epoch >= 1);
            let model = trainer.model().unwrap();
            assert!(model.parameters().is_finite());
        }
        other => panic!("expected divergence, got {:?}", other.map(|r| r.epochs)),
    }
}

#[test]
fn test_empty_dataset_is_rejected() {
    let mut trainer = Trainer::new(config()).unwrap();
    assert!(matches!(
        trainer.fit(&WindowedDataset::default()),
        Err(ForecastError::DataError(_))
    ));
}

#[test]
fn test_invalid_trainer_config() {
    for bad in [
        TrainerConfig { batch_size: 0, ..config() },
        TrainerConfig { learning_rate: -1.0, ..config() },
        TrainerConfig { validation_split_fraction: 1.0, ..config() },
        TrainerConfig { gradient_clip: Some(0.0), ..config() },
    ] {
        assert!(matches!(Trainer::new(bad), Err(ForecastError::ConfigError(_))));
    }
}

#[test]
fn test_default_config_persists_best_checkpoint() {
    assert_eq!(
        TrainerConfig::default().checkpoint_dir,
        Some(PathBuf::from(DEFAULT_CHECKPOINT_DIR))
    );

    let data = dataset();
    let dir = tempdir().unwrap();
    let mut trainer = Trainer::new(TrainerConfig {
        num_epochs: 2,
        checkpoint_dir: Some(dir.path().to_path_buf()),
        ..TrainerConfig::default()
    })
    .unwrap();
    let run = trainer.fit(&data).unwrap();

    let best = Checkpoint::load(dir.path().join(BEST_CHECKPOINT)).unwrap();
    assert_eq!(Some(best.epoch), run.best_epoch);
    assert_eq!(best.best(), run.best_epoch.zip(run.best_loss));
    assert!(best.optimizer.is_some());
    let last = Checkpoint::load(dir.path().join(LAST_CHECKPOINT)).unwrap();
    assert_eq!(last.epoch, 2);
}

fn with_dir(dir: &Path, num_epochs: usize) -> TrainerConfig {
    TrainerConfig {
        num_epochs,
        checkpoint_dir: Some(dir.to_path_buf()),
        ..config()
    }
}

#[test]
fn test_resume_continues_a_shorter_run() {
    let data = dataset();
    let full_dir = tempdir().unwrap();
    let mut full = Trainer::new(with_dir(full_dir.path(), 4)).unwrap();
    let full_run = full.fit(&data).unwrap();

    let dir = tempdir().unwrap();
    let mut first = Trainer::new(with_dir(dir.path(), 2)).unwrap();
    let first_run = first.fit(&data).unwrap();
    assert_eq!(first_run.epochs.len(), 2);

    let checkpoint = Checkpoint::load(dir.path().join(LAST_CHECKPOINT)).unwrap();
    let mut resumed = Trainer::new(with_dir(dir.path(), 4)).unwrap();
    let run = resumed.resume(&data, checkpoint).unwrap();

    assert_eq!(run.resumed_from, Some(2));
    let losses = |epochs: &[demand_forecast::trainer::EpochRecord]| -> Vec<(usize, f64, Option<f64>)> {
        epochs
            .iter()
            .map(|e| (e.epoch, e.train_loss, e.validation_loss))
            .collect()
    };
    assert_eq!(losses(&run.epochs), losses(&full_run.epochs[2..]));
    assert_eq!(run.epochs[0].epoch, 3);
    assert_eq!(run.best_epoch, full_run.best_epoch);
    assert_eq!(resumed.model(), full.model());
    assert_eq!(resumed.best_model(), full.best_model());
}

#[test]
fn test_stopped_run_resumes_from_last_checkpoint() {
    let data = dataset();
    let dir = tempdir().unwrap();
    let mut trainer = Trainer::new(with_dir(dir.path(), 3)).unwrap();
    trainer.stop_flag().store(true, Ordering::SeqCst);
    let stopped = trainer.fit(&data).unwrap();
    assert_eq!(stopped.stop_reason, StopReason::Interrupted);

    trainer.stop_flag().store(false, Ordering::SeqCst);
    let checkpoint = Checkpoint::load(dir.path().join(LAST_CHECKPOINT)).unwrap();
    assert_eq!(checkpoint.epoch, 0);
    let run = trainer.resume(&data, checkpoint).unwrap();
    assert_eq!(run.stop_reason, StopReason::Completed);
    assert_eq!(run.epochs.len(), 3);

    let mut straight = Trainer::new(TrainerConfig { num_epochs: 3, ..config() }).unwrap();
    straight.fit(&data).unwrap();
    assert_eq!(trainer.model(), straight.model());
}

#[test]
fn test_resume_rejects_mismatched_checkpoint() {
    let data = dataset();
    let features = data.feature_names.len();
    let model = DemandForecastModel::new(
        ModelConfig {
            input_size: features,
            hidden_size: 4,
            horizon: 2,
            seed: 1,
        },
        Normalizer::identity(features),
        Vec::new(),
    )
    .unwrap();

    let mut trainer = Trainer::new(config()).unwrap();
    assert!(matches!(
        trainer.resume(&data, Checkpoint::from_model(&model, 1, 0.5)),
        Err(ForecastError::ConfigError(_))
    ));
}
