//! Mini-batch training loop with checkpointing
//!
//! Windows are split by track before anything is fitted, so no track
//! contributes to both training and validation. Each epoch shuffles the
//! training windows with a seed derived from `(random_seed, epoch)`, computes
//! per-window gradients in parallel, sums them in window order and applies
//! one Adam step per batch. Runs are reproducible under a fixed seed.
//!
//! With a checkpoint directory set, `best.ckpt` follows the lowest monitored
//! loss and `last.ckpt` is written when a run completes or is stopped; either
//! can be handed to [`Trainer::resume`].

use crate::checkpoint::Checkpoint;
use crate::error::{ForecastError, Result};
use crate::generator::derive_seed;
use crate::model::{DemandForecastModel, ModelConfig, Normalizer};
use crate::optimizer::{clip_global_norm, Adam, AdamConfig};
use crate::windowing::{FeatureWindow, WindowedDataset};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const BEST_CHECKPOINT: &str = "best.ckpt";
pub const LAST_CHECKPOINT: &str = "last.ckpt";
pub const DEFAULT_CHECKPOINT_DIR: &str = "checkpoints";

/// Seed stream reserved for the track split; epoch streams start at 1
const SPLIT_STREAM: u64 = 0;

/// Training hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub hidden_size: usize,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub random_seed: u64,
    /// Share of tracks held out for validation; 0 disables validation
    pub validation_split_fraction: f64,
    /// Write `epoch-{n}.ckpt` every this many epochs; 0 disables
    pub checkpoint_interval: usize,
    pub checkpoint_dir: Option<PathBuf>,
    /// Maximum global gradient norm
    pub gradient_clip: Option<f64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            hidden_size: 32,
            num_epochs: 20,
            batch_size: 32,
            learning_rate: 1e-3,
            random_seed: 42,
            validation_split_fraction: 0.2,
            checkpoint_interval: 0,
            checkpoint_dir: Some(PathBuf::from(DEFAULT_CHECKPOINT_DIR)),
            gradient_clip: Some(1.0),
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_size == 0 {
            return Err(ForecastError::ConfigError(
                "hidden_size must be greater than zero".to_string(),
            ));
        }
        if self.num_epochs == 0 {
            return Err(ForecastError::ConfigError(
                "num_epochs must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::ConfigError(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(ForecastError::ConfigError(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.validation_split_fraction) {
            return Err(ForecastError::ConfigError(format!(
                "validation_split_fraction must be within [0, 1), got {}",
                self.validation_split_fraction
            )));
        }
        if let Some(clip) = self.gradient_clip {
            if !(clip > 0.0) {
                return Err(ForecastError::ConfigError(format!(
                    "gradient_clip must be positive, got {}",
                    clip
                )));
            }
        }
        Ok(())
    }
}

/// Track ids assigned to each side of the split, both ascending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSplit {
    pub train: Vec<String>,
    pub validation: Vec<String>,
}

impl TrackSplit {
    /// Shuffle the unique ids with `seed` and hold out `ceil(n * fraction)`
    ///
    /// At least one track always stays in training.
    pub fn by_track<I, S>(track_ids: I, fraction: f64, seed: u64) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !(0.0..1.0).contains(&fraction) {
            return Err(ForecastError::ConfigError(format!(
                "validation_split_fraction must be within [0, 1), got {}",
                fraction
            )));
        }
        let unique: BTreeSet<String> = track_ids.into_iter().map(Into::into).collect();
        if unique.is_empty() {
            return Err(ForecastError::DataError(
                "Cannot split an empty set of tracks".to_string(),
            ));
        }

        let mut ids: Vec<String> = unique.into_iter().collect();
        let mut rng = StdRng::seed_from_u64(derive_seed(seed, SPLIT_STREAM));
        ids.shuffle(&mut rng);

        let n = ids.len();
        let held_out = ((n as f64 * fraction).ceil() as usize).min(n - 1);
        let mut validation = ids.split_off(n - held_out);
        let mut train = ids;
        train.sort();
        validation.sort();

        Ok(Self { train, validation })
    }

    pub fn is_validation(&self, track_id: &str) -> bool {
        self.validation.binary_search_by(|id| id.as_str().cmp(track_id)).is_ok()
    }
}

/// Losses of one completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
    /// Mean pre-clip gradient norm over the epoch's batches
    pub gradient_norm: f64,
    pub duration_secs: f64,
}

impl EpochRecord {
    /// Validation loss when there is a validation split, training loss otherwise
    pub fn monitored_loss(&self) -> f64 {
        self.validation_loss.unwrap_or(self.train_loss)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Interrupted,
}

/// Everything a finished run reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    pub config: TrainerConfig,
    pub model_config: ModelConfig,
    pub feature_names: Vec<String>,
    pub split: TrackSplit,
    pub train_windows: usize,
    pub validation_windows: usize,
    /// Epoch of the checkpoint the run continued from
    pub resumed_from: Option<usize>,
    /// Epochs run by this call; a resumed run starts after `resumed_from`
    pub epochs: Vec<EpochRecord>,
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    pub checkpoints: Vec<PathBuf>,
    pub stop_reason: StopReason,
}

impl TrainingRun {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.train_loss)
    }
}

/// Fits a [`DemandForecastModel`] on a windowed dataset
#[derive(Debug)]
pub struct Trainer {
    config: TrainerConfig,
    stop: Arc<AtomicBool>,
    model: Option<DemandForecastModel>,
    best: Option<DemandForecastModel>,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
            model: None,
            best: None,
        })
    }

    /// Share an externally owned stop flag, e.g. one raised on Ctrl-C
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Model after the last completed epoch
    pub fn model(&self) -> Option<&DemandForecastModel> {
        self.model.as_ref()
    }

    /// Model from the epoch with the lowest monitored loss
    pub fn best_model(&self) -> Option<&DemandForecastModel> {
        self.best.as_ref()
    }

    pub fn into_best_model(self) -> Option<DemandForecastModel> {
        self.best.or(self.model)
    }

    pub fn fit(&mut self, dataset: &WindowedDataset) -> Result<TrainingRun> {
        self.run(dataset, None)
    }

    /// Continue a run from a checkpoint written by an earlier fit
    ///
    /// The split is recomputed from the same seed, weights and normalizer come
    /// from the checkpoint and earlier epoch shuffles are replayed, so a run
    /// resumed from `last.ckpt` continues exactly where it stopped. Checkpoints
    /// without optimizer state restart Adam from zero moments.
    pub fn resume(&mut self, dataset: &WindowedDataset, checkpoint: Checkpoint) -> Result<TrainingRun> {
        self.run(dataset, Some(checkpoint))
    }

    fn run(&mut self, dataset: &WindowedDataset, resume: Option<Checkpoint>) -> Result<TrainingRun> {
        let first = dataset.windows.first().ok_or_else(|| {
            ForecastError::DataError("Cannot train without any windows".to_string())
        })?;
        let horizon = first.target.len();
        if horizon == 0 {
            return Err(ForecastError::DataError(
                "Training windows carry no targets".to_string(),
            ));
        }

        let split = TrackSplit::by_track(
            dataset.windows.iter().map(|w| w.track_id.as_str()),
            self.config.validation_split_fraction,
            self.config.random_seed,
        )?;
        let validation_ids: HashSet<&str> = split.validation.iter().map(|s| s.as_str()).collect();
        let (validation, train): (Vec<&FeatureWindow>, Vec<&FeatureWindow>) = dataset
            .windows
            .iter()
            .partition(|w| validation_ids.contains(w.track_id.as_str()));
        info!(
            "Training on {} windows from {} tracks, validating on {} windows from {} tracks",
            train.len(),
            split.train.len(),
            validation.len(),
            split.validation.len()
        );

        let resumed_from = resume.as_ref().map(|c| c.epoch);
        let (mut model, mut adam, mut best, mut last_loss) = match resume {
            Some(checkpoint) => self.restore(checkpoint, first.feature_count(), horizon)?,
            None => {
                let normalizer = Normalizer::fit(train.iter().copied())?;
                let model_config = ModelConfig {
                    input_size: normalizer.feature_count(),
                    hidden_size: self.config.hidden_size,
                    horizon,
                    seed: self.config.random_seed,
                };
                let feature_names = if dataset.feature_names.len() == model_config.input_size {
                    dataset.feature_names.clone()
                } else {
                    Vec::new()
                };
                let model = DemandForecastModel::new(model_config, normalizer, feature_names)?;
                let adam = Adam::new(AdamConfig::new(self.config.learning_rate), model.parameters());
                self.best = None;
                (model, adam, None, f64::NAN)
            }
        };
        let model_config = *model.config();
        let feature_names = model.feature_names().to_vec();
        self.model = Some(model.clone());

        let start_epoch = resumed_from.map_or(1, |epoch| epoch + 1);
        let mut order: Vec<usize> = (0..train.len()).collect();
        for epoch in 1..start_epoch {
            order.shuffle(&mut epoch_rng(self.config.random_seed, epoch));
        }

        let mut epochs: Vec<EpochRecord> = Vec::with_capacity(self.config.num_epochs);
        let mut checkpoints = Vec::new();
        let mut last_checkpoint: Option<PathBuf> = None;
        let mut stop_reason = StopReason::Completed;
        let mut completed = start_epoch - 1;

        for epoch in start_epoch..=self.config.num_epochs {
            if self.stop.load(Ordering::SeqCst) {
                warn!("Stop requested, ending training before epoch {}", epoch);
                stop_reason = StopReason::Interrupted;
                break;
            }

            let started = Instant::now();
            order.shuffle(&mut epoch_rng(self.config.random_seed, epoch));

            let mut batch_losses = Vec::new();
            let mut norms = Vec::new();
            for batch in order.chunks(self.config.batch_size) {
                let (loss, norm) = self.train_batch(&mut model, &mut adam, &train, batch)?;
                if !loss.is_finite() {
                    return Err(diverged(epoch, last_checkpoint));
                }
                batch_losses.push(loss);
                norms.push(norm);
            }

            let train_loss = mean(&batch_losses);
            let validation_loss = if validation.is_empty() {
                None
            } else {
                Some(evaluate_loss(&model, &validation)?)
            };
            if !train_loss.is_finite() || validation_loss.map_or(false, |v| !v.is_finite()) {
                return Err(diverged(epoch, last_checkpoint));
            }

            let record = EpochRecord {
                epoch,
                train_loss,
                validation_loss,
                gradient_norm: mean(&norms),
                duration_secs: started.elapsed().as_secs_f64(),
            };
            match record.validation_loss {
                Some(v) => info!(
                    "Epoch {}/{}: train_loss={:.6} val_loss={:.6}",
                    epoch, self.config.num_epochs, record.train_loss, v
                ),
                None => info!(
                    "Epoch {}/{}: train_loss={:.6}",
                    epoch, self.config.num_epochs, record.train_loss
                ),
            }

            let monitored = record.monitored_loss();
            if best.map_or(true, |(_, b)| monitored < b) {
                best = Some((epoch, monitored));
                self.best = Some(model.clone());
                if let Some(dir) = &self.config.checkpoint_dir {
                    let path = dir.join(BEST_CHECKPOINT);
                    Checkpoint::from_model(&model, epoch, monitored)
                        .with_training_state(&adam, best)
                        .save(&path)?;
                    remember(&mut checkpoints, &path);
                    last_checkpoint = Some(path);
                }
            }
            if let Some(dir) = &self.config.checkpoint_dir {
                let interval = self.config.checkpoint_interval;
                if interval > 0 && epoch % interval == 0 {
                    let path = epoch_checkpoint_path(dir, epoch);
                    Checkpoint::from_model(&model, epoch, monitored)
                        .with_training_state(&adam, best)
                        .save(&path)?;
                    remember(&mut checkpoints, &path);
                    last_checkpoint = Some(path);
                }
            }

            self.model = Some(model.clone());
            epochs.push(record);
            completed = epoch;
            last_loss = monitored;
        }

        if let Some(dir) = &self.config.checkpoint_dir {
            let path = dir.join(LAST_CHECKPOINT);
            Checkpoint::from_model(&model, completed, last_loss)
                .with_training_state(&adam, best)
                .save(&path)?;
            remember(&mut checkpoints, &path);
        }
        if let Some((epoch, loss)) = best {
            info!("Best epoch {} with monitored loss {:.6}", epoch, loss);
        }

        Ok(TrainingRun {
            config: self.config.clone(),
            model_config,
            feature_names,
            split,
            train_windows: train.len(),
            validation_windows: validation.len(),
            resumed_from,
            epochs,
            best_epoch: best.map(|(e, _)| e),
            best_loss: best.map(|(_, l)| l),
            checkpoints,
            stop_reason,
        })
    }

    /// Model, optimizer, best record and last monitored loss from a checkpoint
    fn restore(
        &mut self,
        mut checkpoint: Checkpoint,
        feature_count: usize,
        horizon: usize,
    ) -> Result<(DemandForecastModel, Adam, Option<(usize, f64)>, f64)> {
        let epoch = checkpoint.epoch;
        let best = checkpoint.best();
        let last_loss = checkpoint.monitored_loss;
        let optimizer = checkpoint.optimizer.take();
        let model = checkpoint.into_model()?;

        let config = *model.config();
        if config.input_size != feature_count || config.horizon != horizon {
            return Err(ForecastError::ConfigError(format!(
                "Checkpoint expects {} features and horizon {}, dataset has {} and {}",
                config.input_size, config.horizon, feature_count, horizon
            )));
        }

        let adam = match optimizer {
            Some(mut adam) if adam.fits(&config) => {
                adam.set_learning_rate(self.config.learning_rate);
                adam
            }
            Some(_) => {
                warn!("Checkpoint optimizer state does not match the model; resetting Adam");
                Adam::new(AdamConfig::new(self.config.learning_rate), model.parameters())
            }
            None => Adam::new(AdamConfig::new(self.config.learning_rate), model.parameters()),
        };

        self.best = match best {
            Some((best_epoch, _)) if best_epoch == epoch => Some(model.clone()),
            Some((best_epoch, _)) => self.load_best(best_epoch),
            None => None,
        };
        info!("Resuming training after epoch {}", epoch);
        Ok((model, adam, best, last_loss))
    }

    /// The in-memory best model of a resumed run, read back from `best.ckpt`
    fn load_best(&self, best_epoch: usize) -> Option<DemandForecastModel> {
        let path = self.config.checkpoint_dir.as_ref()?.join(BEST_CHECKPOINT);
        match Checkpoint::load(&path) {
            Ok(checkpoint) if checkpoint.epoch == best_epoch => checkpoint.into_model().ok(),
            Ok(_) | Err(_) => {
                debug!("No best checkpoint for epoch {} at {}", best_epoch, path.display());
                None
            }
        }
    }

    /// One Adam step on a batch; returns the batch loss and pre-clip norm
    ///
    /// A non-finite loss or gradient skips the update and is returned as-is.
    fn train_batch(
        &self,
        model: &mut DemandForecastModel,
        adam: &mut Adam,
        train: &[&FeatureWindow],
        batch: &[usize],
    ) -> Result<(f64, f64)> {
        let frozen: &DemandForecastModel = model;
        let per_window = batch
            .par_iter()
            .map(|&i| frozen.loss_and_gradients(train[i]))
            .collect::<Result<Vec<_>>>()?;

        let mut windows = per_window.into_iter();
        let (mut loss, mut grads) = match windows.next() {
            Some(first) => first,
            None => return Ok((0.0, 0.0)),
        };
        for (l, g) in windows {
            loss += l;
            grads.add_assign(&g);
        }
        let scale = 1.0 / batch.len() as f64;
        loss *= scale;
        grads.scale(scale);

        if !loss.is_finite() || !grads.is_finite() {
            return Ok((f64::NAN, f64::NAN));
        }

        let norm = match self.config.gradient_clip {
            Some(max_norm) => clip_global_norm(&mut grads, max_norm),
            None => grads.global_norm(),
        };
        adam.step(model.parameters_mut(), &grads);
        debug!("batch of {}: loss={:.6} grad_norm={:.4}", batch.len(), loss, norm);
        Ok((loss, norm))
    }
}

fn diverged(epoch: usize, last_checkpoint: Option<PathBuf>) -> ForecastError {
    warn!(
        "Loss diverged in epoch {}; keeping parameters from epoch {}",
        epoch,
        epoch - 1
    );
    ForecastError::DivergenceError {
        epoch,
        last_checkpoint,
    }
}

/// Mean normalized MSE over windows, computed in parallel
pub fn evaluate_loss(model: &DemandForecastModel, windows: &[&FeatureWindow]) -> Result<f64> {
    let losses = windows
        .par_iter()
        .map(|w| model.loss(w))
        .collect::<Result<Vec<f64>>>()?;
    Ok(mean(&losses))
}

/// Path of the periodic checkpoint written after `epoch`
pub fn epoch_checkpoint_path(dir: &Path, epoch: usize) -> PathBuf {
    dir.join(format!("epoch-{}.ckpt", epoch))
}

fn epoch_rng(seed: u64, epoch: usize) -> StdRng {
    StdRng::seed_from_u64(derive_seed(seed, epoch as u64))
}

fn remember(checkpoints: &mut Vec<PathBuf>, path: &Path) {
    if !checkpoints.iter().any(|p| p == path) {
        checkpoints.push(path.to_path_buf());
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
