//! Model checkpoints
//!
//! Layout: 4-byte magic `SCKP`, little-endian `u32` format version, then a
//! bincode-encoded [`Checkpoint`] body. A checkpoint is self-contained: it
//! carries the architecture, weights, normalizer and feature names, so a
//! model can be restored without any training code. Checkpoints written by
//! the trainer also carry the optimizer state and best-so-far record, which
//! is what `Trainer::resume` needs to continue an interrupted run.

use crate::error::{ForecastError, Result};
use crate::model::{DemandForecastModel, ModelConfig, ModelParameters, Normalizer};
use crate::optimizer::Adam;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

pub const MAGIC: [u8; 4] = *b"SCKP";
pub const FORMAT_VERSION: u32 = 2;

const HEADER_LEN: usize = 8;

/// Serialized training snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub config: ModelConfig,
    pub parameters: ModelParameters,
    pub normalizer: Normalizer,
    pub feature_names: Vec<String>,
    /// Epoch the snapshot was taken after (1-based)
    pub epoch: usize,
    /// Loss the trainer was monitoring at that epoch
    pub monitored_loss: f64,
    /// Best epoch of the run so far and its monitored loss
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    /// Optimizer moments; `None` for inference-only snapshots
    pub optimizer: Option<Adam>,
}

impl Checkpoint {
    pub fn from_model(model: &DemandForecastModel, epoch: usize, monitored_loss: f64) -> Self {
        Self {
            config: *model.config(),
            parameters: model.parameters().clone(),
            normalizer: model.normalizer().clone(),
            feature_names: model.feature_names().to_vec(),
            epoch,
            monitored_loss,
            best_epoch: None,
            best_loss: None,
            optimizer: None,
        }
    }

    /// Attach what a resumed run needs beyond the weights
    pub fn with_training_state(mut self, optimizer: &Adam, best: Option<(usize, f64)>) -> Self {
        self.optimizer = Some(optimizer.clone());
        self.best_epoch = best.map(|(epoch, _)| epoch);
        self.best_loss = best.map(|(_, loss)| loss);
        self
    }

    /// Best-so-far record, when the checkpoint has one
    pub fn best(&self) -> Option<(usize, f64)> {
        self.best_epoch.zip(self.best_loss)
    }

    pub fn into_model(self) -> Result<DemandForecastModel> {
        DemandForecastModel::from_parts(
            self.config,
            self.parameters,
            self.normalizer,
            self.feature_names,
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || bytes[..4] != MAGIC {
            return Err(ForecastError::SerializationError(
                "Not a streamcast checkpoint (bad magic)".to_string(),
            ));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[4..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(ForecastError::SerializationError(format!(
                "Unsupported checkpoint format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }
        Ok(bincode::deserialize(&bytes[HEADER_LEN..])?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_bytes()?)?;
        debug!("Wrote checkpoint for epoch {} to {}", self.epoch, path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl DemandForecastModel {
    /// Save the model as a checkpoint with no training metadata
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        Checkpoint::from_model(self, 0, f64::NAN).save(path)
    }

    /// Restore a model from any checkpoint file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Checkpoint::load(path)?.into_model()
    }
}
