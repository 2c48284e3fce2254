//! Adam optimizer and gradient clipping over [`ModelParameters`]

use crate::model::{ModelConfig, ModelParameters};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Adam hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    pub learning_rate: f64,
    /// First moment decay
    pub beta1: f64,
    /// Second moment decay
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl AdamConfig {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..Default::default()
        }
    }
}

/// Adam state: first and second moments plus the step count
///
/// Serializable so an interrupted run can continue with its moments intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    config: AdamConfig,
    m: ModelParameters,
    v: ModelParameters,
    step: i32,
}

impl Adam {
    pub fn new(config: AdamConfig, params: &ModelParameters) -> Self {
        Self {
            config,
            m: params.zeros_like(),
            v: params.zeros_like(),
            step: 0,
        }
    }

    pub fn steps_taken(&self) -> i32 {
        self.step
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    /// Keep the moments but step with a new learning rate
    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.config.learning_rate = learning_rate;
    }

    /// Whether the moment tensors have the shapes of `config`'s parameters
    pub fn fits(&self, config: &ModelConfig) -> bool {
        self.m.shapes_match(config) && self.v.shapes_match(config)
    }

    /// Apply one bias-corrected update
    pub fn step(&mut self, params: &mut ModelParameters, grads: &ModelParameters) {
        self.step = self.step.saturating_add(1);
        let AdamConfig {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } = self.config;
        let correction1 = 1.0 - beta1.powi(self.step);
        let correction2 = 1.0 - beta2.powi(self.step);

        let tensors = params
            .tensors_mut()
            .into_iter()
            .zip(grads.tensors())
            .zip(self.m.tensors_mut())
            .zip(self.v.tensors_mut());
        for (((p, g), m), v) in tensors {
            Zip::from(p)
                .and(&g)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / correction1;
                    let v_hat = *v / correction2;
                    *p -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
                });
        }
    }
}

/// Rescale gradients so their global L2 norm is at most `max_norm`
///
/// Returns the norm before clipping.
pub fn clip_global_norm(grads: &mut ModelParameters, max_norm: f64) -> f64 {
    let norm = grads.global_norm();
    if norm.is_finite() && norm > max_norm && norm > 0.0 {
        grads.scale(max_norm / norm);
    }
    norm
}
