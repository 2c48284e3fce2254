//! GRU demand forecaster
//!
//! A single GRU layer reads the L normalized feature rows of a window from a
//! zero hidden state; a dense head projects the final hidden state onto the
//! H-day forecast. Gradients are computed with full back-propagation through
//! time so training needs nothing beyond `ndarray`.

use crate::error::{ForecastError, Result};
use crate::windowing::FeatureWindow;
use demand_math::Standardizer;
use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Architecture of a [`DemandForecastModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Features per timestep (F)
    pub input_size: usize,
    pub hidden_size: usize,
    /// Forecast days per window (H)
    pub horizon: usize,
    /// Seed of the weight initializer
    pub seed: u64,
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 || self.hidden_size == 0 || self.horizon == 0 {
            return Err(ForecastError::ConfigError(format!(
                "Model dimensions must be positive (input_size={}, hidden_size={}, horizon={})",
                self.input_size, self.hidden_size, self.horizon
            )));
        }
        Ok(())
    }
}

/// Trainable tensors: GRU gates plus the dense head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    // update gate
    pub w_iz: Array2<f64>,
    pub w_hz: Array2<f64>,
    pub b_z: Array1<f64>,
    // reset gate
    pub w_ir: Array2<f64>,
    pub w_hr: Array2<f64>,
    pub b_r: Array1<f64>,
    // candidate
    pub w_in: Array2<f64>,
    pub w_hn: Array2<f64>,
    pub b_n: Array1<f64>,
    // head
    pub w_out: Array2<f64>,
    pub b_out: Array1<f64>,
}

impl ModelParameters {
    /// Uniform `[-1/sqrt(hidden), 1/sqrt(hidden)]` weights, zero biases
    pub fn init(config: &ModelConfig) -> Self {
        let (f, h, o) = (config.input_size, config.hidden_size, config.horizon);
        let limit = (1.0 / h as f64).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut uniform = |rows: usize, cols: usize| {
            Array2::from_shape_fn((rows, cols), |_| dist.sample(&mut rng))
        };

        Self {
            w_iz: uniform(h, f),
            w_hz: uniform(h, h),
            b_z: Array1::zeros(h),
            w_ir: uniform(h, f),
            w_hr: uniform(h, h),
            b_r: Array1::zeros(h),
            w_in: uniform(h, f),
            w_hn: uniform(h, h),
            b_n: Array1::zeros(h),
            w_out: uniform(o, h),
            b_out: Array1::zeros(o),
        }
    }

    /// Zero tensors with the same shapes
    pub fn zeros_like(&self) -> Self {
        let z2 = |a: &Array2<f64>| Array2::zeros(a.raw_dim());
        let z1 = |a: &Array1<f64>| Array1::zeros(a.raw_dim());
        Self {
            w_iz: z2(&self.w_iz),
            w_hz: z2(&self.w_hz),
            b_z: z1(&self.b_z),
            w_ir: z2(&self.w_ir),
            w_hr: z2(&self.w_hr),
            b_r: z1(&self.b_r),
            w_in: z2(&self.w_in),
            w_hn: z2(&self.w_hn),
            b_n: z1(&self.b_n),
            w_out: z2(&self.w_out),
            b_out: z1(&self.b_out),
        }
    }

    /// Every tensor as a dynamic-dimension view, in a fixed order
    pub fn tensors(&self) -> Vec<ArrayViewD<'_, f64>> {
        vec![
            self.w_iz.view().into_dyn(),
            self.w_hz.view().into_dyn(),
            self.b_z.view().into_dyn(),
            self.w_ir.view().into_dyn(),
            self.w_hr.view().into_dyn(),
            self.b_r.view().into_dyn(),
            self.w_in.view().into_dyn(),
            self.w_hn.view().into_dyn(),
            self.b_n.view().into_dyn(),
            self.w_out.view().into_dyn(),
            self.b_out.view().into_dyn(),
        ]
    }

    /// Mutable views in the same order as [`ModelParameters::tensors`]
    pub fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![
            self.w_iz.view_mut().into_dyn(),
            self.w_hz.view_mut().into_dyn(),
            self.b_z.view_mut().into_dyn(),
            self.w_ir.view_mut().into_dyn(),
            self.w_hr.view_mut().into_dyn(),
            self.b_r.view_mut().into_dyn(),
            self.w_in.view_mut().into_dyn(),
            self.w_hn.view_mut().into_dyn(),
            self.b_n.view_mut().into_dyn(),
            self.w_out.view_mut().into_dyn(),
            self.b_out.view_mut().into_dyn(),
        ]
    }

    /// Element-wise `self += other`
    pub fn add_assign(&mut self, other: &ModelParameters) {
        for (mut mine, theirs) in self.tensors_mut().into_iter().zip(other.tensors()) {
            mine += &theirs;
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for mut tensor in self.tensors_mut() {
            tensor.mapv_inplace(|v| v * factor);
        }
    }

    /// L2 norm over every element of every tensor
    pub fn global_norm(&self) -> f64 {
        self.tensors()
            .iter()
            .map(|t| t.iter().map(|v| v * v).sum::<f64>())
            .sum::<f64>()
            .sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.tensors().iter().all(|t| t.iter().all(|v| v.is_finite()))
    }

    pub fn num_parameters(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }

    pub(crate) fn shapes_match(&self, config: &ModelConfig) -> bool {
        let (f, h, o) = (config.input_size, config.hidden_size, config.horizon);
        let inputs = [&self.w_iz, &self.w_ir, &self.w_in];
        let hiddens = [&self.w_hz, &self.w_hr, &self.w_hn];
        let biases = [&self.b_z, &self.b_r, &self.b_n];
        inputs.iter().all(|w| w.dim() == (h, f))
            && hiddens.iter().all(|w| w.dim() == (h, h))
            && biases.iter().all(|b| b.len() == h)
            && self.w_out.dim() == (o, h)
            && self.b_out.len() == o
    }
}

/// Feature and target scaling fitted on the training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    pub features: Vec<Standardizer>,
    pub target: Standardizer,
}

impl Normalizer {
    /// Fit per-feature and target scaling from training windows
    pub fn fit<'a, I>(windows: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a FeatureWindow>,
    {
        let mut columns: Vec<Vec<f64>> = Vec::new();
        let mut targets = Vec::new();
        for window in windows {
            for row in &window.input_sequence {
                if columns.is_empty() {
                    columns = vec![Vec::new(); row.len()];
                }
                if row.len() != columns.len() {
                    return Err(ForecastError::DataError(format!(
                        "Window {} @ {} has {} features, expected {}",
                        window.track_id,
                        window.anchor_date,
                        row.len(),
                        columns.len()
                    )));
                }
                for (column, value) in columns.iter_mut().zip(row) {
                    column.push(*value);
                }
            }
            targets.extend_from_slice(&window.target);
        }

        if columns.is_empty() || targets.is_empty() {
            return Err(ForecastError::DataError(
                "Cannot fit a normalizer without training windows".to_string(),
            ));
        }

        let features = columns
            .iter()
            .map(|c| Standardizer::fit(c))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let target = Standardizer::fit(&targets)?;
        Ok(Self { features, target })
    }

    pub fn identity(feature_count: usize) -> Self {
        Self {
            features: vec![Standardizer::identity(); feature_count],
            target: Standardizer::identity(),
        }
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    fn inputs(&self, window: &FeatureWindow) -> Vec<Array1<f64>> {
        window
            .input_sequence
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.features)
                    .map(|(v, s)| s.transform(*v))
                    .collect()
            })
            .collect()
    }

    fn targets(&self, window: &FeatureWindow) -> Array1<f64> {
        window.target.iter().map(|v| self.target.transform(*v)).collect()
    }
}

/// Activations of one timestep kept for the backward pass
struct StepCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    z: Array1<f64>,
    r: Array1<f64>,
    n: Array1<f64>,
}

/// Sequence-to-vector GRU forecaster with its normalizer and feature names
#[derive(Debug, Clone, PartialEq)]
pub struct DemandForecastModel {
    config: ModelConfig,
    params: ModelParameters,
    normalizer: Normalizer,
    feature_names: Vec<String>,
}

impl DemandForecastModel {
    /// Fresh model with seeded random weights
    pub fn new(config: ModelConfig, normalizer: Normalizer, feature_names: Vec<String>) -> Result<Self> {
        let params = ModelParameters::init(&config);
        Self::from_parts(config, params, normalizer, feature_names)
    }

    /// Assemble a model from stored parts, checking every shape
    pub fn from_parts(
        config: ModelConfig,
        params: ModelParameters,
        normalizer: Normalizer,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        config.validate()?;
        if normalizer.feature_count() != config.input_size {
            return Err(ForecastError::ConfigError(format!(
                "Normalizer covers {} features but the model expects {}",
                normalizer.feature_count(),
                config.input_size
            )));
        }
        if !feature_names.is_empty() && feature_names.len() != config.input_size {
            return Err(ForecastError::ConfigError(format!(
                "{} feature names given for {} inputs",
                feature_names.len(),
                config.input_size
            )));
        }
        if !params.shapes_match(&config) {
            return Err(ForecastError::ConfigError(
                "Parameter shapes do not match the model configuration".to_string(),
            ));
        }
        Ok(Self {
            config,
            params,
            normalizer,
            feature_names,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut ModelParameters {
        &mut self.params
    }

    pub fn set_parameters(&mut self, params: ModelParameters) -> Result<()> {
        if !params.shapes_match(&self.config) {
            return Err(ForecastError::ConfigError(
                "Parameter shapes do not match the model configuration".to_string(),
            ));
        }
        self.params = params;
        Ok(())
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Forecast the H days after the window's anchor, in stream counts
    ///
    /// Outputs are floored at zero.
    pub fn predict(&self, window: &FeatureWindow) -> Result<Vec<f64>> {
        self.check_window(window, false)?;
        let (_, hidden) = self.forward(&self.normalizer.inputs(window));
        let output = self.head(&hidden);
        Ok(output
            .iter()
            .map(|v| self.normalizer.target.inverse(*v).max(0.0))
            .collect())
    }

    /// [`DemandForecastModel::predict`] over many windows, in input order
    pub fn predict_batch(&self, windows: &[FeatureWindow]) -> Result<Vec<Vec<f64>>> {
        windows.par_iter().map(|w| self.predict(w)).collect()
    }

    /// MSE on the normalized scale
    pub fn loss(&self, window: &FeatureWindow) -> Result<f64> {
        self.check_window(window, true)?;
        let (_, hidden) = self.forward(&self.normalizer.inputs(window));
        let diff = self.head(&hidden) - self.normalizer.targets(window);
        Ok(diff.mapv(|d| d * d).mean().unwrap_or(0.0))
    }

    /// Normalized MSE of one window and its gradient for every parameter
    pub fn loss_and_gradients(&self, window: &FeatureWindow) -> Result<(f64, ModelParameters)> {
        self.check_window(window, true)?;
        let p = &self.params;
        let (steps, hidden) = self.forward(&self.normalizer.inputs(window));
        let diff = self.head(&hidden) - self.normalizer.targets(window);
        let loss = diff.mapv(|d| d * d).mean().unwrap_or(0.0);

        let mut grads = p.zeros_like();
        let dy = diff * (2.0 / self.config.horizon as f64);
        grads.w_out += &outer(&dy, &hidden);
        grads.b_out += &dy;
        let mut dh = p.w_out.t().dot(&dy);

        for step in steps.iter().rev() {
            let StepCache { x, h_prev, z, r, n } = step;

            let dn = &dh * &z.mapv(|v| 1.0 - v);
            let dz = &dh * &(h_prev - n);
            let mut dh_prev = &dh * z;

            // candidate
            let da_n = &dn * &n.mapv(|v| 1.0 - v * v);
            grads.w_in += &outer(&da_n, x);
            grads.w_hn += &outer(&da_n, &(r * h_prev));
            grads.b_n += &da_n;
            let d_rh = p.w_hn.t().dot(&da_n);
            let dr = &d_rh * h_prev;
            dh_prev += &(&d_rh * r);

            // update gate
            let da_z = &dz * &z.mapv(|v| v * (1.0 - v));
            grads.w_iz += &outer(&da_z, x);
            grads.w_hz += &outer(&da_z, h_prev);
            grads.b_z += &da_z;
            dh_prev += &p.w_hz.t().dot(&da_z);

            // reset gate
            let da_r = &dr * &r.mapv(|v| v * (1.0 - v));
            grads.w_ir += &outer(&da_r, x);
            grads.w_hr += &outer(&da_r, h_prev);
            grads.b_r += &da_r;
            dh_prev += &p.w_hr.t().dot(&da_r);

            dh = dh_prev;
        }

        Ok((loss, grads))
    }

    fn forward(&self, inputs: &[Array1<f64>]) -> (Vec<StepCache>, Array1<f64>) {
        let p = &self.params;
        let mut h = Array1::zeros(self.config.hidden_size);
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let z = (p.w_iz.dot(x) + p.w_hz.dot(&h) + &p.b_z).mapv(sigmoid);
            let r = (p.w_ir.dot(x) + p.w_hr.dot(&h) + &p.b_r).mapv(sigmoid);
            let n = (p.w_in.dot(x) + p.w_hn.dot(&(&r * &h)) + &p.b_n).mapv(f64::tanh);
            let h_next = &z.mapv(|v| 1.0 - v) * &n + &z * &h;

            steps.push(StepCache {
                x: x.clone(),
                h_prev: h,
                z,
                r,
                n,
            });
            h = h_next;
        }

        (steps, h)
    }

    fn head(&self, hidden: &Array1<f64>) -> Array1<f64> {
        self.params.w_out.dot(hidden) + &self.params.b_out
    }

    fn check_window(&self, window: &FeatureWindow, needs_target: bool) -> Result<()> {
        if window.input_sequence.is_empty() {
            return Err(ForecastError::DataError(format!(
                "Window {} @ {} has no input rows",
                window.track_id, window.anchor_date
            )));
        }
        if let Some(row) = window
            .input_sequence
            .iter()
            .find(|row| row.len() != self.config.input_size)
        {
            return Err(ForecastError::DataError(format!(
                "Window {} @ {} has {} features, model expects {}",
                window.track_id,
                window.anchor_date,
                row.len(),
                self.config.input_size
            )));
        }
        if needs_target && window.target.len() != self.config.horizon {
            return Err(ForecastError::DataError(format!(
                "Window {} @ {} has {} targets, model forecasts {}",
                window.track_id,
                window.anchor_date,
                window.target.len(),
                self.config.horizon
            )));
        }
        Ok(())
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let column = a.view().insert_axis(Axis(1));
    let row = b.view().insert_axis(Axis(0));
    column.dot(&row)
}
