//! # Forecasting Model
//!
//! One-step-ahead return forecasts from reduced factor history. The
//! architecture behind [`ReturnForecaster`] is a replaceable detail; the
//! contract is walk-forward validation with no look-ahead leakage, output
//! length equal to the asset count, and deterministic forecasts for a
//! fixed seed.
//!
//! [`WindowForecaster`] feeds a flattened window of recent factor rows
//! through a small feed-forward net with dropout between the hidden
//! layers, trained with AdamW under an enforced epoch cap. All randomness
//! (weight init, dropout masks) is drawn from one seeded generator.

use candle_core::DType;
use candle_core::Device;
use candle_core::Tensor;
use candle_core::Var;
use candle_nn::AdamW;
use candle_nn::Linear;
use candle_nn::Module;
use candle_nn::Optimizer;
use candle_nn::ParamsAdamW;
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::error::AllocationError;
use crate::error::Result;

/// Forecaster hyperparameters.
#[derive(Clone, Debug)]
pub struct ForecastConfig {
  /// Consecutive factor rows flattened into one model input.
  pub window: usize,
  /// Hidden layer width.
  pub hidden_dim: usize,
  /// Epoch cap; training is a blocking, bounded-time operation.
  pub epochs: usize,
  pub learning_rate: f64,
  /// Dropout probability applied after each hidden layer during training.
  pub dropout: f32,
  /// Number of consecutive walk-forward folds.
  pub n_folds: usize,
  pub seed: u64,
}

impl Default for ForecastConfig {
  fn default() -> Self {
    Self {
      window: 5,
      hidden_dim: 32,
      epochs: 60,
      learning_rate: 1e-3,
      dropout: 0.2,
      n_folds: 5,
      seed: 42,
    }
  }
}

/// Validation metrics for one walk-forward fold.
#[derive(Clone, Debug)]
pub struct FoldMetric {
  pub fold: usize,
  pub train_len: usize,
  pub val_len: usize,
  pub val_rmse: f32,
}

/// Walk-forward training report.
#[derive(Clone, Debug)]
pub struct WalkForwardReport {
  pub folds: Vec<FoldMetric>,
}

/// Contract between the engine and any return-forecasting technique.
pub trait ReturnForecaster {
  /// Fit on factor history and the realized returns aligned with it,
  /// validating with an expanding window so no fold ever trains on data
  /// from its own future.
  fn train(&mut self, factors: &Array2<f64>, realized: &Array2<f64>) -> Result<WalkForwardReport>;

  /// Predict next-period returns, one per asset. Outputs longer than the
  /// asset count are truncated.
  fn predict(&self, factors: &Array2<f64>) -> Result<Vec<f64>>;
}

/// Fold layout over `samples` points: each entry is (val_start, val_end),
/// training always covers [0, val_start). The first partition carries no
/// prior data and is only ever trained on.
pub(crate) fn fold_bounds(samples: usize, n_folds: usize) -> Vec<(usize, usize)> {
  (1..n_folds)
    .map(|k| (k * samples / n_folds, (k + 1) * samples / n_folds))
    .collect()
}

fn seeded_linear<R: Rng>(
  rng: &mut R,
  in_dim: usize,
  out_dim: usize,
  device: &Device,
  vars: &mut Vec<Var>,
) -> candle_core::Result<Linear> {
  // Xavier-uniform weights, zero bias.
  let bound = (6.0 / (in_dim + out_dim) as f64).sqrt() as f32;
  let weights: Vec<f32> = (0..out_dim * in_dim)
    .map(|_| rng.gen_range(-bound..bound))
    .collect();
  let weight = Var::from_tensor(&Tensor::from_vec(weights, (out_dim, in_dim), device)?)?;
  let bias = Var::from_tensor(&Tensor::zeros(out_dim, DType::F32, device)?)?;
  let layer = Linear::new(weight.as_tensor().clone(), Some(bias.as_tensor().clone()));
  vars.push(weight);
  vars.push(bias);
  Ok(layer)
}

/// Inverted dropout with a caller-owned generator, so masks replay under
/// the same seed.
fn seeded_dropout<R: Rng>(x: &Tensor, p: f32, rng: &mut R) -> candle_core::Result<Tensor> {
  if p <= 0.0 {
    return Ok(x.clone());
  }
  let (rows, cols) = x.dims2()?;
  let scale = 1.0 / (1.0 - p);
  let mask: Vec<f32> = (0..rows * cols)
    .map(|_| if rng.gen::<f32>() < p { 0.0 } else { scale })
    .collect();
  let mask = Tensor::from_vec(mask, (rows, cols), x.device())?;
  x.mul(&mask)
}

struct SequenceNet {
  dense1: Linear,
  dense2: Linear,
  out: Linear,
  dropout: f32,
}

impl SequenceNet {
  fn new<R: Rng>(
    rng: &mut R,
    input_dim: usize,
    hidden_dim: usize,
    output_dim: usize,
    dropout: f32,
    device: &Device,
  ) -> candle_core::Result<(Self, Vec<Var>)> {
    let mut vars = Vec::new();
    let dense1 = seeded_linear(rng, input_dim, hidden_dim, device, &mut vars)?;
    let dense2 = seeded_linear(rng, hidden_dim, hidden_dim, device, &mut vars)?;
    let out = seeded_linear(rng, hidden_dim, output_dim, device, &mut vars)?;
    Ok((
      Self {
        dense1,
        dense2,
        out,
        dropout,
      },
      vars,
    ))
  }

  /// Training-mode forward pass; dropout masks come from `rng`.
  fn forward_train<R: Rng>(&self, xs: &Tensor, rng: &mut R) -> candle_core::Result<Tensor> {
    let x = self.dense1.forward(xs)?.elu(1.0)?;
    let x = seeded_dropout(&x, self.dropout, rng)?;
    let x = self.dense2.forward(&x)?.elu(1.0)?;
    let x = seeded_dropout(&x, self.dropout, rng)?;
    self.out.forward(&x)
  }

  fn forward_eval(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
    let x = self.dense1.forward(xs)?.elu(1.0)?;
    let x = self.dense2.forward(&x)?.elu(1.0)?;
    self.out.forward(&x)
  }
}

struct TrainedState {
  net: SequenceNet,
  // Keeps the trained parameters the net's layers share alive.
  _vars: Vec<Var>,
  input_dim: usize,
}

/// Feed-forward window forecaster over reduced factors.
pub struct WindowForecaster {
  config: ForecastConfig,
  n_assets: usize,
  device: Device,
  state: Option<TrainedState>,
}

impl WindowForecaster {
  pub fn new(n_assets: usize, config: ForecastConfig) -> Self {
    Self {
      config,
      n_assets,
      device: Device::Cpu,
      state: None,
    }
  }

  /// Flatten windows of factor rows into model inputs with the return of
  /// the following period as the target.
  fn build_samples(
    &self,
    factors: &Array2<f64>,
    realized: &Array2<f64>,
  ) -> Result<(Vec<f32>, Vec<f32>, usize)> {
    let t = factors.nrows();
    let k = factors.ncols();
    let w = self.config.window;
    if t <= w {
      return Err(AllocationError::InsufficientData {
        needed: w + 1,
        got: t,
      });
    }

    let samples = t - w;
    let mut xs = Vec::with_capacity(samples * w * k);
    let mut ys = Vec::with_capacity(samples * self.n_assets);
    for end in (w - 1)..(t - 1) {
      for row in (end + 1 - w)..=end {
        for col in 0..k {
          xs.push(factors[[row, col]] as f32);
        }
      }
      for col in 0..self.n_assets {
        ys.push(realized[[end + 1, col]] as f32);
      }
    }
    Ok((xs, ys, samples))
  }

  fn fit(
    &self,
    xs: &Tensor,
    ys: &Tensor,
    input_dim: usize,
    rng: &mut StdRng,
  ) -> Result<(SequenceNet, Vec<Var>)> {
    let (net, vars) = SequenceNet::new(
      rng,
      input_dim,
      self.config.hidden_dim,
      self.n_assets,
      self.config.dropout,
      &self.device,
    )?;

    let params = ParamsAdamW {
      lr: self.config.learning_rate,
      beta1: 0.9,
      beta2: 0.999,
      eps: 1e-7,
      weight_decay: 0.0,
    };
    let mut opt = AdamW::new(vars.clone(), params)?;

    for _ in 0..self.config.epochs {
      let pred = net.forward_train(xs, rng)?;
      let loss = candle_nn::loss::mse(&pred, ys)?;
      opt.backward_step(&loss)?;
    }
    Ok((net, vars))
  }

  fn rmse(&self, net: &SequenceNet, xs: &Tensor, ys: &Tensor) -> Result<f32> {
    let pred = net.forward_eval(xs)?;
    let rmse = candle_nn::loss::mse(&pred, ys)?.sqrt()?;
    Ok(rmse.to_scalar::<f32>()?)
  }

  fn tensor_slice(
    &self,
    data: &[f32],
    rows: std::ops::Range<usize>,
    width: usize,
  ) -> Result<Tensor> {
    let slice = &data[rows.start * width..rows.end * width];
    Ok(Tensor::from_slice(
      slice,
      (rows.end - rows.start, width),
      &self.device,
    )?)
  }
}

impl ReturnForecaster for WindowForecaster {
  fn train(&mut self, factors: &Array2<f64>, realized: &Array2<f64>) -> Result<WalkForwardReport> {
    if factors.nrows() != realized.nrows() {
      return Err(AllocationError::Forecast(format!(
        "factor history has {} rows, realized returns {}",
        factors.nrows(),
        realized.nrows()
      )));
    }
    let t = factors.nrows();
    if t < 2 * self.config.n_folds {
      return Err(AllocationError::InsufficientData {
        needed: 2 * self.config.n_folds,
        got: t,
      });
    }

    let input_dim = self.config.window * factors.ncols();
    let (xs, ys, samples) = self.build_samples(factors, realized)?;
    let mut rng = StdRng::seed_from_u64(self.config.seed);

    let mut report = WalkForwardReport { folds: Vec::new() };
    for (fold, (val_start, val_end)) in fold_bounds(samples, self.config.n_folds)
      .into_iter()
      .enumerate()
    {
      if val_start == 0 || val_end <= val_start {
        continue;
      }
      let x_train = self.tensor_slice(&xs, 0..val_start, input_dim)?;
      let y_train = self.tensor_slice(&ys, 0..val_start, self.n_assets)?;
      let x_val = self.tensor_slice(&xs, val_start..val_end, input_dim)?;
      let y_val = self.tensor_slice(&ys, val_start..val_end, self.n_assets)?;

      let (net, _vars) = self.fit(&x_train, &y_train, input_dim, &mut rng)?;
      let val_rmse = self.rmse(&net, &x_val, &y_val)?;
      debug!(fold, val_start, val_end, val_rmse, "walk-forward fold");
      report.folds.push(FoldMetric {
        fold: fold + 1,
        train_len: val_start,
        val_len: val_end - val_start,
        val_rmse,
      });
    }

    // Final model sees the full history.
    let x_all = self.tensor_slice(&xs, 0..samples, input_dim)?;
    let y_all = self.tensor_slice(&ys, 0..samples, self.n_assets)?;
    let (net, vars) = self.fit(&x_all, &y_all, input_dim, &mut rng)?;
    self.state = Some(TrainedState {
      net,
      _vars: vars,
      input_dim,
    });
    Ok(report)
  }

  fn predict(&self, factors: &Array2<f64>) -> Result<Vec<f64>> {
    let state = self
      .state
      .as_ref()
      .ok_or_else(|| AllocationError::Forecast("model has not been trained".into()))?;

    let t = factors.nrows();
    let k = factors.ncols();
    let w = self.config.window;
    if t < w {
      return Err(AllocationError::InsufficientData { needed: w, got: t });
    }
    if w * k != state.input_dim {
      return Err(AllocationError::Forecast(format!(
        "factor width {k} does not match the trained input size"
      )));
    }

    let mut flat = Vec::with_capacity(state.input_dim);
    for row in (t - w)..t {
      for col in 0..k {
        flat.push(factors[[row, col]] as f32);
      }
    }
    let xt = Tensor::from_slice(&flat, (1, state.input_dim), &self.device)?;
    let out = state.net.forward_eval(&xt)?.to_vec2::<f32>()?;

    let mut predicted: Vec<f64> = out.into_iter().flatten().map(|v| v as f64).collect();
    predicted.truncate(self.n_assets);

    if predicted.len() < self.n_assets {
      return Err(AllocationError::Forecast(format!(
        "model emitted {} outputs for {} assets",
        predicted.len(),
        self.n_assets
      )));
    }
    if predicted.iter().any(|v| !v.is_finite()) {
      return Err(AllocationError::Forecast(
        "non-finite prediction from the model".into(),
      ));
    }
    Ok(predicted)
  }
}
