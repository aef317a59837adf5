//! Forecasting strategies.
//!
//! Closed-form strategies ([`LinearRegression`], [`ExponentialSmoothing`])
//! implement [`Forecaster`] directly. Trained strategies split into a
//! [`TrainedRegressor`] (the weights, owned by the model cache) and a
//! forecaster view over a cached handle.

use std::collections::VecDeque;

use serde_json::{Map, Value as JsonValue};

use mia_core::TimeSeries;

use crate::model_cache::ModelHandle;
use crate::result::ForecastError;
use crate::selector::Strategy;

pub mod linear;
pub mod neural;
pub mod scaler;
pub mod sequence;
pub mod smoothing;

pub use linear::LinearRegression;
pub use neural::{FeedForwardNet, NeuralNetForecaster};
pub use scaler::MinMaxScaler;
pub use sequence::{RecurrentRegressor, SequenceModelForecaster};
pub use smoothing::ExponentialSmoothing;

/// Outcome of one training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSummary {
    pub epochs: usize,
    /// Mean squared error (normalized space) of the last epoch.
    pub final_loss: f64,
    pub samples: usize,
}

/// Shape shared by every strategy: one value per step, a confidence and
/// strategy-specific diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    pub predictions: Vec<f64>,
    pub confidence: f64,
    pub metadata: JsonValue,
}

impl StrategyOutput {
    pub fn new(predictions: Vec<f64>, confidence: f64) -> Self {
        Self {
            predictions,
            confidence,
            metadata: JsonValue::Object(Map::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A strategy that can forecast `horizon` steps past the end of a series.
pub trait Forecaster: Send + Sync {
    fn strategy(&self) -> Strategy;

    fn forecast(&self, series: &TimeSeries, horizon: usize) -> Result<StrategyOutput, ForecastError>;
}

/// A trained next-step predictor working in normalized space.
pub trait TrainedRegressor: Send + Sync {
    /// Inputs expected by [`TrainedRegressor::predict_next`].
    fn lookback(&self) -> usize;

    /// Predict the value following `window` (`window.len() == lookback()`).
    fn predict_next(&self, window: &[f64]) -> f64;

    fn parameter_count(&self) -> usize;
}

/// Multi-step forecasting by feedback: each prediction becomes the newest
/// input and the oldest input is dropped.
///
/// `seed` must hold at least `model.lookback()` normalized values; only the
/// trailing `lookback` of them are used.
pub fn iterative_forecast<M>(model: &M, seed: &[f64], horizon: usize) -> Result<Vec<f64>, ForecastError>
where
    M: TrainedRegressor + ?Sized,
{
    let lookback = model.lookback();
    if seed.len() < lookback {
        return Err(ForecastError::insufficient(lookback, seed.len()));
    }

    let mut window: VecDeque<f64> = seed[seed.len() - lookback..].iter().copied().collect();
    let mut out = Vec::with_capacity(horizon);

    for step in 0..horizon {
        let input = window.make_contiguous();
        let next = model.predict_next(input);
        if !next.is_finite() {
            return Err(ForecastError::prediction(format!(
                "model produced a non-finite value at step {step}"
            )));
        }
        out.push(next);
        window.pop_front();
        window.push_back(next);
    }

    Ok(out)
}

/// Normalize `recent` with the handle's scaler, forecast `horizon` steps and
/// map the result back to the original scale.
pub(crate) fn forecast_from_handle(
    handle: &ModelHandle,
    recent: &[f64],
    horizon: usize,
) -> Result<Vec<f64>, ForecastError> {
    let scaler = handle.scaler();
    let normalized = scaler.normalize_all(recent);
    let raw = iterative_forecast(handle.regressor(), &normalized, horizon)?;
    Ok(raw.into_iter().map(|v| scaler.denormalize(v)).collect())
}
