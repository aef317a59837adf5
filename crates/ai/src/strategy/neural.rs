//! Trained feed-forward neural net (sigmoid multilayer perceptron).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use mia_core::TimeSeries;

use super::scaler::sliding_windows;
use super::{FitSummary, Forecaster, StrategyOutput, TrainedRegressor, forecast_from_handle};
use crate::config::NeuralNetConfig;
use crate::model_cache::ModelHandle;
use crate::result::ForecastError;
use crate::selector::Strategy;

/// Reported for every neural net forecast; not derived from the data.
pub const NEURAL_NET_CONFIDENCE: f64 = 0.75;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fully connected layer, `weights[out][in]`.
#[derive(Debug, Clone, PartialEq)]
struct DenseLayer {
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
}

impl DenseLayer {
    /// Xavier-initialized weights, zero biases.
    fn new(input_size: usize, output_size: usize, rng: &mut StdRng) -> Self {
        let scale = (2.0 / (input_size + output_size) as f64).sqrt();
        let weights = (0..output_size)
            .map(|_| (0..input_size).map(|_| rng.gen_range(-scale..scale)).collect())
            .collect();
        Self {
            weights,
            biases: vec![0.0; output_size],
        }
    }

    fn forward_sigmoid(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.biases)
            .map(|(w, b)| sigmoid(w.iter().zip(input).map(|(wi, xi)| wi * xi).sum::<f64>() + b))
            .collect()
    }

    fn parameter_count(&self) -> usize {
        self.biases.len() * (self.weights.first().map_or(0, Vec::len) + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardNet {
    lookback: usize,
    /// Hidden layers followed by a single-unit output layer.
    layers: Vec<DenseLayer>,
}

impl FeedForwardNet {
    /// Train on an already normalized series.
    ///
    /// Stops after `max_iterations` epochs or as soon as the epoch mean
    /// squared error falls below `error_threshold`.
    pub fn train(
        normalized: &[f64],
        config: &NeuralNetConfig,
    ) -> Result<(Self, FitSummary), ForecastError> {
        let required = config.min_training_points.max(config.lookback + 1);
        if normalized.len() < required {
            return Err(ForecastError::insufficient(required, normalized.len()));
        }

        let samples = sliding_windows(normalized, config.lookback);
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut layers = Vec::with_capacity(config.hidden_layers.len() + 1);
        let mut prev = config.lookback;
        for &size in config.hidden_layers.iter().filter(|&&s| s > 0) {
            layers.push(DenseLayer::new(prev, size, &mut rng));
            prev = size;
        }
        layers.push(DenseLayer::new(prev, 1, &mut rng));

        let mut net = Self {
            lookback: config.lookback,
            layers,
        };

        let mut epochs = 0;
        let mut final_loss = f64::INFINITY;
        while epochs < config.max_iterations.max(1) {
            let mut total = 0.0;
            for &(window, target) in &samples {
                total += net.train_step(window, target, config.learning_rate);
            }
            epochs += 1;
            final_loss = total / samples.len() as f64;
            if !final_loss.is_finite() {
                return Err(ForecastError::training(format!(
                    "neural net loss diverged at iteration {epochs}"
                )));
            }
            if final_loss < config.error_threshold {
                break;
            }
        }

        let summary = FitSummary {
            epochs,
            final_loss,
            samples: samples.len(),
        };
        Ok((net, summary))
    }

    /// Activations of every layer, input first.
    fn activations(&self, input: &[f64]) -> Vec<Vec<f64>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(input.to_vec());
        for layer in &self.layers {
            let next = layer.forward_sigmoid(&acts[acts.len() - 1]);
            acts.push(next);
        }
        acts
    }

    fn train_step(&mut self, window: &[f64], target: f64, lr: f64) -> f64 {
        let acts = self.activations(window);
        let output = acts[acts.len() - 1][0];
        let err = output - target;

        let mut delta = vec![err * output * (1.0 - output)];
        for l in (0..self.layers.len()).rev() {
            let input = &acts[l];

            let prev_delta: Vec<f64> = if l > 0 {
                (0..input.len())
                    .map(|j| {
                        let back: f64 = self.layers[l]
                            .weights
                            .iter()
                            .zip(&delta)
                            .map(|(row, d)| row[j] * d)
                            .sum();
                        back * input[j] * (1.0 - input[j])
                    })
                    .collect()
            } else {
                Vec::new()
            };

            let layer = &mut self.layers[l];
            for ((row, bias), d) in layer.weights.iter_mut().zip(&mut layer.biases).zip(&delta) {
                for (w, x) in row.iter_mut().zip(input) {
                    *w -= lr * d * x;
                }
                *bias -= lr * d;
            }

            delta = prev_delta;
        }

        err * err
    }
}

impl TrainedRegressor for FeedForwardNet {
    fn lookback(&self) -> usize {
        self.lookback
    }

    fn predict_next(&self, window: &[f64]) -> f64 {
        self.layers
            .iter()
            .fold(window.to_vec(), |acc, layer| layer.forward_sigmoid(&acc))
            .first()
            .copied()
            .unwrap_or(f64::NAN)
    }

    fn parameter_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::parameter_count).sum()
    }
}

/// Forecasts through a cached neural net handle.
#[derive(Debug, Clone, Copy)]
pub struct NeuralNetForecaster<'a> {
    handle: &'a ModelHandle,
    recent_window: usize,
}

impl<'a> NeuralNetForecaster<'a> {
    pub fn new(handle: &'a ModelHandle, recent_window: usize) -> Self {
        Self {
            handle,
            recent_window,
        }
    }
}

impl Forecaster for NeuralNetForecaster<'_> {
    fn strategy(&self) -> Strategy {
        Strategy::NeuralNet
    }

    fn forecast(&self, series: &TimeSeries, horizon: usize) -> Result<StrategyOutput, ForecastError> {
        let recent = series.tail(self.recent_window);
        let predictions = forecast_from_handle(self.handle, recent, horizon)?;

        Ok(
            StrategyOutput::new(predictions, NEURAL_NET_CONFIDENCE).with_metadata(json!({
                "model_key": self.handle.key().as_str(),
                "steps": horizon,
                "lookback": self.handle.regressor().lookback(),
                "parameters": self.handle.regressor().parameter_count(),
                "base_value": recent.last().copied(),
            })),
        )
    }
}
