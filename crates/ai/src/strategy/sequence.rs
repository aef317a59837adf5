//! Trained sequence model: a small Elman recurrent network.
//!
//! One hidden layer of `tanh` units is unrolled over the lookback window and
//! a linear read-out predicts the next normalized value. Training is plain
//! per-sample SGD with backpropagation through time and clipped gradients,
//! seeded so that a given series and config always yield the same weights.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

use mia_core::{TimeSeries, stats};

use super::scaler::sliding_windows;
use super::{FitSummary, Forecaster, StrategyOutput, TrainedRegressor, forecast_from_handle};
use crate::config::SequenceModelConfig;
use crate::model_cache::ModelHandle;
use crate::pattern::{TrendDirection, half_split_trend};
use crate::result::ForecastError;
use crate::selector::Strategy;

const GRADIENT_CLIP: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentRegressor {
    lookback: usize,
    /// Input weight per hidden unit.
    w_x: Vec<f64>,
    /// Recurrent weights, `w_h[i][j]` maps unit `j` at `t-1` to unit `i` at `t`.
    w_h: Vec<Vec<f64>>,
    b_h: Vec<f64>,
    w_o: Vec<f64>,
    b_o: f64,
}

impl RecurrentRegressor {
    fn init(lookback: usize, hidden: usize, rng: &mut StdRng) -> Self {
        let input_scale = (2.0 / (1 + hidden) as f64).sqrt();
        let recurrent_scale = (1.0 / hidden as f64).sqrt();
        let output_scale = (2.0 / (hidden + 1) as f64).sqrt();

        Self {
            lookback,
            w_x: (0..hidden)
                .map(|_| rng.gen_range(-input_scale..input_scale))
                .collect(),
            w_h: (0..hidden)
                .map(|_| {
                    (0..hidden)
                        .map(|_| rng.gen_range(-recurrent_scale..recurrent_scale))
                        .collect()
                })
                .collect(),
            b_h: vec![0.0; hidden],
            w_o: (0..hidden)
                .map(|_| rng.gen_range(-output_scale..output_scale))
                .collect(),
            b_o: 0.0,
        }
    }

    /// Train on an already normalized series.
    pub fn train(
        normalized: &[f64],
        config: &SequenceModelConfig,
    ) -> Result<(Self, FitSummary), ForecastError> {
        let required = config.min_training_points.max(config.lookback + 1);
        if normalized.len() < required {
            return Err(ForecastError::insufficient(required, normalized.len()));
        }

        let samples = sliding_windows(normalized, config.lookback);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut model = Self::init(config.lookback, config.hidden_units.max(1), &mut rng);

        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut final_loss = 0.0;
        let epochs = config.epochs.max(1);

        for epoch in 0..epochs {
            order.shuffle(&mut rng);
            let mut total = 0.0;
            for &i in &order {
                let (window, target) = samples[i];
                total += model.train_step(window, target, config.learning_rate);
            }
            final_loss = total / samples.len() as f64;
            if !final_loss.is_finite() {
                return Err(ForecastError::training(format!(
                    "sequence model loss diverged at epoch {epoch}"
                )));
            }
        }

        let summary = FitSummary {
            epochs,
            final_loss,
            samples: samples.len(),
        };
        Ok((model, summary))
    }

    fn hidden(&self) -> usize {
        self.b_h.len()
    }

    /// Hidden states over the window; `states[0]` is the zero state.
    fn unroll(&self, window: &[f64]) -> Vec<Vec<f64>> {
        let hidden = self.hidden();
        let mut states = Vec::with_capacity(window.len() + 1);
        states.push(vec![0.0; hidden]);
        for &x in window {
            let prev = &states[states.len() - 1];
            let next: Vec<f64> = (0..hidden)
                .map(|i| {
                    let recurrent: f64 = self.w_h[i].iter().zip(prev).map(|(w, h)| w * h).sum();
                    (self.w_x[i] * x + recurrent + self.b_h[i]).tanh()
                })
                .collect();
            states.push(next);
        }
        states
    }

    fn read_out(&self, state: &[f64]) -> f64 {
        self.w_o.iter().zip(state).map(|(w, h)| w * h).sum::<f64>() + self.b_o
    }

    /// One SGD update on a single sample; returns its squared error.
    fn train_step(&mut self, window: &[f64], target: f64, lr: f64) -> f64 {
        let hidden = self.hidden();
        let states = self.unroll(window);
        let last = &states[window.len()];
        let err = self.read_out(last) - target;

        let g_wo: Vec<f64> = last.iter().map(|h| err * h).collect();
        let g_bo = err;
        let mut g_wx = vec![0.0; hidden];
        let mut g_bh = vec![0.0; hidden];
        let mut g_wh = vec![vec![0.0; hidden]; hidden];

        let mut dh: Vec<f64> = self.w_o.iter().map(|w| err * w).collect();
        for t in (0..window.len()).rev() {
            let h_t = &states[t + 1];
            let h_prev = &states[t];
            let da: Vec<f64> = dh.iter().zip(h_t).map(|(d, h)| d * (1.0 - h * h)).collect();

            for i in 0..hidden {
                g_wx[i] += da[i] * window[t];
                g_bh[i] += da[i];
                for (g, hp) in g_wh[i].iter_mut().zip(h_prev) {
                    *g += da[i] * hp;
                }
            }

            dh = (0..hidden)
                .map(|j| (0..hidden).map(|i| self.w_h[i][j] * da[i]).sum())
                .collect();
        }

        apply(&mut self.w_o, &g_wo, lr);
        self.b_o -= lr * g_bo.clamp(-GRADIENT_CLIP, GRADIENT_CLIP);
        apply(&mut self.w_x, &g_wx, lr);
        apply(&mut self.b_h, &g_bh, lr);
        for (row, grads) in self.w_h.iter_mut().zip(&g_wh) {
            apply(row, grads, lr);
        }

        err * err
    }
}

fn apply(params: &mut [f64], grads: &[f64], lr: f64) {
    for (p, g) in params.iter_mut().zip(grads) {
        *p -= lr * g.clamp(-GRADIENT_CLIP, GRADIENT_CLIP);
    }
}

impl TrainedRegressor for RecurrentRegressor {
    fn lookback(&self) -> usize {
        self.lookback
    }

    fn predict_next(&self, window: &[f64]) -> f64 {
        let states = self.unroll(window);
        self.read_out(&states[window.len()])
    }

    fn parameter_count(&self) -> usize {
        let h = self.hidden();
        h + h * h + h + h + 1
    }
}

/// Heuristic confidence for a sequence forecast, in `[0.3, 0.95]`.
///
/// Base 0.7; +0.15 when the recent historical trend agrees with the forecast
/// trend; +0.10 for low recent variability (CV < 0.1), -0.15 for high (> 0.3).
pub fn sequence_confidence(historical: &[f64], predictions: &[f64]) -> f64 {
    if historical.len() < 5 {
        return 0.5;
    }

    let mut confidence: f64 = 0.7;

    let recent = &historical[historical.len().saturating_sub(10)..];
    let historical_direction = stats::linear_regression(recent)
        .map_or(TrendDirection::Unknown, |fit| TrendDirection::from_slope(fit.slope));
    if historical_direction == half_split_trend(predictions).direction {
        confidence += 0.15;
    }

    let cv = stats::coefficient_of_variation(&historical[historical.len().saturating_sub(7)..]);
    if cv < 0.1 {
        confidence += 0.1;
    } else if cv > 0.3 {
        confidence -= 0.15;
    }

    confidence.clamp(0.3, 0.95)
}

/// Forecasts through a cached sequence model handle.
#[derive(Debug, Clone, Copy)]
pub struct SequenceModelForecaster<'a> {
    handle: &'a ModelHandle,
    recent_window: usize,
}

impl<'a> SequenceModelForecaster<'a> {
    pub fn new(handle: &'a ModelHandle, recent_window: usize) -> Self {
        Self {
            handle,
            recent_window,
        }
    }
}

impl Forecaster for SequenceModelForecaster<'_> {
    fn strategy(&self) -> Strategy {
        Strategy::SequenceModel
    }

    fn forecast(&self, series: &TimeSeries, horizon: usize) -> Result<StrategyOutput, ForecastError> {
        let recent = series.tail(self.recent_window);
        let predictions = forecast_from_handle(self.handle, recent, horizon)?;
        let confidence = sequence_confidence(recent, &predictions);
        let trend = half_split_trend(&predictions);

        Ok(StrategyOutput::new(predictions, confidence).with_metadata(json!({
            "model_key": self.handle.key().as_str(),
            "steps": horizon,
            "base_value": recent.last().copied(),
            "trend": trend,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::MinMaxScaler;

    fn config() -> SequenceModelConfig {
        SequenceModelConfig {
            epochs: 15,
            ..SequenceModelConfig::default()
        }
    }

    fn wave(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| 20.0 + i as f64 * 0.5 + 3.0 * (i as f64 / 3.0).sin())
            .collect()
    }

    #[test]
    fn training_is_deterministic_per_seed() {
        let values = wave(40);
        let normalized = MinMaxScaler::fit(&values).unwrap().normalize_all(&values);

        let (a, sa) = RecurrentRegressor::train(&normalized, &config()).unwrap();
        let (b, sb) = RecurrentRegressor::train(&normalized, &config()).unwrap();
        assert_eq!(a, b);
        assert_eq!(sa, sb);
        assert_eq!(sa.samples, 30);
        assert!(sa.final_loss.is_finite());
    }

    #[test]
    fn training_reduces_loss() {
        let values = wave(60);
        let normalized = MinMaxScaler::fit(&values).unwrap().normalize_all(&values);
        let short = SequenceModelConfig { epochs: 1, ..config() };
        let long = SequenceModelConfig { epochs: 40, ..config() };
        let (_, first) = RecurrentRegressor::train(&normalized, &short).unwrap();
        let (_, last) = RecurrentRegressor::train(&normalized, &long).unwrap();
        assert!(last.final_loss < first.final_loss);
    }

    #[test]
    fn too_few_points_is_insufficient() {
        let err = RecurrentRegressor::train(&[0.0, 0.5, 1.0], &config()).unwrap_err();
        assert_eq!(err, ForecastError::insufficient(11, 3));
    }

    #[test]
    fn parameter_count_matches_shape() {
        let values = wave(20);
        let normalized = MinMaxScaler::fit(&values).unwrap().normalize_all(&values);
        let cfg = SequenceModelConfig {
            hidden_units: 4,
            epochs: 1,
            ..config()
        };
        let (model, _) = RecurrentRegressor::train(&normalized, &cfg).unwrap();
        assert_eq!(model.parameter_count(), 4 + 16 + 4 + 4 + 1);
        assert_eq!(model.lookback(), 10);
    }

    #[test]
    fn confidence_rules() {
        assert_eq!(sequence_confidence(&[1.0, 2.0], &[3.0, 4.0]), 0.5);

        // Rising history, rising forecast, low variability: 0.7 + 0.15 + 0.1.
        let history: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let c = sequence_confidence(&history, &[120.0, 121.0, 130.0, 135.0]);
        assert!((c - 0.95).abs() < 1e-12);

        // Disagreeing trend and high variability: 0.7 - 0.15.
        let noisy = [10.0, 1.0, 10.0, 1.0, 10.0, 1.0, 10.0, 1.0];
        let c = sequence_confidence(&noisy, &[5.0, 5.0, 9.0, 9.0]);
        assert!((c - 0.55).abs() < 1e-12);
    }
}
