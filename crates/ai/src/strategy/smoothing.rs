use serde_json::json;

use mia_core::{TimeSeries, stats};

use super::{Forecaster, StrategyOutput};
use crate::result::ForecastError;
use crate::selector::Strategy;

pub const DEFAULT_ALPHA: f64 = 0.3;

/// Single exponential smoothing. Every forecast step equals the last
/// smoothed level (no trend term), clamped to be non-negative.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialSmoothing {
    alpha: f64,
}

impl Default for ExponentialSmoothing {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl ExponentialSmoothing {
    pub fn new(alpha: f64) -> Result<Self, ForecastError> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ForecastError::InvalidOptions(format!(
                "smoothing factor must be in (0, 1], got {alpha}"
            )));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Smoothed level after each observation.
    pub fn smooth(&self, values: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(values.len());
        let mut level = match values.first() {
            Some(&v) => v,
            None => return out,
        };
        out.push(level);
        for &v in &values[1..] {
            level = self.alpha * v + (1.0 - self.alpha) * level;
            out.push(level);
        }
        out
    }
}

impl Forecaster for ExponentialSmoothing {
    fn strategy(&self) -> Strategy {
        Strategy::Smoothing
    }

    fn forecast(&self, series: &TimeSeries, horizon: usize) -> Result<StrategyOutput, ForecastError> {
        if series.len() < 3 {
            return Err(ForecastError::insufficient(3, series.len()));
        }
        let values = series.values();
        let smoothed = self.smooth(values);
        let last = smoothed.last().copied().unwrap_or_default();

        // Mean absolute fit error relative to the series mean.
        let errors: Vec<f64> = values[1..]
            .iter()
            .zip(&smoothed[1..])
            .map(|(actual, fitted)| (actual - fitted).abs())
            .collect();
        let mape = stats::mean(&errors) / stats::mean(values);
        let confidence = if mape.is_finite() {
            (1.0 - mape).clamp(0.3, 0.9)
        } else {
            0.3
        };

        let predictions = vec![last.max(0.0); horizon];

        Ok(StrategyOutput::new(predictions, confidence).with_metadata(json!({
            "type": "exponential_smoothing",
            "alpha": self.alpha,
            "mape": if mape.is_finite() { json!(mape) } else { json!(null) },
            "last_smoothed": last,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_steps_equal_the_last_level() {
        let series = TimeSeries::new(vec![10.0, 12.0, 13.0, 15.0, 18.0, 21.0, 20.0, 19.0]).unwrap();
        let out = ExponentialSmoothing::default().forecast(&series, 5).unwrap();
        let level = ExponentialSmoothing::default().smooth(series.values())[7];
        assert_eq!(out.predictions, vec![level; 5]);
        assert!((0.3..=0.9).contains(&out.confidence));
        assert_eq!(out.metadata["last_smoothed"], level);
    }

    #[test]
    fn smoothing_recurrence() {
        let s = ExponentialSmoothing::new(0.5).unwrap().smooth(&[0.0, 4.0, 8.0]);
        assert_eq!(s, vec![0.0, 2.0, 5.0]);
    }

    #[test]
    fn zero_mean_series_gets_the_floor_confidence() {
        let series = TimeSeries::new(vec![-1.0, 1.0, -1.0, 1.0]).unwrap();
        let out = ExponentialSmoothing::default().forecast(&series, 2).unwrap();
        assert_eq!(out.confidence, 0.3);
        assert!(out.metadata["mape"].is_null());
    }

    #[test]
    fn rejects_bad_alpha() {
        assert!(ExponentialSmoothing::new(0.0).is_err());
        assert!(ExponentialSmoothing::new(1.5).is_err());
    }
}
