use serde::{Deserialize, Serialize};

use mia_core::stats;

use crate::result::ForecastError;

/// Min-max normalization fitted on a training series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    /// Fails on an empty or constant series (a zero range cannot be inverted).
    pub fn fit(values: &[f64]) -> Result<Self, ForecastError> {
        let (min, max) = stats::min_max(values)
            .ok_or_else(|| ForecastError::training("cannot fit a scaler on an empty series"))?;
        if max - min == 0.0 {
            return Err(ForecastError::training("cannot fit a scaler on a constant series"));
        }
        Ok(Self { min, max })
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn denormalize(&self, value: f64) -> f64 {
        value * self.range() + self.min
    }

    pub fn normalize_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.normalize(v)).collect()
    }
}

/// `(input window, next value)` pairs for next-step training.
pub fn sliding_windows(values: &[f64], lookback: usize) -> Vec<(&[f64], f64)> {
    if lookback == 0 || values.len() <= lookback {
        return Vec::new();
    }
    (0..values.len() - lookback)
        .map(|i| (&values[i..i + lookback], values[i + lookback]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_range_onto_unit_interval() {
        let scaler = MinMaxScaler::fit(&[2.0, 6.0, 4.0]).unwrap();
        assert_eq!(scaler.normalize_all(&[2.0, 4.0, 6.0]), vec![0.0, 0.5, 1.0]);
        assert_eq!(scaler.denormalize(0.25), 3.0);
    }

    #[test]
    fn constant_series_cannot_be_scaled() {
        let err = MinMaxScaler::fit(&[3.0, 3.0]).unwrap_err();
        assert_eq!(err.code(), "TRAINING_FAILED");
        assert!(MinMaxScaler::fit(&[]).is_err());
    }

    #[test]
    fn windows_pair_inputs_with_the_next_value() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let windows = sliding_windows(&values, 2);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], (&values[0..2], 3.0));
        assert_eq!(windows[1], (&values[1..3], 4.0));
        assert!(sliding_windows(&values, 4).is_empty());
    }
}
