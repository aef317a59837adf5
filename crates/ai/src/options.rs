//! Per-request forecast options.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use mia_core::ModelKey;

use crate::result::ForecastError;

/// Default number of future steps.
pub const DEFAULT_HORIZON: usize = 7;

/// How much latency the caller is willing to trade for model quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyPreference {
    /// Never train a model; answer from a closed-form strategy.
    Fast,
    #[default]
    Balanced,
    Accuracy,
}

impl FromStr for LatencyPreference {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "accuracy" => Ok(Self::Accuracy),
            other => Err(ForecastError::InvalidOptions(format!(
                "unknown latency preference: {other}"
            ))),
        }
    }
}

/// Options of a single `predict` call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastOptions {
    /// Number of future steps to forecast. Must be positive.
    pub horizon: usize,
    pub latency_preference: LatencyPreference,
    /// Cache slot used by trained strategies.
    pub model_key: ModelKey,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            latency_preference: LatencyPreference::default(),
            model_key: ModelKey::default(),
        }
    }
}

impl ForecastOptions {
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_latency(mut self, latency_preference: LatencyPreference) -> Self {
        self.latency_preference = latency_preference;
        self
    }

    pub fn with_model_key(mut self, model_key: ModelKey) -> Self {
        self.model_key = model_key;
        self
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.horizon == 0 {
            return Err(ForecastError::InvalidOptions(
                "horizon must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}
