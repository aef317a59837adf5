//! Strategy selection.
//!
//! [`select_strategy`] is a pure decision function; the only data-dependent
//! input it needs (seasonality) comes from the cheap lag check in
//! [`detect_seasonality`], which runs before any model is trained.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use mia_core::stats;

use crate::config::EngineConfig;
use crate::options::LatencyPreference;
use crate::result::{ForecastError, StrategyTag};

/// Below this length only linear regression is attempted.
pub const MIN_SMOOTHING_LEN: usize = 8;
pub const MIN_ENSEMBLE_LEN: usize = 24;
pub const MIN_SEQUENCE_MODEL_LEN: usize = 50;

/// Closed set of forecasting paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Linear,
    Smoothing,
    SequenceModel,
    NeuralNet,
    Ensemble,
}

impl Strategy {
    pub fn tag(&self) -> StrategyTag {
        match self {
            Strategy::Linear => StrategyTag::Linear,
            Strategy::Smoothing => StrategyTag::Smoothing,
            Strategy::SequenceModel => StrategyTag::SequenceModel,
            Strategy::NeuralNet => StrategyTag::NeuralNet,
            Strategy::Ensemble => StrategyTag::Ensemble,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.tag().as_str()
    }

    /// Whether the strategy needs a trained model from the cache.
    pub fn is_trained(&self) -> bool {
        matches!(self, Strategy::SequenceModel | Strategy::NeuralNet)
    }
}

impl core::fmt::Display for Strategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "linear_regression" => Ok(Strategy::Linear),
            "smoothing" | "exponential_smoothing" => Ok(Strategy::Smoothing),
            "sequence_model" | "lstm" => Ok(Strategy::SequenceModel),
            "neural_net" | "neural_network" => Ok(Strategy::NeuralNet),
            "ensemble" => Ok(Strategy::Ensemble),
            _ => Err(ForecastError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Pick a strategy. First matching rule wins:
///
/// 1. `len < 8` → linear
/// 2. seasonal and `len >= 24` → ensemble
/// 3. fast latency → linear
/// 4. `len >= 50` → sequence model
/// 5. otherwise → smoothing
pub fn select_strategy(len: usize, seasonal: bool, latency: LatencyPreference) -> Strategy {
    if len < MIN_SMOOTHING_LEN {
        Strategy::Linear
    } else if seasonal && len >= MIN_ENSEMBLE_LEN {
        Strategy::Ensemble
    } else if latency == LatencyPreference::Fast {
        Strategy::Linear
    } else if len >= MIN_SEQUENCE_MODEL_LEN {
        Strategy::SequenceModel
    } else {
        Strategy::Smoothing
    }
}

/// Lag correlation check (lag 7, threshold 0.6 by default).
///
/// Runs on first differences so that a plain trend does not read as a
/// repeating pattern. Series shorter than `seasonality_min_length` are never
/// seasonal.
pub fn detect_seasonality(values: &[f64], config: &EngineConfig) -> bool {
    if values.len() < config.seasonality_min_length {
        return false;
    }
    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    stats::lagged_correlation(&diffs, config.seasonality_lag) > config.seasonality_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use super::Strategy;

    use LatencyPreference::*;

    #[test]
    fn decision_table() {
        assert_eq!(select_strategy(5, false, Balanced), Strategy::Linear);
        assert_eq!(select_strategy(30, true, Balanced), Strategy::Ensemble);
        assert_eq!(select_strategy(60, false, Fast), Strategy::Linear);
        assert_eq!(select_strategy(60, false, Balanced), Strategy::SequenceModel);
        assert_eq!(select_strategy(20, false, Balanced), Strategy::Smoothing);
    }

    #[test]
    fn seasonality_outranks_fast_latency() {
        assert_eq!(select_strategy(24, true, Fast), Strategy::Ensemble);
        assert_eq!(select_strategy(23, true, Fast), Strategy::Linear);
        assert_eq!(select_strategy(7, true, Accuracy), Strategy::Linear);
    }

    #[test]
    fn boundaries() {
        assert_eq!(select_strategy(8, false, Balanced), Strategy::Smoothing);
        assert_eq!(select_strategy(49, false, Accuracy), Strategy::Smoothing);
        assert_eq!(select_strategy(50, false, Accuracy), Strategy::SequenceModel);
    }

    #[test]
    fn weekly_pattern_is_seasonal() {
        let week = [10.0, 12.0, 15.0, 30.0, 32.0, 14.0, 11.0];
        let values: Vec<f64> = week.iter().cycle().take(35).copied().collect();
        assert!(detect_seasonality(&values, &EngineConfig::default()));
    }

    #[test]
    fn trend_alone_is_not_seasonal() {
        let ramp: Vec<f64> = (0..60).map(|i| 100.0 + 2.0 * i as f64).collect();
        assert!(!detect_seasonality(&ramp, &EngineConfig::default()));

        let example = [10.0, 12.0, 13.0, 15.0, 18.0, 21.0, 20.0, 19.0, 23.0, 25.0, 27.0, 30.0];
        assert!(!detect_seasonality(&example, &EngineConfig::default()));
    }

    #[test]
    fn short_series_are_never_seasonal() {
        let values: Vec<f64> = (0..11).map(|i| (i % 7) as f64).collect();
        assert!(!detect_seasonality(&values, &EngineConfig::default()));
    }

    #[test]
    fn parses_tags_and_aliases() {
        assert_eq!("lstm".parse::<Strategy>().unwrap(), Strategy::SequenceModel);
        assert_eq!(" Ensemble ".parse::<Strategy>().unwrap(), Strategy::Ensemble);
        let err = "arima".parse::<Strategy>().unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_STRATEGY");
        assert_eq!(Strategy::NeuralNet.to_string(), "neural_net");
    }

    proptest! {
        #[test]
        fn selection_is_deterministic(len in 0usize..200, seasonal: bool, lat in 0u8..3) {
            let latency = [Fast, Balanced, Accuracy][lat as usize];
            let a = select_strategy(len, seasonal, latency);
            prop_assert_eq!(a, select_strategy(len, seasonal, latency));
            prop_assert!(a != Strategy::NeuralNet);
        }
    }
}
