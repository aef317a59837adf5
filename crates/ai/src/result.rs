use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use thiserror::Error;

use mia_core::{CoreError, StreamId};

/// Which path produced a [`ForecastResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyTag {
    #[serde(rename = "linear")]
    Linear,
    #[serde(rename = "smoothing")]
    Smoothing,
    #[serde(rename = "sequence_model")]
    SequenceModel,
    #[serde(rename = "neural_net")]
    NeuralNet,
    #[serde(rename = "ensemble")]
    Ensemble,
    /// A raw strategy tag was not recognized; linear regression ran instead.
    #[serde(rename = "fallback-linear")]
    FallbackLinear,
    /// The quality gate refused the request. `metadata.reason` holds the code.
    #[serde(rename = "rejected")]
    Rejected,
    /// A strategy failed. `metadata.reason` holds the code.
    #[serde(rename = "error")]
    Error,
}

impl StrategyTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyTag::Linear => "linear",
            StrategyTag::Smoothing => "smoothing",
            StrategyTag::SequenceModel => "sequence_model",
            StrategyTag::NeuralNet => "neural_net",
            StrategyTag::Ensemble => "ensemble",
            StrategyTag::FallbackLinear => "fallback-linear",
            StrategyTag::Rejected => "rejected",
            StrategyTag::Error => "error",
        }
    }

    /// `rejected` and `error` results carry no predictions.
    pub fn is_failure(&self) -> bool {
        matches!(self, StrategyTag::Rejected | StrategyTag::Error)
    }
}

impl core::fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a forecast request.
///
/// Failures are data, not panics: a refused or failed request still yields a
/// `ForecastResult`, with empty predictions, zero confidence and a `reason`
/// code in `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// One value per forecast step (`len == horizon` unless the request failed).
    pub predictions: Vec<f64>,

    /// Confidence in \[0, 1\].
    pub confidence: f64,

    pub strategy: StrategyTag,

    /// Free-form diagnostics (strategy parameters, model info, reason codes).
    pub metadata: JsonValue,
}

impl ForecastResult {
    pub fn new(predictions: Vec<f64>, confidence: f64, strategy: StrategyTag) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            predictions,
            confidence,
            strategy,
            metadata: JsonValue::Object(Map::new()),
        }
    }

    /// Replace the metadata map.
    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    /// Insert one metadata entry (turning non-object metadata into an object).
    pub fn with_meta(mut self, key: &str, value: JsonValue) -> Self {
        if !self.metadata.is_object() {
            self.metadata = JsonValue::Object(Map::new());
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// The quality gate refused the series.
    pub fn rejected(reason: &ForecastError, horizon: usize) -> Self {
        Self::new(Vec::new(), 0.0, StrategyTag::Rejected).with_metadata(json!({
            "reason": reason.code(),
            "detail": reason.to_string(),
            "horizon": horizon,
        }))
    }

    /// A strategy failed after the request was accepted.
    pub fn error(cause: &ForecastError, horizon: usize) -> Self {
        Self::new(Vec::new(), 0.0, StrategyTag::Error).with_metadata(json!({
            "reason": cause.code(),
            "error": cause.to_string(),
            "horizon": horizon,
        }))
    }

    /// Machine-readable reason code of a `rejected`/`error` result.
    pub fn reason(&self) -> Option<&str> {
        self.metadata.get("reason").and_then(JsonValue::as_str)
    }

    pub fn is_success(&self) -> bool {
        !self.strategy.is_failure()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForecastError {
    #[error("insufficient data: need at least {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("series is constant (zero variance)")]
    ConstantSeries,

    #[error("non-finite value at index {index}")]
    NonFiniteValue { index: usize },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("training exceeded its deadline of {0:?}")]
    TrainingTimedOut(Duration),

    #[error("prediction failed: {0}")]
    Prediction(String),

    #[error("unknown strategy tag: {0}")]
    UnknownStrategy(String),

    #[error("stream not found: {0}")]
    StreamNotFound(StreamId),

    #[error("stream is stopped: {0}")]
    StreamStopped(StreamId),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ForecastError {
    pub fn insufficient(required: usize, actual: usize) -> Self {
        Self::InsufficientData { required, actual }
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn prediction(msg: impl Into<String>) -> Self {
        Self::Prediction(msg.into())
    }

    /// Stable code surfaced as `metadata.reason`.
    pub fn code(&self) -> &'static str {
        match self {
            ForecastError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            ForecastError::ConstantSeries => "CONSTANT_SERIES",
            ForecastError::NonFiniteValue { .. } => "NON_FINITE_VALUE",
            ForecastError::InvalidOptions(_) => "INVALID_OPTIONS",
            ForecastError::Training(_) => "TRAINING_FAILED",
            ForecastError::TrainingTimedOut(_) => "TRAINING_TIMEOUT",
            ForecastError::Prediction(_) => "PREDICTION_FAILED",
            ForecastError::UnknownStrategy(_) => "UNKNOWN_STRATEGY",
            ForecastError::StreamNotFound(_) => "STREAM_NOT_FOUND",
            ForecastError::StreamStopped(_) => "STREAM_STOPPED",
            ForecastError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<CoreError> for ForecastError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NonFiniteValue { index } => ForecastError::NonFiniteValue { index },
            CoreError::Validation(msg) | CoreError::InvalidId(msg) => {
                ForecastError::InvalidOptions(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_result_carries_reason_code() {
        let r = ForecastResult::rejected(&ForecastError::insufficient(3, 1), 7);
        assert_eq!(r.strategy, StrategyTag::Rejected);
        assert!(r.predictions.is_empty());
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.reason(), Some("INSUFFICIENT_DATA"));
        assert_eq!(r.metadata["horizon"], 7);
    }

    #[test]
    fn confidence_is_clamped_and_sanitized() {
        assert_eq!(ForecastResult::new(vec![], 1.7, StrategyTag::Linear).confidence, 1.0);
        assert_eq!(ForecastResult::new(vec![], f64::NAN, StrategyTag::Linear).confidence, 0.0);
    }

    #[test]
    fn strategy_tags_serialize_to_wire_names() {
        let tag = serde_json::to_value(StrategyTag::FallbackLinear).unwrap();
        assert_eq!(tag, json!("fallback-linear"));
        let tag: StrategyTag = serde_json::from_value(json!("sequence_model")).unwrap();
        assert_eq!(tag, StrategyTag::SequenceModel);
    }

    #[test]
    fn with_meta_inserts_into_object() {
        let r = ForecastResult::new(vec![1.0], 0.5, StrategyTag::Linear)
            .with_meta("slope", json!(1.5))
            .with_meta("r2", json!(0.9));
        assert_eq!(r.metadata["slope"], 1.5);
        assert_eq!(r.metadata["r2"], 0.9);
    }
}
