use serde_json::json;

use mia_core::stats;

use crate::result::ForecastError;
use crate::selector::Strategy;
use crate::strategy::StrategyOutput;

/// Added to the mean member confidence.
pub const ENSEMBLE_CONFIDENCE_BONUS: f64 = 0.05;
pub const ENSEMBLE_CONFIDENCE_CAP: f64 = 0.95;

/// Merges member forecasts step by step.
///
/// Members that failed are left out entirely. Members that produced fewer
/// than `horizon` steps, or a non-finite value at some step, are left out of
/// that step's average only.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleCombiner;

impl EnsembleCombiner {
    pub fn new() -> Self {
        Self
    }

    pub fn combine(
        &self,
        members: Vec<(Strategy, Result<StrategyOutput, ForecastError>)>,
        horizon: usize,
    ) -> Result<StrategyOutput, ForecastError> {
        let mut components = Vec::new();
        let mut excluded = Vec::new();
        let mut outputs = Vec::new();

        for (strategy, result) in members {
            match result {
                Ok(out) => {
                    components.push(strategy.as_str());
                    outputs.push(out);
                }
                Err(err) => {
                    tracing::warn!(
                        member = strategy.as_str(),
                        reason = err.code(),
                        error = %err,
                        "ensemble member excluded"
                    );
                    excluded.push(json!({ "strategy": strategy.as_str(), "reason": err.code() }));
                }
            }
        }

        if outputs.is_empty() {
            return Err(ForecastError::prediction("every ensemble member failed"));
        }

        let mut predictions = Vec::with_capacity(horizon);
        for step in 0..horizon {
            let values: Vec<f64> = outputs
                .iter()
                .filter_map(|o| o.predictions.get(step).copied())
                .filter(|v| v.is_finite())
                .collect();
            if values.is_empty() {
                return Err(ForecastError::prediction(format!(
                    "no ensemble member produced step {step}"
                )));
            }
            predictions.push(stats::mean(&values));
        }

        let confidences: Vec<f64> = outputs.iter().map(|o| o.confidence).collect();
        let confidence =
            (stats::mean(&confidences) + ENSEMBLE_CONFIDENCE_BONUS).min(ENSEMBLE_CONFIDENCE_CAP);

        let ensemble_first = predictions.first().copied();

        Ok(StrategyOutput::new(predictions, confidence).with_metadata(json!({
            "components": components,
            "excluded": excluded,
            "ensemble_first": ensemble_first,
            "horizon": horizon,
        })))
    }
}
