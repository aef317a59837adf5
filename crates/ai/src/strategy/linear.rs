use serde_json::json;

use mia_core::{TimeSeries, stats};

use super::{Forecaster, StrategyOutput};
use crate::result::ForecastError;
use crate::selector::Strategy;

/// Least-squares line over `(index, value)`, extrapolated past the end.
///
/// Predictions are clamped to be non-negative; confidence is `R²` clamped
/// to `[0.3, 0.9]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRegression;

impl Forecaster for LinearRegression {
    fn strategy(&self) -> Strategy {
        Strategy::Linear
    }

    fn forecast(&self, series: &TimeSeries, horizon: usize) -> Result<StrategyOutput, ForecastError> {
        if series.len() < 3 {
            return Err(ForecastError::insufficient(3, series.len()));
        }
        let fit = stats::linear_regression(series.values())
            .ok_or_else(|| ForecastError::prediction("regression needs two points"))?;

        let start = series.len();
        let predictions = (0..horizon)
            .map(|i| fit.predict((start + i) as f64).max(0.0))
            .collect();

        Ok(StrategyOutput::new(predictions, fit.r_squared.clamp(0.3, 0.9)).with_metadata(json!({
            "type": "linear_regression",
            "r2": fit.r_squared,
            "slope": fit.slope,
            "intercept": fit.intercept,
        })))
    }
}
