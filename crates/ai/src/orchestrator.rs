//! Public forecasting entry point.

use std::sync::Arc;

use serde_json::json;

use mia_core::TimeSeries;

use crate::config::EngineConfig;
use crate::ensemble::EnsembleCombiner;
use crate::model_cache::{ModelCache, ModelHandle, ModelKind};
use crate::options::ForecastOptions;
use crate::pattern::{PatternAnalyzer, PatternReport};
use crate::quality::SeriesQualityGate;
use crate::result::{ForecastError, ForecastResult, StrategyTag};
use crate::selector::{Strategy, detect_seasonality, select_strategy};
use crate::strategy::{
    ExponentialSmoothing, Forecaster, LinearRegression, NeuralNetForecaster,
    SequenceModelForecaster, StrategyOutput,
};

/// Wires gate, selector, strategies, cache and ensemble into one call.
///
/// Never fails: refused requests come back as `rejected` results and strategy
/// failures as `error` results.
#[derive(Debug, Clone)]
pub struct ForecastOrchestrator {
    config: EngineConfig,
    gate: SeriesQualityGate,
    analyzer: PatternAnalyzer,
    combiner: EnsembleCombiner,
    cache: Arc<ModelCache>,
}

impl Default for ForecastOrchestrator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ForecastOrchestrator {
    /// Orchestrator with its own model cache.
    pub fn new(config: EngineConfig) -> Self {
        let cache = Arc::new(ModelCache::new(config.clone()));
        Self::with_cache(config, cache)
    }

    /// Orchestrator sharing an existing model cache.
    pub fn with_cache(config: EngineConfig, cache: Arc<ModelCache>) -> Self {
        Self {
            config,
            gate: SeriesQualityGate::new(),
            analyzer: PatternAnalyzer::new(),
            combiner: EnsembleCombiner::new(),
            cache,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Full pattern report for a series (not used for strategy selection).
    pub fn analyze_patterns(&self, values: &[f64]) -> PatternReport {
        self.analyzer.analyze(values)
    }

    /// Strategy `predict` would run for this series and options.
    pub fn select(&self, series: &TimeSeries, options: &ForecastOptions) -> Strategy {
        let seasonal = detect_seasonality(series.values(), &self.config);
        select_strategy(series.len(), seasonal, options.latency_preference)
    }

    pub async fn predict(&self, values: &[f64], options: &ForecastOptions) -> ForecastResult {
        let series = match self.admit(values, options) {
            Ok(series) => series,
            Err(rejected) => return rejected,
        };

        let seasonal = detect_seasonality(series.values(), &self.config);
        let strategy = select_strategy(series.len(), seasonal, options.latency_preference);

        tracing::debug!(
            strategy = strategy.as_str(),
            series_len = series.len(),
            seasonal,
            latency = ?options.latency_preference,
            horizon = options.horizon,
            "strategy selected"
        );

        self.run(strategy, &series, options)
            .await
            .with_meta("seasonality_detected", json!(seasonal))
    }

    /// Run a given strategy, bypassing selection.
    pub async fn predict_with(
        &self,
        values: &[f64],
        options: &ForecastOptions,
        strategy: Strategy,
    ) -> ForecastResult {
        match self.admit(values, options) {
            Ok(series) => self.run(strategy, &series, options).await,
            Err(rejected) => rejected,
        }
    }

    /// Run a strategy named by a wire tag. Unrecognized tags fall back to
    /// linear regression, labelled `fallback-linear`.
    pub async fn predict_with_tag(
        &self,
        values: &[f64],
        options: &ForecastOptions,
        tag: &str,
    ) -> ForecastResult {
        match tag.parse::<Strategy>() {
            Ok(strategy) => self.predict_with(values, options, strategy).await,
            Err(err) => {
                tracing::warn!(tag, error = %err, "unrecognized strategy tag, using linear fallback");
                let series = match self.admit(values, options) {
                    Ok(series) => series,
                    Err(rejected) => return rejected,
                };
                let mut result = self.run(Strategy::Linear, &series, options).await;
                if result.is_success() {
                    result.strategy = StrategyTag::FallbackLinear;
                    result = result.with_meta("requested_strategy", json!(tag));
                }
                result
            }
        }
    }

    /// Options with the configured default horizon.
    pub fn default_options(&self) -> ForecastOptions {
        ForecastOptions::default().with_horizon(self.config.default_horizon)
    }

    fn check_horizon(&self, options: &ForecastOptions) -> Result<(), ForecastError> {
        options.validate()?;
        if options.horizon > self.config.max_horizon {
            return Err(ForecastError::InvalidOptions(format!(
                "horizon {} exceeds the maximum of {}",
                options.horizon, self.config.max_horizon
            )));
        }
        Ok(())
    }

    fn admit(&self, values: &[f64], options: &ForecastOptions) -> Result<TimeSeries, ForecastResult> {
        let admitted = self.check_horizon(options).and_then(|()| self.gate.check(values));
        admitted.map_err(|err| {
            tracing::warn!(
                reason = err.code(),
                series_len = values.len(),
                horizon = options.horizon,
                "forecast request rejected"
            );
            ForecastResult::rejected(&err, options.horizon)
        })
    }

    async fn run(
        &self,
        strategy: Strategy,
        series: &TimeSeries,
        options: &ForecastOptions,
    ) -> ForecastResult {
        match self.execute(strategy, series, options).await {
            Ok(out) => {
                debug_assert_eq!(out.predictions.len(), options.horizon);
                ForecastResult::new(out.predictions, out.confidence, strategy.tag())
                    .with_metadata(out.metadata)
            }
            Err(err) => {
                tracing::error!(
                    strategy = strategy.as_str(),
                    reason = err.code(),
                    error = %err,
                    "forecast failed"
                );
                ForecastResult::error(&err, options.horizon)
                    .with_meta("attempted_strategy", json!(strategy.as_str()))
            }
        }
    }

    async fn execute(
        &self,
        strategy: Strategy,
        series: &TimeSeries,
        options: &ForecastOptions,
    ) -> Result<StrategyOutput, ForecastError> {
        let horizon = options.horizon;
        match strategy {
            Strategy::Linear => LinearRegression.forecast(series, horizon),
            Strategy::Smoothing => ExponentialSmoothing::default().forecast(series, horizon),
            Strategy::SequenceModel => {
                let handle = self
                    .cache
                    .ensure_trained(ModelKind::SequenceModel, &options.model_key, series)
                    .await?;
                self.trained_forecast(&handle, series, horizon)
            }
            Strategy::NeuralNet => {
                let handle = self
                    .cache
                    .ensure_trained(ModelKind::NeuralNet, &options.model_key, series)
                    .await?;
                self.trained_forecast(&handle, series, horizon)
            }
            Strategy::Ensemble => self.ensemble(series, options).await,
        }
    }

    fn trained_forecast(
        &self,
        handle: &ModelHandle,
        series: &TimeSeries,
        horizon: usize,
    ) -> Result<StrategyOutput, ForecastError> {
        let window = self.config.recent_window;
        let mut out = match handle.kind() {
            ModelKind::SequenceModel => SequenceModelForecaster::new(handle, window).forecast(series, horizon)?,
            ModelKind::NeuralNet => NeuralNetForecaster::new(handle, window).forecast(series, horizon)?,
        };
        if let Some(map) = out.metadata.as_object_mut() {
            map.insert("training".to_string(), json!(handle.report()));
        }
        Ok(out)
    }

    /// Linear, smoothing and sequence model, averaged per step. A failing
    /// sequence model is excluded rather than failing the request.
    async fn ensemble(
        &self,
        series: &TimeSeries,
        options: &ForecastOptions,
    ) -> Result<StrategyOutput, ForecastError> {
        let horizon = options.horizon;

        let sequence = match self
            .cache
            .ensure_trained(ModelKind::SequenceModel, &options.model_key, series)
            .await
        {
            Ok(handle) => self.trained_forecast(&handle, series, horizon),
            Err(err) => Err(err),
        };

        if self.config.warm_neural_net_for_ensemble {
            if let Err(err) = self
                .cache
                .ensure_trained(ModelKind::NeuralNet, &options.model_key, series)
                .await
            {
                tracing::warn!(reason = err.code(), error = %err, "neural net warm-up failed");
            }
        }

        let members = vec![
            (Strategy::Linear, LinearRegression.forecast(series, horizon)),
            (
                Strategy::Smoothing,
                ExponentialSmoothing::default().forecast(series, horizon),
            ),
            (Strategy::SequenceModel, sequence),
        ];

        self.combiner.combine(members, horizon)
    }
}
