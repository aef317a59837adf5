//! Engine configuration.
//!
//! Every knob has a default matching the documented behaviour; `from_env`
//! overrides individual values from `MIA_FORECAST_*` variables.

use core::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

/// Sequence model (recurrent regressor) hyper-parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceModelConfig {
    /// Trailing points used as input for one next-step inference.
    pub lookback: usize,
    pub hidden_units: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub min_training_points: usize,
    /// Weight initialization seed (training is deterministic per seed).
    pub seed: u64,
}

impl Default for SequenceModelConfig {
    fn default() -> Self {
        Self {
            lookback: 10,
            hidden_units: 12,
            epochs: 40,
            learning_rate: 0.05,
            min_training_points: 10,
            seed: 0x5EED_0001,
        }
    }
}

/// Feed-forward neural net hyper-parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NeuralNetConfig {
    pub lookback: usize,
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub max_iterations: usize,
    /// Training stops early once the epoch mean squared error drops below this.
    pub error_threshold: f64,
    pub min_training_points: usize,
    pub seed: u64,
}

impl Default for NeuralNetConfig {
    fn default() -> Self {
        Self {
            lookback: 5,
            hidden_layers: vec![10, 5],
            learning_rate: 0.3,
            max_iterations: 1000,
            error_threshold: 0.005,
            min_training_points: 10,
            seed: 0x5EED_0002,
        }
    }
}

/// Forecast orchestration configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Horizon of options built by `ForecastOrchestrator::default_options`.
    pub default_horizon: usize,
    /// Requests asking for more steps are rejected.
    pub max_horizon: usize,
    /// Trained strategies predict over this many most-recent points.
    pub recent_window: usize,
    pub seasonality_lag: usize,
    pub seasonality_threshold: f64,
    /// Shorter series are never considered seasonal.
    pub seasonality_min_length: usize,
    /// Upper bound on a single model training run.
    pub training_deadline: Duration,
    /// Also train the neural net when the ensemble path is selected.
    pub warm_neural_net_for_ensemble: bool,
    pub sequence: SequenceModelConfig,
    pub neural: NeuralNetConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_horizon: crate::options::DEFAULT_HORIZON,
            max_horizon: 10_000,
            recent_window: 50,
            seasonality_lag: 7,
            seasonality_threshold: 0.6,
            seasonality_min_length: 12,
            training_deadline: Duration::from_secs(30),
            warm_neural_net_for_ensemble: true,
            sequence: SequenceModelConfig::default(),
            neural: NeuralNetConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_training_deadline(mut self, deadline: Duration) -> Self {
        self.training_deadline = deadline;
        self
    }

    pub fn with_default_horizon(mut self, horizon: usize) -> Self {
        self.default_horizon = horizon;
        self
    }

    pub fn with_max_horizon(mut self, horizon: usize) -> Self {
        self.max_horizon = horizon;
        self
    }

    pub fn with_recent_window(mut self, window: usize) -> Self {
        self.recent_window = window;
        self
    }

    pub fn with_sequence(mut self, sequence: SequenceModelConfig) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_neural(mut self, neural: NeuralNetConfig) -> Self {
        self.neural = neural;
        self
    }

    pub fn with_warm_neural_net(mut self, warm: bool) -> Self {
        self.warm_neural_net_for_ensemble = warm;
        self
    }

    /// Seed both trained models.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.sequence.seed = seed;
        self.neural.seed = seed.wrapping_add(1);
        self
    }

    /// Load overrides from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load overrides through an arbitrary key lookup (tests, config maps).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = parse_var::<usize, _>(&lookup, "MIA_FORECAST_DEFAULT_HORIZON")? {
            cfg.default_horizon = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MIA_FORECAST_MAX_HORIZON")? {
            cfg.max_horizon = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MIA_FORECAST_RECENT_WINDOW")? {
            cfg.recent_window = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "MIA_FORECAST_TRAINING_DEADLINE_MS")? {
            cfg.training_deadline = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<bool, _>(&lookup, "MIA_FORECAST_WARM_NEURAL_NET")? {
            cfg.warm_neural_net_for_ensemble = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "MIA_FORECAST_SEED")? {
            cfg = cfg.with_seed(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MIA_FORECAST_SEQUENCE_EPOCHS")? {
            cfg.sequence.epochs = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MIA_FORECAST_NEURAL_ITERATIONS")? {
            cfg.neural.max_iterations = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_horizon == 0 {
            bail!("default_horizon must be positive");
        }
        if self.default_horizon > self.max_horizon {
            bail!(
                "default_horizon ({}) exceeds max_horizon ({})",
                self.default_horizon,
                self.max_horizon
            );
        }
        if self.recent_window < self.sequence.lookback {
            bail!(
                "recent_window ({}) must cover the sequence lookback ({})",
                self.recent_window,
                self.sequence.lookback
            );
        }
        if self.sequence.lookback == 0 || self.neural.lookback == 0 {
            bail!("lookback windows must be positive");
        }
        if self.training_deadline.is_zero() {
            bail!("training_deadline must be positive");
        }
        Ok(())
    }
}

/// Stream analytics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamAnalyticsConfig {
    /// Period of the global batch scheduler.
    pub batch_interval: Duration,
    /// Buffer capacity of streams initialized with default settings.
    pub default_buffer_size: usize,
    /// Most recent points considered by one batch.
    pub batch_size: usize,
    /// Points preceding a new value that its realtime anomaly check uses.
    pub realtime_anomaly_window: usize,
    /// Points compared by the realtime trend-change check (two halves).
    pub realtime_trend_window: usize,
    pub anomaly_sigma: f64,
    pub forecast_steps: usize,
    pub seasonal_period: usize,
    /// Buffered batch results per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for StreamAnalyticsConfig {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_secs(2),
            default_buffer_size: 1000,
            batch_size: 100,
            realtime_anomaly_window: 5,
            realtime_trend_window: 10,
            anomaly_sigma: 2.0,
            forecast_steps: 7,
            seasonal_period: 12,
            event_capacity: 64,
        }
    }
}

impl StreamAnalyticsConfig {
    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = parse_var::<u64, _>(&lookup, "MIA_STREAM_BATCH_INTERVAL_MS")? {
            cfg.batch_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MIA_STREAM_BUFFER_SIZE")? {
            cfg.default_buffer_size = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MIA_STREAM_BATCH_SIZE")? {
            cfg.batch_size = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MIA_STREAM_FORECAST_STEPS")? {
            cfg.forecast_steps = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MIA_STREAM_EVENT_CAPACITY")? {
            cfg.event_capacity = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_interval.is_zero() {
            bail!("batch_interval must be positive");
        }
        if self.default_buffer_size == 0 || self.batch_size == 0 {
            bail!("buffer and batch sizes must be positive");
        }
        if self.realtime_trend_window < 2 || self.realtime_anomaly_window == 0 {
            bail!("realtime windows are too small");
        }
        if self.seasonal_period == 0 {
            bail!("seasonal_period must be positive");
        }
        if self.event_capacity == 0 {
            bail!("event_capacity must be positive");
        }
        Ok(())
    }
}

/// Read and parse one optional variable, naming it in the error.
pub(crate) fn parse_var<T, F>(lookup: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.sequence.lookback, 10);
        assert_eq!(cfg.neural.lookback, 5);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("MIA_FORECAST_TRAINING_DEADLINE_MS", "250"),
            ("MIA_FORECAST_SEED", "99"),
            ("MIA_FORECAST_WARM_NEURAL_NET", "false"),
        ]))
        .unwrap();
        assert_eq!(cfg.training_deadline, Duration::from_millis(250));
        assert_eq!(cfg.sequence.seed, 99);
        assert_eq!(cfg.neural.seed, 100);
        assert!(!cfg.warm_neural_net_for_ensemble);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = EngineConfig::from_lookup(lookup(&[("MIA_FORECAST_RECENT_WINDOW", "lots")]))
            .unwrap_err();
        assert!(format!("{err:#}").contains("MIA_FORECAST_RECENT_WINDOW"));

        let err = EngineConfig::from_lookup(lookup(&[("MIA_FORECAST_RECENT_WINDOW", "3")]))
            .unwrap_err();
        assert!(err.to_string().contains("lookback"));
    }

    #[test]
    fn horizon_bounds_are_checked() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("MIA_FORECAST_DEFAULT_HORIZON", "14"),
            ("MIA_FORECAST_MAX_HORIZON", "30"),
        ]))
        .unwrap();
        assert_eq!(cfg.default_horizon, 14);
        assert_eq!(cfg.max_horizon, 30);

        let err = EngineConfig::from_lookup(lookup(&[("MIA_FORECAST_MAX_HORIZON", "3")])).unwrap_err();
        assert!(err.to_string().contains("max_horizon"));
    }

    #[test]
    fn stream_config_overrides() {
        let cfg = StreamAnalyticsConfig::from_lookup(lookup(&[
            ("MIA_STREAM_BATCH_INTERVAL_MS", "500"),
            ("MIA_STREAM_BATCH_SIZE", "20"),
        ]))
        .unwrap();
        assert_eq!(cfg.batch_interval, Duration::from_millis(500));
        assert_eq!(cfg.batch_size, 20);
        assert_eq!(cfg.default_buffer_size, 1000);

        assert!(StreamAnalyticsConfig::from_lookup(lookup(&[("MIA_STREAM_BATCH_SIZE", "0")])).is_err());
    }
}
