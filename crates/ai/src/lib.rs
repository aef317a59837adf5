//! `mia-ai`
//!
//! **Responsibility:** forecasting orchestration and realtime stream analytics.
//!
//! - [`ForecastOrchestrator`] gates a series, picks a strategy, trains or reuses
//!   cached models and always answers with a [`ForecastResult`].
//! - [`StreamAnalytics`] buffers live streams and computes batch analytics on a
//!   fixed interval.
//! - [`PatternAnalyzer`] reports trend, seasonality, cycles and outliers.

pub mod config;
pub mod ensemble;
pub mod model_cache;
pub mod options;
pub mod orchestrator;
pub mod pattern;
pub mod quality;
pub mod result;
pub mod selector;
pub mod strategy;
pub mod stream;

pub use config::{EngineConfig, NeuralNetConfig, SequenceModelConfig, StreamAnalyticsConfig};
pub use ensemble::EnsembleCombiner;
pub use model_cache::{CacheStats, ModelCache, ModelHandle, ModelInfo, ModelKind, TrainingReport};
pub use options::{DEFAULT_HORIZON, ForecastOptions, LatencyPreference};
pub use orchestrator::ForecastOrchestrator;
pub use pattern::{PatternAnalyzer, PatternReport, TrendDirection};
pub use quality::SeriesQualityGate;
pub use result::{ForecastError, ForecastResult, StrategyTag};
pub use selector::{Strategy, detect_seasonality, select_strategy};
pub use stream::{
    AnalyticsTag, BatchAnalytics, BatchResult, RealtimeMetrics, RealtimeSignals, StreamAnalytics,
    StreamConfig, StreamState, StreamStatus,
};
