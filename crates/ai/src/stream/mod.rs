//! Realtime stream analytics.
//!
//! Streams buffer recent points, optionally run cheap checks on every new
//! point, and get their configured analytics recomputed in periodic batches.

pub mod analytics;
pub mod buffer;
pub mod processor;
mod scheduler;

pub use analytics::{
    AnalyticsTag, BatchAnalytics, NextValuePrediction, Optimization, RealtimeAnomaly,
    RealtimeSignals, Recommendation, SeasonalDecomposition, ShortForecast, Significance,
    TrendChange,
};
pub use buffer::StreamBuffer;
pub use processor::{
    BatchResult, RealtimeMetrics, StreamAnalytics, StreamConfig, StreamState, StreamStatus,
};
