//! Batch and realtime analytics over buffered stream values.
//!
//! Everything here is a pure function of the values passed in; the stream
//! registry decides which analyses run and over which window.

use core::str::FromStr;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use mia_core::stats;

use crate::config::StreamAnalyticsConfig;
use crate::pattern::{Anomaly, HalfSplitTrend, TrendDirection, bucket_means, half_split_trend, sigma_outliers};
use crate::result::ForecastError;

/// Analyses a stream can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsTag {
    Mean,
    Trend,
    Anomaly,
    Volatility,
    Optimization,
    Prediction,
    Seasonal,
    Forecast,
    /// Run the anomaly/trend checks on every new point, not only per batch.
    Realtime,
}

impl AnalyticsTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsTag::Mean => "mean",
            AnalyticsTag::Trend => "trend",
            AnalyticsTag::Anomaly => "anomaly",
            AnalyticsTag::Volatility => "volatility",
            AnalyticsTag::Optimization => "optimization",
            AnalyticsTag::Prediction => "prediction",
            AnalyticsTag::Seasonal => "seasonal",
            AnalyticsTag::Forecast => "forecast",
            AnalyticsTag::Realtime => "realtime",
        }
    }
}

impl FromStr for AnalyticsTag {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(AnalyticsTag::Mean),
            "trend" => Ok(AnalyticsTag::Trend),
            "anomaly" | "anomalies" => Ok(AnalyticsTag::Anomaly),
            "volatility" => Ok(AnalyticsTag::Volatility),
            "optimization" => Ok(AnalyticsTag::Optimization),
            "prediction" => Ok(AnalyticsTag::Prediction),
            "seasonal" => Ok(AnalyticsTag::Seasonal),
            "forecast" => Ok(AnalyticsTag::Forecast),
            "realtime" => Ok(AnalyticsTag::Realtime),
            other => Err(ForecastError::InvalidOptions(format!(
                "unknown analytics tag: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    OptimizationOpportunity,
    Efficient,
}

/// Headroom of a batch relative to its peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Optimization {
    /// `(max - mean) / max`
    pub potential: f64,
    /// `mean / max`
    pub efficiency: f64,
    pub range: f64,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextValuePrediction {
    pub next_value: f64,
    pub confidence: f64,
    pub trend: TrendDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalDecomposition {
    pub strength: f64,
    pub period: usize,
    pub components: Vec<f64>,
    pub significance: Significance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortForecast {
    pub forecast: Vec<f64>,
    pub confidence: f64,
    pub trend: TrendDirection,
}

/// Result of one batch. Only requested analyses are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchAnalytics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<HalfSplitTrend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomalies: Option<Vec<Anomaly>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<Optimization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<NextValuePrediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonal: Option<SeasonalDecomposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ShortForecast>,
}

/// Run every requested analysis over `values`.
///
/// Analyses that need more data than the batch holds are left out.
pub fn compute_batch_analytics(
    tags: &BTreeSet<AnalyticsTag>,
    values: &[f64],
    config: &StreamAnalyticsConfig,
) -> BatchAnalytics {
    let mut out = BatchAnalytics::default();
    if values.is_empty() {
        return out;
    }

    for tag in tags {
        match tag {
            AnalyticsTag::Mean => out.mean = Some(stats::mean(values)),
            AnalyticsTag::Trend => out.trend = Some(half_split_trend(values)),
            AnalyticsTag::Anomaly => out.anomalies = Some(anomalies(values, config.anomaly_sigma)),
            AnalyticsTag::Volatility => out.volatility = Some(volatility(values)),
            AnalyticsTag::Optimization => out.optimization = optimization(values),
            AnalyticsTag::Prediction => out.prediction = next_value(values),
            AnalyticsTag::Seasonal => out.seasonal = seasonal(values, config.seasonal_period),
            AnalyticsTag::Forecast => out.forecast = short_forecast(values, config.forecast_steps),
            AnalyticsTag::Realtime => {}
        }
    }
    out
}

/// Outliers beyond `sigmas` standard deviations; none for fewer than 3 values.
pub fn anomalies(values: &[f64], sigmas: f64) -> Vec<Anomaly> {
    if values.len() < 3 {
        return Vec::new();
    }
    sigma_outliers(values, sigmas)
}

/// Coefficient of variation; `0.0` for fewer than 2 values.
pub fn volatility(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    stats::coefficient_of_variation(values)
}

pub fn optimization(values: &[f64]) -> Option<Optimization> {
    let (min, max) = stats::min_max(values)?;
    let mean = stats::mean(values);
    let (potential, efficiency) = if max == 0.0 {
        (0.0, 0.0)
    } else {
        ((max - mean) / max, mean / max)
    };
    Some(Optimization {
        potential,
        efficiency,
        range: max - min,
        recommendation: if mean < max * 0.8 {
            Recommendation::OptimizationOpportunity
        } else {
            Recommendation::Efficient
        },
    })
}

/// Last value moved by the half-split change; needs 3 values.
pub fn next_value(values: &[f64]) -> Option<NextValuePrediction> {
    if values.len() < 3 {
        return None;
    }
    let trend = half_split_trend(values);
    let last = *values.last()?;
    Some(NextValuePrediction {
        next_value: last * (1.0 + trend.change_pct / 100.0),
        confidence: (1.0 - trend.change_pct.abs() / 100.0).clamp(0.3, 0.9),
        trend: trend.direction,
    })
}

/// Index-modulo-period averages; needs one full period.
pub fn seasonal(values: &[f64], period: usize) -> Option<SeasonalDecomposition> {
    if period == 0 || values.len() < period {
        return None;
    }
    let components = bucket_means(values, period);
    let strength = volatility(&components).abs().min(1.0);
    let significance = if strength > 0.3 {
        Significance::High
    } else if strength > 0.1 {
        Significance::Medium
    } else {
        Significance::Low
    };
    Some(SeasonalDecomposition {
        strength,
        period,
        components,
        significance,
    })
}

/// `steps` values compounding +1 % (increasing), -1 % (decreasing) or 0 %.
pub fn short_forecast(values: &[f64], steps: usize) -> Option<ShortForecast> {
    let prediction = next_value(values)?;
    let rate = match prediction.trend {
        TrendDirection::Increasing => 0.01,
        TrendDirection::Decreasing => -0.01,
        TrendDirection::Stable | TrendDirection::Unknown => 0.0,
    };
    let mut current = *values.last()?;
    let forecast = (0..steps)
        .map(|_| {
            current *= 1.0 + rate;
            current
        })
        .collect();
    Some(ShortForecast {
        forecast,
        confidence: prediction.confidence,
        trend: prediction.trend,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealtimeAnomaly {
    pub value: f64,
    /// Mean of the points preceding `value`.
    pub mean: f64,
    pub deviation: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendChange {
    pub old_direction: TrendDirection,
    pub new_direction: TrendDirection,
    pub strength: f64,
}

/// What the realtime checks found for one new point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSignals {
    pub anomaly: Option<RealtimeAnomaly>,
    pub trend_change: Option<TrendChange>,
}

impl RealtimeSignals {
    pub fn is_empty(&self) -> bool {
        self.anomaly.is_none() && self.trend_change.is_none()
    }
}

/// Compare `value` against the window of points that preceded it.
pub fn realtime_anomaly(previous: &[f64], value: f64, sigmas: f64) -> Option<RealtimeAnomaly> {
    if previous.is_empty() {
        return None;
    }
    let mean = stats::mean(previous);
    let threshold = sigmas * stats::std_dev(previous);
    let deviation = (value - mean).abs();
    (deviation > threshold).then_some(RealtimeAnomaly {
        value,
        mean,
        deviation,
        threshold,
    })
}

/// Compare the half-split trend of the older and newer halves of `recent`.
pub fn trend_change(recent: &[f64]) -> Option<TrendChange> {
    if recent.len() < 4 {
        return None;
    }
    let (old, new) = recent.split_at(recent.len() / 2);
    let old_trend = half_split_trend(old);
    let new_trend = half_split_trend(new);
    (old_trend.direction != new_trend.direction).then_some(TrendChange {
        old_direction: old_trend.direction,
        new_direction: new_trend.direction,
        strength: new_trend.strength,
    })
}
