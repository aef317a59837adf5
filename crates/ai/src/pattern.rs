//! Pattern recognition over a single series.
//!
//! Four independent analyses (trend, seasonal, cyclical, irregular). Each one
//! has its own minimum length and degrades to a zero-confidence report when
//! the series is too short for it, so [`PatternAnalyzer::analyze`] never fails.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use mia_core::stats;

use crate::result::ForecastError;

/// Slopes with a smaller magnitude count as flat.
pub const TREND_SLOPE_THRESHOLD: f64 = 0.1;
pub const DEFAULT_SEASONAL_PERIOD: usize = 12;
/// Relative change between half means that counts as a direction.
pub const HALF_SPLIT_THRESHOLD: f64 = 0.05;

const TREND_MIN_POINTS: usize = 3;
const CYCLICAL_MIN_POINTS: usize = 20;
const CYCLICAL_MIN_AUTOCORRELATION: f64 = 0.3;
const IRREGULAR_MIN_POINTS: usize = 5;
const ANOMALY_SIGMA: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    /// Not enough data to tell.
    Unknown,
}

impl TrendDirection {
    pub fn from_slope(slope: f64) -> Self {
        Self::from_change(slope, TREND_SLOPE_THRESHOLD)
    }

    /// Classify a signed change against a symmetric threshold.
    pub fn from_change(change: f64, threshold: f64) -> Self {
        if change > threshold {
            TrendDirection::Increasing
        } else if change < -threshold {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
            TrendDirection::Unknown => "unknown",
        }
    }
}

impl FromStr for TrendDirection {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increasing" => Ok(TrendDirection::Increasing),
            "decreasing" => Ok(TrendDirection::Decreasing),
            "stable" => Ok(TrendDirection::Stable),
            "unknown" => Ok(TrendDirection::Unknown),
            other => Err(ForecastError::InvalidOptions(format!(
                "unknown trend direction: {other}"
            ))),
        }
    }
}

/// Direction of a short run, comparing the means of its two halves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HalfSplitTrend {
    pub direction: TrendDirection,
    /// Relative change between halves, in percent.
    pub change_pct: f64,
    pub strength: f64,
}

/// `Unknown` for fewer than two values.
pub fn half_split_trend(values: &[f64]) -> HalfSplitTrend {
    if values.len() < 2 {
        return HalfSplitTrend {
            direction: TrendDirection::Unknown,
            change_pct: 0.0,
            strength: 0.0,
        };
    }
    let change = stats::half_split_change(values);
    HalfSplitTrend {
        direction: TrendDirection::from_change(change, HALF_SPLIT_THRESHOLD),
        change_pct: change * 100.0,
        strength: change.abs(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub direction: TrendDirection,
    pub strength: f64,
    pub confidence: f64,
    pub slope: f64,
    pub r_squared: f64,
}

impl TrendReport {
    fn unknown() -> Self {
        Self {
            direction: TrendDirection::Unknown,
            strength: 0.0,
            confidence: 0.0,
            slope: 0.0,
            r_squared: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalReport {
    pub strength: f64,
    /// `None` when the series is shorter than two full periods.
    pub period: Option<usize>,
    pub confidence: f64,
    /// Mean value of each position within the period.
    pub components: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub period: usize,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclicalReport {
    pub strength: f64,
    /// Candidate periods sorted by descending autocorrelation.
    pub detected_periods: Vec<Cycle>,
    pub confidence: f64,
}

impl CyclicalReport {
    pub fn dominant(&self) -> Option<&Cycle> {
        self.detected_periods.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub index: usize,
    pub value: f64,
    pub deviation: f64,
    /// `min(1, deviation / 3σ)`.
    pub severity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrregularReport {
    pub anomalies: Vec<Anomaly>,
    /// Anomaly count divided by series length.
    pub score: f64,
    pub confidence: f64,
}

impl IrregularReport {
    pub fn anomaly_indices(&self) -> Vec<usize> {
        self.anomalies.iter().map(|a| a.index).collect()
    }
}

/// Combined output of the four analyses. Derived data, recomputed per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    pub trend: TrendReport,
    pub seasonal: SeasonalReport,
    pub cyclical: CyclicalReport,
    pub irregular: IrregularReport,
    /// Mean of the four analysis confidences.
    pub overall_confidence: f64,
    pub data_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternAnalyzer {
    seasonal_period: usize,
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self {
            seasonal_period: DEFAULT_SEASONAL_PERIOD,
        }
    }
}

impl PatternAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero period is bumped to 1.
    pub fn with_seasonal_period(mut self, period: usize) -> Self {
        self.seasonal_period = period.max(1);
        self
    }

    pub fn seasonal_period(&self) -> usize {
        self.seasonal_period
    }

    pub fn analyze(&self, values: &[f64]) -> PatternReport {
        let trend = self.trend(values);
        let seasonal = self.seasonal(values);
        let cyclical = self.cyclical(values);
        let irregular = self.irregular(values);

        let overall_confidence = stats::mean(&[
            trend.confidence,
            seasonal.confidence,
            cyclical.confidence,
            irregular.confidence,
        ]);

        PatternReport {
            trend,
            seasonal,
            cyclical,
            irregular,
            overall_confidence,
            data_length: values.len(),
        }
    }

    pub fn trend(&self, values: &[f64]) -> TrendReport {
        if values.len() < TREND_MIN_POINTS {
            return TrendReport::unknown();
        }
        let Some(fit) = stats::linear_regression(values) else {
            return TrendReport::unknown();
        };

        let strength = trend_strength(fit.slope, values);

        TrendReport {
            direction: TrendDirection::from_slope(fit.slope),
            strength,
            confidence: fit.r_squared.clamp(0.3, 0.95),
            slope: fit.slope,
            r_squared: fit.r_squared,
        }
    }

    pub fn seasonal(&self, values: &[f64]) -> SeasonalReport {
        let period = self.seasonal_period;
        if values.len() < period * 2 {
            return SeasonalReport {
                strength: 0.0,
                period: None,
                confidence: 0.0,
                components: Vec::new(),
            };
        }

        let components = bucket_means(values, period);
        let strength = seasonal_strength(&components);

        SeasonalReport {
            strength,
            period: Some(period),
            confidence: strength.clamp(0.3, 0.9),
            components,
        }
    }

    pub fn cyclical(&self, values: &[f64]) -> CyclicalReport {
        if values.len() < CYCLICAL_MIN_POINTS {
            return CyclicalReport {
                strength: 0.0,
                detected_periods: Vec::new(),
                confidence: 0.0,
            };
        }

        let mut cycles: Vec<Cycle> = (2..=values.len() / 4)
            .filter_map(|period| {
                let strength = stats::autocorrelation(values, period);
                (strength > CYCLICAL_MIN_AUTOCORRELATION).then_some(Cycle { period, strength })
            })
            .collect();
        cycles.sort_by(|a, b| b.strength.total_cmp(&a.strength));

        let strength = cycles.first().map_or(0.0, |c| c.strength);

        CyclicalReport {
            strength,
            detected_periods: cycles,
            confidence: strength.min(0.9),
        }
    }

    pub fn irregular(&self, values: &[f64]) -> IrregularReport {
        if values.len() < IRREGULAR_MIN_POINTS {
            return IrregularReport {
                anomalies: Vec::new(),
                score: 0.0,
                confidence: 0.0,
            };
        }

        let anomalies = sigma_outliers(values, ANOMALY_SIGMA);
        let score = anomalies.len() as f64 / values.len() as f64;

        IrregularReport {
            anomalies,
            score,
            confidence: score.clamp(0.3, 0.9),
        }
    }
}

/// Mean of every index-modulo-`period` bucket.
pub(crate) fn bucket_means(values: &[f64], period: usize) -> Vec<f64> {
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, v) in values.iter().enumerate() {
        sums[i % period] += v;
        counts[i % period] += 1;
    }
    sums.iter()
        .zip(&counts)
        .map(|(s, &c)| if c == 0 { 0.0 } else { s / c as f64 })
        .collect()
}

/// `variance(components) / mean(components)²`, clamped to 1.
fn seasonal_strength(components: &[f64]) -> f64 {
    let m = stats::mean(components);
    if m == 0.0 {
        return 0.0;
    }
    (stats::variance(components) / (m * m)).min(1.0)
}

/// Points further than `sigmas` standard deviations from the mean.
pub(crate) fn sigma_outliers(values: &[f64], sigmas: f64) -> Vec<Anomaly> {
    let m = stats::mean(values);
    let sd = stats::std_dev(values);
    if sd == 0.0 {
        return Vec::new();
    }
    values
        .iter()
        .enumerate()
        .filter_map(|(index, &value)| {
            let deviation = (value - m).abs();
            (deviation > sigmas * sd).then(|| Anomaly {
                index,
                value,
                deviation,
                severity: (deviation / (3.0 * sd)).min(1.0),
            })
        })
        .collect()
}

/// `|slope| / max(series)`, capped at 1. A series whose maximum is not
/// positive falls back to the largest magnitude so the ratio stays
/// non-negative and bounded.
fn trend_strength(slope: f64, values: &[f64]) -> f64 {
    let Some((_, max)) = stats::min_max(values) else {
        return 0.0;
    };
    let scale = if max > 0.0 {
        max
    } else {
        values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    };
    if scale == 0.0 {
        0.0
    } else {
        (slope.abs() / scale).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trend_strength_divides_by_the_series_maximum() {
        // Slope 2 over a maximum of 40.
        let up: Vec<f64> = (0..11).map(|i| 20.0 + 2.0 * i as f64).collect();
        let report = PatternAnalyzer::new().trend(&up);
        assert!((report.strength - 2.0 / 40.0).abs() < 1e-12);

        // Mixed signs: the positive maximum 5 is used, not the magnitude 45.
        let mixed: Vec<f64> = (0..11).map(|i| -45.0 + 5.0 * i as f64).collect();
        let report = PatternAnalyzer::new().trend(&mixed);
        assert!((report.strength - 1.0).abs() < 1e-12);

        // All negative: fall back to the largest magnitude.
        let down: Vec<f64> = (0..5).map(|i| -10.0 - i as f64).collect();
        let report = PatternAnalyzer::new().trend(&down);
        assert!((report.strength - 1.0 / 14.0).abs() < 1e-12);
        assert_eq!(report.direction, TrendDirection::Decreasing);
    }

    fn sine(len: usize, period: f64) -> Vec<f64> {
        (0..len)
            .map(|i| 50.0 + 10.0 * (2.0 * core::f64::consts::PI * i as f64 / period).sin())
            .collect()
    }

    #[test]
    fn increasing_line_has_increasing_trend() {
        let values: Vec<f64> = (0..20).map(|i| 2.0 * i as f64 + 1.0).collect();
        let trend = PatternAnalyzer::new().trend(&values);
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!((trend.slope - 2.0).abs() < 1e-9);
        assert!((trend.confidence - 0.95).abs() < 1e-9);
        assert!(trend.strength > 0.0 && trend.strength <= 1.0);
    }

    #[test]
    fn small_slope_is_stable() {
        let values = [10.0, 10.05, 10.0, 10.1, 10.05];
        assert_eq!(
            PatternAnalyzer::new().trend(&values).direction,
            TrendDirection::Stable
        );
    }

    #[test]
    fn half_split_trend_compares_half_means() {
        let up = half_split_trend(&[10.0, 10.0, 12.0, 12.0]);
        assert_eq!(up.direction, TrendDirection::Increasing);
        assert!((up.change_pct - 20.0).abs() < 1e-9);
        assert_eq!(half_split_trend(&[5.0]).direction, TrendDirection::Unknown);
        assert_eq!(
            half_split_trend(&[10.0, 10.1, 10.2, 10.1]).direction,
            TrendDirection::Stable
        );
        // Odd lengths put the extra value in the second half.
        assert_eq!(
            half_split_trend(&[10.0, 10.0, 5.0, 5.0, 5.0]).direction,
            TrendDirection::Decreasing
        );
    }

    #[test]
    fn short_series_degrade_to_zero_confidence() {
        let report = PatternAnalyzer::new().analyze(&[1.0, 2.0]);
        assert_eq!(report.trend.direction, TrendDirection::Unknown);
        assert_eq!(report.trend.confidence, 0.0);
        assert_eq!(report.seasonal.confidence, 0.0);
        assert_eq!(report.seasonal.period, None);
        assert_eq!(report.cyclical.confidence, 0.0);
        assert_eq!(report.irregular.confidence, 0.0);
        assert_eq!(report.overall_confidence, 0.0);
    }

    #[test]
    fn seasonal_needs_two_periods() {
        let analyzer = PatternAnalyzer::new();
        assert_eq!(analyzer.seasonal(&sine(23, 12.0)).period, None);

        let report = analyzer.seasonal(&sine(24, 12.0));
        assert_eq!(report.period, Some(12));
        assert_eq!(report.components.len(), 12);
        assert!((0.3..=0.9).contains(&report.confidence));
    }

    #[test]
    fn cyclical_finds_the_sine_period() {
        let report = PatternAnalyzer::new().cyclical(&sine(80, 8.0));
        let dominant = report.dominant().expect("a cycle");
        assert_eq!(dominant.period, 8);
        assert!(report.confidence <= 0.9);
        let strengths: Vec<f64> = report.detected_periods.iter().map(|c| c.strength).collect();
        assert!(strengths.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn irregular_flags_the_spike() {
        let mut values = vec![10.0, 11.0, 9.0, 10.0, 10.5, 9.5, 10.0, 10.2, 9.8, 10.0];
        values[6] = 40.0;
        let report = PatternAnalyzer::new().irregular(&values);
        assert_eq!(report.anomaly_indices(), vec![6]);
        assert!((report.score - 0.1).abs() < 1e-12);
        assert_eq!(report.confidence, 0.3);
        assert!(report.anomalies[0].severity <= 1.0);
    }

    #[test]
    fn overall_confidence_is_the_mean() {
        let values = sine(48, 12.0);
        let r = PatternAnalyzer::new().analyze(&values);
        let expected = (r.trend.confidence
            + r.seasonal.confidence
            + r.cyclical.confidence
            + r.irregular.confidence)
            / 4.0;
        assert!((r.overall_confidence - expected).abs() < 1e-12);
        assert_eq!(r.data_length, 48);
    }

    #[test]
    fn report_serializes_snake_case_directions() {
        let r = PatternAnalyzer::new().analyze(&[1.0, 2.0, 3.0, 4.0]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["trend"]["direction"], "increasing");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn confidences_stay_in_unit_interval(values in proptest::collection::vec(-1e3f64..1e3, 0..80)) {
            let r = PatternAnalyzer::new().analyze(&values);
            for c in [r.trend.confidence, r.seasonal.confidence, r.cyclical.confidence, r.irregular.confidence, r.overall_confidence] {
                prop_assert!((0.0..=1.0).contains(&c));
            }
            prop_assert!(r.trend.strength <= 1.0);
            prop_assert!(r.seasonal.strength <= 1.0);
        }
    }
}
