//! Series value objects.
//!
//! A [`TimeSeries`] is an ordered run of observations with no gaps assumed;
//! insertion order is significant. A [`DataPoint`] is one timestamped
//! observation as delivered to a realtime stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by value: two series holding the
/// same observations are the same series.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Ordered numeric observations, all finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct TimeSeries {
    values: Vec<f64>,
}

impl ValueObject for TimeSeries {}

impl TimeSeries {
    /// Build a series, rejecting NaN and infinities.
    pub fn new(values: Vec<f64>) -> CoreResult<Self> {
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(CoreError::NonFiniteValue { index });
        }
        Ok(Self { values })
    }

    pub fn from_slice(values: &[f64]) -> CoreResult<Self> {
        Self::new(values.to_vec())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// The most recent `n` observations (the whole series if shorter).
    pub fn tail(&self, n: usize) -> &[f64] {
        let start = self.values.len().saturating_sub(n);
        &self.values[start..]
    }

    /// True when every observation equals the first one (zero variance).
    ///
    /// An empty series is not considered constant.
    pub fn is_constant(&self) -> bool {
        match self.values.split_first() {
            Some((first, rest)) => rest.iter().all(|v| v == first),
            None => false,
        }
    }
}

impl TryFrom<Vec<f64>> for TimeSeries {
    type Error = CoreError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<TimeSeries> for Vec<f64> {
    fn from(series: TimeSeries) -> Self {
        series.values
    }
}

impl AsRef<[f64]> for TimeSeries {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

/// One timestamped observation pushed into a realtime stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl ValueObject for DataPoint {}

impl DataPoint {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }

    /// Observation stamped with the current wall clock.
    pub fn now(value: f64) -> Self {
        Self::new(value, Utc::now())
    }
}
