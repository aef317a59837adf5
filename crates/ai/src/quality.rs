use mia_core::TimeSeries;

use crate::result::ForecastError;

/// Fewest points any forecast is attempted on.
pub const MIN_SERIES_LEN: usize = 3;

/// Admission check run before any strategy sees a series.
///
/// Checks run in a fixed order: length, finiteness, variance. The first
/// failing check decides the rejection reason.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesQualityGate;

impl SeriesQualityGate {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, values: &[f64]) -> Result<TimeSeries, ForecastError> {
        if values.len() < MIN_SERIES_LEN {
            return Err(ForecastError::insufficient(MIN_SERIES_LEN, values.len()));
        }

        let series = TimeSeries::from_slice(values)?;

        if series.is_constant() {
            return Err(ForecastError::ConstantSeries);
        }

        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_series_is_insufficient() {
        let gate = SeriesQualityGate::new();
        for len in 0..MIN_SERIES_LEN {
            let values = vec![1.0; len];
            let err = gate.check(&values).unwrap_err();
            assert_eq!(err, ForecastError::insufficient(3, len));
        }
    }

    #[test]
    fn length_check_wins_over_constant_check() {
        let err = SeriesQualityGate::new().check(&[5.0, 5.0]).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_DATA");
    }

    #[test]
    fn constant_series_is_rejected() {
        let err = SeriesQualityGate::new().check(&[4.2; 9]).unwrap_err();
        assert_eq!(err, ForecastError::ConstantSeries);
    }

    #[test]
    fn non_finite_values_report_their_index() {
        let err = SeriesQualityGate::new()
            .check(&[1.0, 2.0, f64::NAN, 4.0])
            .unwrap_err();
        assert_eq!(err, ForecastError::NonFiniteValue { index: 2 });
    }

    #[test]
    fn varied_series_passes() {
        let series = SeriesQualityGate::new().check(&[1.0, 2.0, 1.5]).unwrap();
        assert_eq!(series.len(), 3);
    }
}
