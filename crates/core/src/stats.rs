//! Descriptive statistics over `f64` slices.
//!
//! All helpers are total: degenerate inputs (empty slices, zero variance)
//! produce `0.0` or `None` instead of NaN, so callers can clamp results
//! without re-checking.

/// Arithmetic mean; `0.0` for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

/// Population variance (divides by `n`).
pub fn variance(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter()
        .map(|x| {
            let d = x - m;
            d * d
        })
        .sum::<f64>()
        / (xs.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(xs: &[f64]) -> f64 {
    variance(xs).sqrt()
}

/// `std_dev / mean`; `0.0` when the mean is zero.
pub fn coefficient_of_variation(xs: &[f64]) -> f64 {
    let m = mean(xs);
    if m == 0.0 {
        return 0.0;
    }
    std_dev(xs) / m
}

/// Minimum and maximum, or `None` for an empty slice.
pub fn min_max(xs: &[f64]) -> Option<(f64, f64)> {
    let first = *xs.first()?;
    Some(
        xs.iter()
            .fold((first, first), |(lo, hi), &x| (lo.min(x), hi.max(x))),
    )
}

/// Ordinary least-squares fit of `value = slope * index + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination. `0.0` when the input has no variance.
    pub r_squared: f64,
}

impl Regression {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fit a line through `(index, value)` pairs. Needs at least two points.
pub fn linear_regression(ys: &[f64]) -> Option<Regression> {
    let n = ys.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = mean(ys);

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let fitted = slope * i as f64 + intercept;
        ss_res += (y - fitted).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }
    let r_squared = if ss_tot == 0.0 {
        0.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    Some(Regression {
        slope,
        intercept,
        r_squared,
    })
}

/// Lag autocorrelation: `Σ(xᵢ-μ)(xᵢ₊lag-μ) / Σ(xᵢ-μ)²`.
///
/// Returns `0.0` when `lag >= len` or the series has zero variance.
pub fn autocorrelation(xs: &[f64], lag: usize) -> f64 {
    if lag >= xs.len() {
        return 0.0;
    }
    let m = mean(xs);
    let denominator: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    if denominator == 0.0 {
        return 0.0;
    }
    let numerator: f64 = xs
        .iter()
        .zip(&xs[lag..])
        .map(|(a, b)| (a - m) * (b - m))
        .sum();
    numerator / denominator
}

/// Normalized correlation between `xs[i]` and `xs[i + lag]`, both centred on
/// the full-series mean: `Σaᵢbᵢ / √(Σaᵢ² · Σbᵢ²)`.
///
/// Zero sums of squares are treated as `1.0` so the result stays finite.
pub fn lagged_correlation(xs: &[f64], lag: usize) -> f64 {
    if lag >= xs.len() {
        return 0.0;
    }
    let m = mean(xs);
    let (mut num, mut den_a, mut den_b) = (0.0, 0.0, 0.0);
    for (a, b) in xs.iter().zip(&xs[lag..]) {
        let a = a - m;
        let b = b - m;
        num += a * b;
        den_a += a * a;
        den_b += b * b;
    }
    let den_a = if den_a == 0.0 { 1.0 } else { den_a };
    let den_b = if den_b == 0.0 { 1.0 } else { den_b };
    num / (den_a * den_b).sqrt()
}

/// Relative change between the mean of the first half and the mean of the
/// second half (`(second - first) / first`).
///
/// `0.0` for fewer than two values or a zero first-half mean.
pub fn half_split_change(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let (first, second) = xs.split_at(xs.len() / 2);
    let first_mean = mean(first);
    if first_mean == 0.0 {
        return 0.0;
    }
    (mean(second) - first_mean) / first_mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn mean_and_population_variance() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(approx(mean(&xs), 5.0));
        assert!(approx(variance(&xs), 4.0));
        assert!(approx(std_dev(&xs), 2.0));
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn regression_recovers_exact_line() {
        let ys: Vec<f64> = (0..10).map(|i| 3.0 * i as f64 + 1.5).collect();
        let fit = linear_regression(&ys).unwrap();
        assert!(approx(fit.slope, 3.0));
        assert!(approx(fit.intercept, 1.5));
        assert!(approx(fit.r_squared, 1.0));
        assert!(approx(fit.predict(10.0), 31.5));
    }

    #[test]
    fn regression_on_constant_has_zero_r_squared() {
        let fit = linear_regression(&[5.0, 5.0, 5.0]).unwrap();
        assert!(approx(fit.slope, 0.0));
        assert_eq!(fit.r_squared, 0.0);
        assert!(linear_regression(&[1.0]).is_none());
    }

    #[test]
    fn autocorrelation_of_periodic_signal_peaks_at_period() {
        let xs: Vec<f64> = (0..48).map(|i| [1.0, 5.0, 9.0, 5.0][i % 4]).collect();
        assert!(autocorrelation(&xs, 4) > 0.8);
        assert!(autocorrelation(&xs, 2) < 0.0);
        assert_eq!(autocorrelation(&xs, 48), 0.0);
        assert_eq!(autocorrelation(&[3.0, 3.0, 3.0], 1), 0.0);
    }

    #[test]
    fn lagged_correlation_detects_weekly_repeat() {
        let xs: Vec<f64> = (0..28)
            .map(|i| [10.0, 12.0, 15.0, 30.0, 14.0, 11.0, 9.0][i % 7])
            .collect();
        assert!(lagged_correlation(&xs, 7) > 0.99);
    }

    #[test]
    fn half_split_change_handles_degenerate_input() {
        assert_eq!(half_split_change(&[1.0]), 0.0);
        assert_eq!(half_split_change(&[0.0, 0.0, 5.0, 5.0]), 0.0);
        assert!(approx(half_split_change(&[10.0, 10.0, 11.0, 11.0]), 0.1));
    }

    #[test]
    fn min_max_and_cv() {
        assert_eq!(min_max(&[3.0, -1.0, 8.0]), Some((-1.0, 8.0)));
        assert_eq!(min_max(&[]), None);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), 0.0);
    }

    proptest! {
        #[test]
        fn autocorrelation_is_bounded(
            xs in prop::collection::vec(-1_000.0f64..1_000.0, 3..64),
            lag in 1usize..16,
        ) {
            let r = autocorrelation(&xs, lag);
            prop_assert!(r.is_finite());
            prop_assert!(r <= 1.0 + 1e-9 && r >= -1.0 - 1e-9);
        }

        #[test]
        fn r_squared_is_a_fraction(xs in prop::collection::vec(-1_000.0f64..1_000.0, 2..64)) {
            let fit = linear_regression(&xs).unwrap();
            prop_assert!((0.0..=1.0).contains(&fit.r_squared));
        }
    }
}
