//! Simple Moving Average (SMA) and the rolling-window helpers shared with
//! Bollinger Bands and volatility.
//!
//! A window containing a NaN yields NaN. Lookback: period - 1.

use super::Indicator;
use crate::domain::{closes, Bar};

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        rolling_mean(&closes(bars), self.period)
    }
}

/// Trailing mean over `period` values.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, |window| {
        window.iter().sum::<f64>() / window.len() as f64
    })
}

/// Trailing standard deviation with `ddof` delta degrees of freedom
/// (0 = population, 1 = sample).
pub fn rolling_std(values: &[f64], period: usize, ddof: usize) -> Vec<f64> {
    rolling(values, period, |window| {
        let n = window.len();
        if n <= ddof {
            return f64::NAN;
        }
        let mean = window.iter().sum::<f64>() / n as f64;
        let ss: f64 = window.iter().map(|v| (v - mean) * (v - mean)).sum();
        (ss / (n - ddof) as f64).sqrt()
    })
}

fn rolling(values: &[f64], period: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = f(window);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn sma_5_basic() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let result = Sma::new(5).compute(&bars);

        assert_eq!(result.len(), 7);
        assert!(result[..4].iter().all(|v| v.is_nan()));
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[5], 13.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_nan_window_is_nan() {
        let mut bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        bars[2].close = f64::NAN;
        let result = Sma::new(3).compute(&bars);
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
        assert_approx(result[5], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_too_few_bars() {
        let result = Sma::new(5).compute(&make_bars(&[10.0, 11.0]));
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rolling_std_population_and_sample() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let pop = rolling_std(&values, 8, 0);
        assert_approx(pop[7], 2.0, DEFAULT_EPSILON);
        let sample = rolling_std(&values, 8, 1);
        assert_approx(sample[7], (32.0f64 / 7.0).sqrt(), DEFAULT_EPSILON);
    }

    #[test]
    fn sma_name_and_lookback() {
        let sma = Sma::new(50);
        assert_eq!(sma.name(), "sma_50");
        assert_eq!(sma.lookback(), 49);
    }
}
