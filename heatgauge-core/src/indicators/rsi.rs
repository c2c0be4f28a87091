//! Relative Strength Index (RSI).
//!
//! Uses Wilder smoothing of average gains and average losses.
//! Seed: simple mean of the first `period` gains and losses.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Lookback: period.
//! Edge cases: avg_loss == 0 → RSI = 100; avg_gain == 0 → RSI = 0;
//! no movement at all → RSI = 50.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        super::col::RSI
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let period = self.period;
        let mut result = vec![f64::NAN; n];
        if n < period + 1 {
            return result;
        }

        let changes: Vec<f64> = (0..n)
            .map(|i| {
                if i == 0 {
                    f64::NAN
                } else {
                    bars[i].close - bars[i - 1].close
                }
            })
            .collect();

        let seed = &changes[1..=period];
        if seed.iter().any(|c| c.is_nan()) {
            return result;
        }
        let mut avg_gain = seed.iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
        let mut avg_loss = seed.iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;
        result[period] = compute_rsi(avg_gain, avg_loss);

        let alpha = 1.0 / period as f64;
        for i in (period + 1)..n {
            let change = changes[i];
            if change.is_nan() {
                return result;
            }
            avg_gain = alpha * change.max(0.0) + (1.0 - alpha) * avg_gain;
            avg_loss = alpha * (-change).max(0.0) + (1.0 - alpha) * avg_loss;
            result[i] = compute_rsi(avg_gain, avg_loss);
        }
        result
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};

    #[test]
    fn rsi_all_gains() {
        let result = Rsi::new(3).compute(&make_bars(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]));
        assert_approx(result[3], 100.0, 1e-6);
        assert_approx(result[5], 100.0, 1e-6);
    }

    #[test]
    fn rsi_all_losses() {
        let result = Rsi::new(3).compute(&make_bars(&[105.0, 104.0, 103.0, 102.0, 101.0, 100.0]));
        assert_approx(result[3], 0.0, 1e-6);
    }

    #[test]
    fn rsi_flat_is_neutral() {
        let result = Rsi::new(3).compute(&make_bars(&[100.0; 6]));
        assert_approx(result[4], 50.0, 1e-9);
    }

    #[test]
    fn rsi_mixed_seed() {
        // Changes: +0.34, -0.25, -0.48 → RSI = 100 - 100 / (1 + 0.34 / 0.73)
        let result = Rsi::new(3).compute(&make_bars(&[44.0, 44.34, 44.09, 43.61, 44.33]));
        assert!(result[..3].iter().all(|v| v.is_nan()));
        assert_approx(result[3], 100.0 - 100.0 / (1.0 + 0.34 / 0.73), 1e-9);
    }

    #[test]
    fn rsi_wilder_smoothing_after_seed() {
        // Next change +0.72: avg_gain = (2 * 0.34/3 + 0.72) / 3, avg_loss = 2 * 0.73/3 / 3
        let result = Rsi::new(3).compute(&make_bars(&[44.0, 44.34, 44.09, 43.61, 44.33]));
        assert_approx(result[4], 100.0 - 100.0 / (1.0 + 2.84 / 1.46), 1e-9);
    }

    #[test]
    fn rsi_bounds() {
        let bars = make_bars(&[100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0]);
        let result = Rsi::new(3).compute(&bars);
        for (i, &v) in result.iter().enumerate() {
            if !v.is_nan() {
                assert!((0.0..=100.0).contains(&v), "RSI out of bounds at bar {i}: {v}");
            }
        }
    }

    #[test]
    fn rsi_too_short() {
        let result = Rsi::new(14).compute(&make_bars(&[1.0, 2.0, 3.0]));
        assert!(result.iter().all(|v| v.is_nan()));
    }
}
