//! Bollinger Bands: moving average ± multiplier × standard deviation.
//!
//! Four outputs (separate Indicator instances):
//! - Middle: SMA(close, period)
//! - Upper / Lower: middle ± mult × stddev(close, period)
//! - PercentB: (close - lower) / (upper - lower), NaN when the bands collapse
//!
//! Uses population stddev (divide by N).
//! Lookback: period - 1.

use super::sma::{rolling_mean, rolling_std};
use super::Indicator;
use crate::domain::{closes, Bar};

/// Which output of the Bollinger Bands to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Upper,
    Middle,
    Lower,
    PercentB,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64, band: BollingerBand) -> Self {
        Self {
            period: period.max(1),
            multiplier,
            band,
        }
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        match self.band {
            BollingerBand::Upper => super::col::BB_UPPER,
            BollingerBand::Middle => super::col::BB_MIDDLE,
            BollingerBand::Lower => super::col::BB_LOWER,
            BollingerBand::PercentB => super::col::BB_PCT_B,
        }
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let close = closes(bars);
        let middle = rolling_mean(&close, self.period);
        if self.band == BollingerBand::Middle {
            return middle;
        }
        let std = rolling_std(&close, self.period, 0);

        middle
            .iter()
            .zip(&std)
            .zip(&close)
            .map(|((&mid, &sd), &c)| {
                let upper = mid + self.multiplier * sd;
                let lower = mid - self.multiplier * sd;
                match self.band {
                    BollingerBand::Upper => upper,
                    BollingerBand::Lower => lower,
                    BollingerBand::PercentB => {
                        let width = upper - lower;
                        if width == 0.0 {
                            f64::NAN
                        } else {
                            (c - lower) / width
                        }
                    }
                    BollingerBand::Middle => mid,
                }
            })
            .collect()
    }
}
