//! Return-based series: log return, annualized volatility, drawdown,
//! percent momentum, and distance to a moving average.

use super::sma::rolling_std;
use super::Indicator;
use crate::domain::{closes, Bar};

/// ln(close[t] / close[t-1]). Lookback: 1.
#[derive(Debug, Clone, Copy)]
pub struct LogReturn;

impl Indicator for LogReturn {
    fn name(&self) -> &str {
        super::col::LOG_RETURN
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        log_returns(&closes(bars))
    }
}

fn log_returns(close: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; close.len()];
    for i in 1..close.len() {
        out[i] = (close[i] / close[i - 1]).ln();
    }
    out
}

/// Sample stddev of log returns over `window` bars, annualized by
/// √trading_days. Lookback: window.
#[derive(Debug, Clone)]
pub struct Volatility {
    window: usize,
    trading_days: f64,
}

impl Volatility {
    pub fn new(window: usize, trading_days: f64) -> Self {
        Self {
            window: window.max(2),
            trading_days,
        }
    }
}

impl Indicator for Volatility {
    fn name(&self) -> &str {
        super::col::VOLATILITY
    }

    fn lookback(&self) -> usize {
        self.window
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let annualize = self.trading_days.sqrt();
        rolling_std(&log_returns(&closes(bars)), self.window, 1)
            .into_iter()
            .map(|sd| sd * annualize)
            .collect()
    }
}

/// (close - running max) / running max. Always ≤ 0. Lookback: 0.
#[derive(Debug, Clone, Copy)]
pub struct Drawdown;

impl Indicator for Drawdown {
    fn name(&self) -> &str {
        super::col::DRAWDOWN
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut peak = f64::NAN;
        bars.iter()
            .map(|bar| {
                if bar.close.is_nan() {
                    return f64::NAN;
                }
                peak = if peak.is_nan() { bar.close } else { peak.max(bar.close) };
                (bar.close - peak) / peak
            })
            .collect()
    }
}

/// Percent change of close over `period` bars. Lookback: period.
#[derive(Debug, Clone)]
pub struct Momentum {
    period: usize,
}

impl Momentum {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

impl Indicator for Momentum {
    fn name(&self) -> &str {
        super::col::MOMENTUM
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut out = vec![f64::NAN; bars.len()];
        for i in self.period..bars.len() {
            out[i] = bars[i].close / bars[i - self.period].close - 1.0;
        }
        out
    }
}

/// (close - ma) / ma per bar; NaN wherever the average is undefined.
pub fn distance_to(bars: &[Bar], ma: &[f64]) -> Vec<f64> {
    bars.iter()
        .zip(ma)
        .map(|(bar, &m)| (bar.close - m) / m)
        .collect()
}
