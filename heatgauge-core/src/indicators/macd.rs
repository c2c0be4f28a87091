//! MACD: EMA(fast) - EMA(slow), its EMA(signal), and the histogram.
//!
//! Each output line is its own indicator instance.
//! Lookback: slow - 1 for the line, slow + signal - 2 for signal and histogram.

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::{closes, Bar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdLine {
    Line,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    line: MacdLine,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize, line: MacdLine) -> Self {
        Self {
            fast: fast.max(1),
            slow: slow.max(1),
            signal: signal.max(1),
            line,
        }
    }
}

/// (line, signal, histogram) for a close series.
pub fn macd_series(values: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = ema_of_series(values, fast);
    let slow_ema = ema_of_series(values, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema_of_series(&line, signal);
    let hist = line.iter().zip(&signal_line).map(|(l, s)| l - s).collect();
    (line, signal_line, hist)
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        match self.line {
            MacdLine::Line => super::col::MACD,
            MacdLine::Signal => super::col::MACD_SIGNAL,
            MacdLine::Histogram => super::col::MACD_HIST,
        }
    }

    fn lookback(&self) -> usize {
        let line = self.fast.max(self.slow) - 1;
        match self.line {
            MacdLine::Line => line,
            MacdLine::Signal | MacdLine::Histogram => line + self.signal - 1,
        }
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let (line, signal, hist) = macd_series(&closes(bars), self.fast, self.slow, self.signal);
        match self.line {
            MacdLine::Line => line,
            MacdLine::Signal => signal,
            MacdLine::Histogram => hist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    fn wave(n: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 / 3.0).sin() * 5.0).collect();
        make_bars(&closes)
    }

    #[test]
    fn warmup_matches_lookback() {
        let bars = wave(60);
        for line in [MacdLine::Line, MacdLine::Signal, MacdLine::Histogram] {
            let macd = Macd::new(12, 26, 9, line);
            let result = macd.compute(&bars);
            let first = result.iter().position(|v| !v.is_nan()).unwrap();
            assert_eq!(first, macd.lookback(), "{line:?}");
        }
    }

    #[test]
    fn histogram_is_line_minus_signal() {
        let bars = wave(80);
        let line = Macd::new(12, 26, 9, MacdLine::Line).compute(&bars);
        let signal = Macd::new(12, 26, 9, MacdLine::Signal).compute(&bars);
        let hist = Macd::new(12, 26, 9, MacdLine::Histogram).compute(&bars);
        for i in 40..80 {
            assert_approx(hist[i], line[i] - signal[i], DEFAULT_EPSILON);
        }
    }

    #[test]
    fn flat_prices_give_zero_macd() {
        let bars = make_bars(&[50.0; 60]);
        let hist = Macd::new(12, 26, 9, MacdLine::Histogram).compute(&bars);
        assert_approx(hist[59], 0.0, DEFAULT_EPSILON);
    }
}
