//! Indicator engine.
//!
//! Every indicator implements [`Indicator`]: a full bar series in, one value
//! per bar out, with `NaN` during warmup. Multi-output indicators (MACD,
//! Bollinger) are exposed as separate named instances per output line.
//!
//! [`compute_indicators`] runs the configured set over a validated series and
//! returns an [`IndicatorFrame`]: the bars plus one column per indicator.
//! Snapshots of single rows feed the regime detector and heat score.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod returns;
pub mod rsi;
pub mod sma;

pub use atr::Atr;
pub use bollinger::{Bollinger, BollingerBand};
pub use ema::Ema;
pub use macd::{Macd, MacdLine};
pub use returns::{Drawdown, LogReturn, Momentum, Volatility};
pub use rsi::Rsi;
pub use sma::Sma;

use crate::config::IndicatorConfig;
use crate::domain::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column names shared by the engine, the regime detector and the heat score.
pub mod col {
    pub const OPEN: &str = "open";
    pub const HIGH: &str = "high";
    pub const LOW: &str = "low";
    pub const CLOSE: &str = "close";
    pub const VOLUME: &str = "volume";
    pub const RSI: &str = "rsi";
    pub const SMA_50: &str = "sma_50";
    pub const SMA_200: &str = "sma_200";
    pub const MACD: &str = "macd";
    pub const MACD_SIGNAL: &str = "macd_signal";
    pub const MACD_HIST: &str = "macd_hist";
    pub const BB_UPPER: &str = "bb_upper";
    pub const BB_MIDDLE: &str = "bb_middle";
    pub const BB_LOWER: &str = "bb_lower";
    pub const BB_PCT_B: &str = "bb_pct_b";
    pub const ATR: &str = "atr";
    pub const LOG_RETURN: &str = "log_return";
    pub const VOLATILITY: &str = "volatility";
    pub const DRAWDOWN: &str = "drawdown";
    pub const DIST_SMA50: &str = "dist_sma50";
    pub const DIST_SMA200: &str = "dist_sma200";
    pub const MOMENTUM: &str = "momentum_5d";
}

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No value at bar t may depend on bar t+1 or later. Each indicator is
/// checked against a truncated copy of its input in the tests.
pub trait Indicator: Send + Sync {
    /// Column name of the output (e.g. "sma_50", "bb_upper").
    fn name(&self) -> &str;

    /// Number of leading bars that are `NaN` on clean input.
    fn lookback(&self) -> usize;

    /// Returns a `Vec<f64>` of the same length as `bars`.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Bars plus derived columns, aligned by row.
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    bars: Vec<Bar>,
    columns: Vec<(String, Vec<f64>)>,
}

impl IndicatorFrame {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            columns: Vec::new(),
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Insert or replace a derived column. Length must match the bar count.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.bars.len());
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values,
            None => self.columns.push((name, values)),
        }
    }

    /// A derived column by name. Price columns are not included.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Derived column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// All values for row `index`: OHLCV first, then every derived column.
    pub fn snapshot(&self, index: usize) -> Option<IndicatorSnapshot> {
        let bar = self.bars.get(index)?;
        let mut values = BTreeMap::new();
        values.insert(col::OPEN.to_string(), bar.open);
        values.insert(col::HIGH.to_string(), bar.high);
        values.insert(col::LOW.to_string(), bar.low);
        values.insert(col::CLOSE.to_string(), bar.close);
        values.insert(col::VOLUME.to_string(), bar.volume);
        for (name, series) in &self.columns {
            values.insert(name.clone(), series[index]);
        }
        Some(IndicatorSnapshot {
            timestamp: bar.timestamp,
            values,
        })
    }

    pub fn latest(&self) -> Option<IndicatorSnapshot> {
        self.snapshot(self.len().checked_sub(1)?)
    }

    /// The row before the latest, if the frame has at least two rows.
    pub fn previous(&self) -> Option<IndicatorSnapshot> {
        self.snapshot(self.len().checked_sub(2)?)
    }
}

/// Indicator values for a single bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

impl IndicatorSnapshot {
    /// Build a snapshot from literal pairs (tests and callers that score
    /// hand-picked inputs).
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            values: pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    /// A value by column name. `NaN` (warmup, undefined) reads as missing.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().filter(|v| !v.is_nan())
    }

    pub fn close(&self) -> Option<f64> {
        self.get(col::CLOSE)
    }
}

/// The configured indicator set, in output column order.
pub fn configured_indicators(config: &IndicatorConfig) -> Vec<Box<dyn Indicator>> {
    let mut set: Vec<Box<dyn Indicator>> = vec![Box::new(Rsi::new(config.rsi_period))];
    for &p in &config.sma_periods {
        set.push(Box::new(Sma::new(p)));
    }
    for &p in &config.ema_periods {
        set.push(Box::new(Ema::new(p)));
    }
    for line in [MacdLine::Line, MacdLine::Signal, MacdLine::Histogram] {
        set.push(Box::new(Macd::new(
            config.macd_fast,
            config.macd_slow,
            config.macd_signal,
            line,
        )));
    }
    for band in [
        BollingerBand::Upper,
        BollingerBand::Middle,
        BollingerBand::Lower,
        BollingerBand::PercentB,
    ] {
        set.push(Box::new(Bollinger::new(config.bb_period, config.bb_std, band)));
    }
    set.push(Box::new(Atr::new(config.atr_period)));
    set.push(Box::new(LogReturn));
    set.push(Box::new(Volatility::new(
        config.volatility_window,
        config.trading_days_per_year,
    )));
    set.push(Box::new(Drawdown));
    set.push(Box::new(Momentum::new(config.momentum_period)));
    set
}

/// Derive every configured indicator for a validated series.
///
/// Fewer than two bars is a no-op: the frame carries the bars and no columns.
/// Distances to SMA50/SMA200 are added only when those SMAs are configured.
pub fn compute_indicators(bars: Vec<Bar>, config: &IndicatorConfig) -> IndicatorFrame {
    let mut frame = IndicatorFrame::new(bars);
    if frame.len() < 2 {
        tracing::warn!(rows = frame.len(), "not enough data to compute indicators");
        return frame;
    }

    for indicator in configured_indicators(config) {
        let values = indicator.compute(frame.bars());
        frame.insert(indicator.name(), values);
    }

    for (sma, dist) in [(col::SMA_50, col::DIST_SMA50), (col::SMA_200, col::DIST_SMA200)] {
        if let Some(sma_values) = frame.column(sma) {
            let values = returns::distance_to(frame.bars(), sma_values);
            frame.insert(dist, values);
        }
    }

    tracing::debug!(rows = frame.len(), columns = frame.columns.len(), "indicators computed");
    frame
}

/// Close-only bars for tests: open = previous close, high/low ±1, volume 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(
                base + chrono::Duration::days(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    fn trending(n: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + i as f64 * 0.3 + (i as f64 * 0.7).sin() * 4.0)
            .collect();
        make_bars(&closes)
    }

    #[test]
    fn fewer_than_two_rows_is_a_no_op() {
        let config = IndicatorConfig::default();
        let empty = compute_indicators(Vec::new(), &config);
        assert!(empty.is_empty());
        assert_eq!(empty.column_names().count(), 0);

        let one = compute_indicators(make_bars(&[100.0]), &config);
        assert_eq!(one.len(), 1);
        assert_eq!(one.bars(), make_bars(&[100.0]).as_slice());
        assert_eq!(one.column_names().count(), 0);
    }

    #[test]
    fn produces_every_configured_column() {
        let frame = compute_indicators(trending(260), &IndicatorConfig::default());
        for name in [
            "rsi",
            "sma_20",
            "sma_50",
            "sma_200",
            "ema_20",
            "ema_50",
            col::MACD,
            col::MACD_SIGNAL,
            col::MACD_HIST,
            col::BB_UPPER,
            col::BB_MIDDLE,
            col::BB_LOWER,
            col::BB_PCT_B,
            col::ATR,
            col::LOG_RETURN,
            col::VOLATILITY,
            col::DRAWDOWN,
            col::DIST_SMA50,
            col::DIST_SMA200,
            col::MOMENTUM,
        ] {
            let column = frame.column(name).unwrap_or_else(|| panic!("missing {name}"));
            assert_eq!(column.len(), 260);
        }
    }

    #[test]
    fn missing_sma_period_skips_its_distance() {
        let config = IndicatorConfig {
            sma_periods: vec![20],
            ..Default::default()
        };
        let frame = compute_indicators(trending(60), &config);
        assert!(frame.column(col::DIST_SMA50).is_none());
        assert!(frame.column(col::DIST_SMA200).is_none());
    }

    #[test]
    fn rsi_bounded_and_drawdown_non_positive() {
        let frame = compute_indicators(trending(120), &IndicatorConfig::default());
        let rsi = frame.column(col::RSI).unwrap();
        assert!(rsi.iter().filter(|v| !v.is_nan()).all(|v| (0.0..=100.0).contains(v)));
        let dd = frame.column(col::DRAWDOWN).unwrap();
        assert!(dd.iter().all(|&v| v <= 0.0));
    }

    #[test]
    fn snapshot_treats_nan_as_missing() {
        let frame = compute_indicators(trending(30), &IndicatorConfig::default());
        let latest = frame.latest().unwrap();
        assert!(latest.get("sma_200").is_none());
        assert!(latest.get("sma_20").is_some());
        assert_eq!(latest.close(), Some(frame.bars()[29].close));
        assert_eq!(frame.previous().unwrap().timestamp, frame.bars()[28].timestamp);
    }

    #[test]
    fn no_look_ahead() {
        let bars = trending(240);
        let config = IndicatorConfig::default();
        for indicator in configured_indicators(&config) {
            let full = indicator.compute(&bars);
            let truncated = indicator.compute(&bars[..180]);
            for i in 0..180 {
                let (a, b) = (full[i], truncated[i]);
                assert!(
                    (a.is_nan() && b.is_nan()) || (a - b).abs() < 1e-9,
                    "{} differs at {i}: {a} vs {b}",
                    indicator.name()
                );
            }
        }
    }
}
