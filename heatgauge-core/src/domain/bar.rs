//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV observation for one symbol over one bar interval.
///
/// Timestamps are always UTC. Missing provider values are carried as `NaN`
/// until the validator drops bars without a close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// True when the bar has a usable close.
    pub fn has_close(&self) -> bool {
        self.close.is_finite()
    }

    /// Basic OHLC sanity check: high >= low, open/close inside the range, positive prices.
    pub fn is_sane(&self) -> bool {
        if !self.has_close() || self.open.is_nan() || self.high.is_nan() || self.low.is_nan() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.close > 0.0
    }
}

/// Bar interval of a stored series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Hourly,
    Daily,
}

impl Timeframe {
    pub const ALL: [Timeframe; 2] = [Timeframe::Hourly, Timeframe::Daily];

    /// Storage/directory name.
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Hourly => "hourly",
            Timeframe::Daily => "daily",
        }
    }

    /// Provider interval code.
    pub fn interval(self) -> &'static str {
        match self {
            Timeframe::Hourly => "1h",
            Timeframe::Daily => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hourly" | "1h" => Ok(Timeframe::Hourly),
            "daily" | "1d" => Ok(Timeframe::Daily),
            other => Err(format!("unknown timeframe '{other}' (expected hourly or daily)")),
        }
    }
}

/// Closing prices of a bar slice.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}
