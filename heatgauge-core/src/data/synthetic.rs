//! Synthetic random-walk provider for offline runs and tests.
//!
//! Output is deterministic for a given seed, symbol and end timestamp. Daily
//! bars land on weekdays at 00:00 UTC; hourly bars cover 14:00–20:00 UTC on
//! weekdays, roughly a US cash session.

use super::provider::{DataError, DataProvider, DataSource, FetchResult};
use crate::domain::{Bar, Timeframe};
use chrono::{DateTime, Datelike, Duration, DurationRound, TimeDelta, Timelike, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SESSION_OPEN_HOUR: u32 = 14;
const SESSION_CLOSE_HOUR: u32 = 20;

/// Parse a provider range string ("60d", "2wk", "3mo", "5y") into a duration.
pub fn parse_period(period: &str) -> Option<Duration> {
    let period = period.trim();
    let split = period.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = period.split_at(split);
    let n: i64 = digits.parse().ok()?;
    let days = match unit {
        "d" => n,
        "wk" => n * 7,
        "mo" => n * 30,
        "y" => n * 365,
        _ => return None,
    };
    Some(Duration::days(days))
}

pub struct SyntheticProvider {
    seed: u64,
    end: DateTime<Utc>,
}

impl SyntheticProvider {
    pub fn new(seed: u64) -> Self {
        let now = Utc::now();
        let end = now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now);
        Self { seed, end }
    }

    /// Pin the last generated timestamp (makes output reproducible across runs).
    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = end;
        self
    }

    fn symbol_seed(&self, symbol: &str, timeframe: Timeframe) -> u64 {
        let tf = match timeframe {
            Timeframe::Hourly => 0x9E37_79B9,
            Timeframe::Daily => 0x85EB_CA6B,
        };
        symbol
            .bytes()
            .fold(self.seed ^ tf, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
    }

    fn timestamps(&self, timeframe: Timeframe, span: Duration) -> Vec<DateTime<Utc>> {
        let start = self.end - span;
        let step = match timeframe {
            Timeframe::Hourly => Duration::hours(1),
            Timeframe::Daily => Duration::days(1),
        };
        let mut out = Vec::new();
        let mut ts = match timeframe {
            Timeframe::Hourly => start.duration_trunc(TimeDelta::hours(1)).unwrap_or(start),
            Timeframe::Daily => start.duration_trunc(TimeDelta::days(1)).unwrap_or(start),
        };
        while ts <= self.end {
            let weekday = !matches!(ts.weekday(), Weekday::Sat | Weekday::Sun);
            let in_session = match timeframe {
                Timeframe::Hourly => (SESSION_OPEN_HOUR..=SESSION_CLOSE_HOUR).contains(&ts.hour()),
                Timeframe::Daily => true,
            };
            if weekday && in_session {
                out.push(ts);
            }
            ts += step;
        }
        out
    }

    /// Generate a random walk for one symbol and timeframe.
    pub fn generate(&self, symbol: &str, timeframe: Timeframe, span: Duration) -> Vec<Bar> {
        let mut rng = StdRng::seed_from_u64(self.symbol_seed(symbol, timeframe));
        let (drift, step_vol) = match timeframe {
            Timeframe::Hourly => (0.00005, 0.004),
            Timeframe::Daily => (0.0004, 0.012),
        };

        let mut price = 100.0 + rng.gen_range(0.0..400.0);
        self.timestamps(timeframe, span)
            .into_iter()
            .map(|timestamp| {
                let open = price;
                let ret: f64 = drift + rng.gen_range(-step_vol..step_vol);
                let close = (open * (1.0 + ret)).max(0.01);
                let wick_up: f64 = rng.gen_range(0.0..0.004);
                let wick_down: f64 = rng.gen_range(0.0..0.004);
                price = close;
                Bar {
                    timestamp,
                    open,
                    high: open.max(close) * (1.0 + wick_up),
                    low: open.min(close) * (1.0 - wick_down),
                    close,
                    volume: rng.gen_range(1_000_000.0..10_000_000.0_f64).round(),
                }
            })
            .collect()
    }
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        period: &str,
    ) -> Result<FetchResult, DataError> {
        let span = parse_period(period)
            .ok_or_else(|| DataError::Other(format!("unsupported period '{period}'")))?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            timeframe,
            bars: self.generate(symbol, timeframe, span),
            source: DataSource::Synthetic,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}
