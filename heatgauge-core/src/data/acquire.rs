//! Acquisition: primary → fallback symbol selection and daily resampling.
//!
//! Provider failures never escape this module. A failed or empty fetch is
//! logged and surfaces as a zero-row series, which the fallback rule and the
//! orchestrator's readiness check handle downstream.

use super::provider::DataProvider;
use crate::config::{AppConfig, DataConfig};
use crate::domain::{Bar, Timeframe};
use chrono::{NaiveDate, NaiveTime};
use std::collections::BTreeMap;

/// Bars for both timeframes plus the symbol that actually supplied them.
#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    pub hourly: Vec<Bar>,
    pub daily: Vec<Bar>,
    pub active_symbol: String,
    pub used_fallback: bool,
    pub fallback_reason: Option<String>,
}

/// Primary/fallback policy for one requested symbol.
#[derive(Debug, Clone, Copy)]
pub struct FallbackPolicy<'a> {
    pub fallback: Option<&'a str>,
    pub min_rows: usize,
}

impl<'a> FallbackPolicy<'a> {
    /// The policy configured for `symbol`: only the default symbol has a fallback.
    pub fn for_symbol(config: &'a AppConfig, symbol: &str) -> Self {
        Self {
            fallback: config.symbols.fallback_for(symbol),
            min_rows: config.symbols.min_rows,
        }
    }

    pub fn direct() -> Self {
        Self {
            fallback: None,
            min_rows: 0,
        }
    }
}

/// Fetch one series, converting provider errors into an empty result.
pub fn download(
    provider: &dyn DataProvider,
    symbol: &str,
    timeframe: Timeframe,
    period: &str,
) -> Vec<Bar> {
    tracing::info!(symbol, %timeframe, period, provider = provider.name(), "downloading bars");
    let bars = match provider.fetch(symbol, timeframe, period) {
        Ok(result) => result.bars,
        Err(e) => {
            tracing::warn!(symbol, %timeframe, error = %e, "fetch failed, continuing with no rows");
            return Vec::new();
        }
    };

    if timeframe == Timeframe::Daily && has_intraday_duplicates(&bars) {
        let before = bars.len();
        let resampled = resample_daily(bars);
        tracing::info!(symbol, before, after = resampled.len(), "resampled intraday rows into daily bars");
        return resampled;
    }
    bars
}

/// Fetch hourly then daily bars, swapping to the fallback symbol when the
/// primary's hourly history is shorter than `policy.min_rows`.
///
/// The daily fetch always uses whichever symbol the hourly check settled on.
pub fn acquire(
    provider: &dyn DataProvider,
    symbol: &str,
    policy: FallbackPolicy<'_>,
    data: &DataConfig,
) -> Acquisition {
    let mut hourly = download(provider, symbol, Timeframe::Hourly, &data.hourly_period);
    let mut active_symbol = symbol.to_string();
    let mut used_fallback = false;
    let mut fallback_reason = None;

    if let Some(fallback) = policy.fallback {
        if hourly.len() < policy.min_rows {
            let reason = format!(
                "{symbol} returned only {} hourly rows (minimum {}). Falling back to {fallback}.",
                hourly.len(),
                policy.min_rows
            );
            tracing::warn!(symbol, fallback, rows = hourly.len(), "{reason}");
            hourly = download(provider, fallback, Timeframe::Hourly, &data.hourly_period);
            active_symbol = fallback.to_string();
            used_fallback = true;
            fallback_reason = Some(reason);
        }
    }

    let daily = download(provider, &active_symbol, Timeframe::Daily, &data.daily_period);

    tracing::info!(
        symbol = %active_symbol,
        hourly = hourly.len(),
        daily = daily.len(),
        used_fallback,
        "fetch complete"
    );

    Acquisition {
        hourly,
        daily,
        active_symbol,
        used_fallback,
        fallback_reason,
    }
}

fn has_intraday_duplicates(bars: &[Bar]) -> bool {
    let mut seen = std::collections::HashSet::with_capacity(bars.len());
    bars.iter().any(|b| !seen.insert(b.timestamp.date_naive()))
}

/// Collapse bars into one bar per UTC calendar date.
///
/// Open = first, High = max, Low = min, Close = last, Volume = sum, each
/// ignoring missing values. Dates without any close are dropped. The result
/// is stamped at midnight UTC and sorted ascending.
pub fn resample_daily(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.timestamp);

    let mut by_date: BTreeMap<NaiveDate, Vec<Bar>> = BTreeMap::new();
    for bar in bars {
        by_date.entry(bar.timestamp.date_naive()).or_default().push(bar);
    }

    by_date
        .into_iter()
        .filter_map(|(date, group)| {
            let close = group.iter().rev().map(|b| b.close).find(|v| !v.is_nan())?;
            let open = group
                .iter()
                .map(|b| b.open)
                .find(|v| !v.is_nan())
                .unwrap_or(f64::NAN);
            let high = group
                .iter()
                .map(|b| b.high)
                .filter(|v| !v.is_nan())
                .fold(f64::NAN, f64::max);
            let low = group
                .iter()
                .map(|b| b.low)
                .filter(|v| !v.is_nan())
                .fold(f64::NAN, f64::min);
            let volume = group.iter().map(|b| b.volume).filter(|v| !v.is_nan()).sum();
            Some(Bar {
                timestamp: date.and_time(NaiveTime::MIN).and_utc(),
                open,
                high,
                low,
                close,
                volume,
            })
        })
        .collect()
}
