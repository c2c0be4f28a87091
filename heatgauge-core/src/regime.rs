//! Market regime classification and risk flags.
//!
//! Trend comes from the alignment of close, SMA50 and SMA200 on the latest
//! daily row. Risk flags are evaluated independently of each other; the
//! SMA crossovers need the previous row as well.

use crate::config::RegimeConfig;
use crate::indicators::{col, IndicatorSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    TrendUp,
    TrendDown,
    Range,
}

impl MarketRegime {
    /// Display text, kept apart from the serialized identifier.
    pub fn label(self) -> &'static str {
        match self {
            MarketRegime::TrendUp => "Trend Up",
            MarketRegime::TrendDown => "Trend Down",
            MarketRegime::Range => "Range",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    Overbought,
    Oversold,
    HighVolatility,
    ExtremeDrawdown,
    DeathCross,
    GoldenCross,
}

impl RiskFlag {
    pub fn label(self) -> &'static str {
        match self {
            RiskFlag::Overbought => "Overbought",
            RiskFlag::Oversold => "Oversold",
            RiskFlag::HighVolatility => "High Volatility",
            RiskFlag::ExtremeDrawdown => "Extreme Drawdown",
            RiskFlag::DeathCross => "Death Cross",
            RiskFlag::GoldenCross => "Golden Cross",
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which signal a detail line justifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKey {
    Trend,
    Rsi,
    Volatility,
    Drawdown,
    Crossover,
}

impl fmt::Display for DetailKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetailKey::Trend => "trend",
            DetailKey::Rsi => "rsi",
            DetailKey::Volatility => "volatility",
            DetailKey::Drawdown => "drawdown",
            DetailKey::Crossover => "crossover",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeResult {
    pub regime: MarketRegime,
    pub risk_flags: Vec<RiskFlag>,
    pub confidence: f64,
    pub details: BTreeMap<DetailKey, String>,
}

impl RegimeResult {
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.risk_flags.contains(&flag)
    }
}

fn pct(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

/// Classify the latest daily row, optionally against the row before it.
pub fn detect_regime(
    latest: &IndicatorSnapshot,
    previous: Option<&IndicatorSnapshot>,
    config: &RegimeConfig,
) -> RegimeResult {
    let mut flags = Vec::new();
    let mut details = BTreeMap::new();

    let close = latest.close().unwrap_or(0.0);
    let sma50 = latest.get(col::SMA_50);
    let sma200 = latest.get(col::SMA_200);

    let (regime, confidence) = match (sma50, sma200) {
        (Some(s50), Some(s200)) if close > 0.0 => {
            if close > s50 && s50 > s200 {
                details.insert(
                    DetailKey::Trend,
                    format!("Bullish alignment: Price ({close:.2}) > SMA50 ({s50:.2}) > SMA200 ({s200:.2})"),
                );
                (MarketRegime::TrendUp, 0.8)
            } else if close < s50 && s50 < s200 {
                details.insert(
                    DetailKey::Trend,
                    format!("Bearish alignment: Price ({close:.2}) < SMA50 ({s50:.2}) < SMA200 ({s200:.2})"),
                );
                (MarketRegime::TrendDown, 0.8)
            } else {
                details.insert(
                    DetailKey::Trend,
                    format!("Mixed signals: Price={close:.2}, SMA50={s50:.2}, SMA200={s200:.2}"),
                );
                (MarketRegime::Range, 0.5)
            }
        }
        _ => {
            details.insert(
                DetailKey::Trend,
                "Insufficient data for trend detection".to_string(),
            );
            (MarketRegime::Range, 0.3)
        }
    };

    if let Some(rsi) = latest.get(col::RSI) {
        let text = if rsi > config.overbought_rsi {
            flags.push(RiskFlag::Overbought);
            format!("RSI={rsi:.1} > {} (overbought)", config.overbought_rsi)
        } else if rsi < config.oversold_rsi {
            flags.push(RiskFlag::Oversold);
            format!("RSI={rsi:.1} < {} (oversold)", config.oversold_rsi)
        } else {
            format!("RSI={rsi:.1} (neutral)")
        };
        details.insert(DetailKey::Rsi, text);
    }

    if let Some(vol) = latest.get(col::VOLATILITY) {
        let text = if vol > config.high_volatility_threshold {
            flags.push(RiskFlag::HighVolatility);
            format!(
                "Annualized volatility={} > {}",
                pct(vol, 1),
                pct(config.high_volatility_threshold, 0)
            )
        } else {
            format!("Annualized volatility={}", pct(vol, 1))
        };
        details.insert(DetailKey::Volatility, text);
    }

    if let Some(dd) = latest.get(col::DRAWDOWN) {
        let text = if dd < config.extreme_drawdown_threshold {
            flags.push(RiskFlag::ExtremeDrawdown);
            format!(
                "Drawdown={} < {}",
                pct(dd, 1),
                pct(config.extreme_drawdown_threshold, 0)
            )
        } else {
            format!("Drawdown={}", pct(dd, 1))
        };
        details.insert(DetailKey::Drawdown, text);
    }

    if let (Some(prev), Some(s50), Some(s200)) = (previous, sma50, sma200) {
        if let (Some(p50), Some(p200)) = (prev.get(col::SMA_50), prev.get(col::SMA_200)) {
            if p50 < p200 && s50 >= s200 {
                flags.push(RiskFlag::GoldenCross);
                details.insert(
                    DetailKey::Crossover,
                    "Golden Cross: SMA50 crossed above SMA200".to_string(),
                );
            } else if p50 > p200 && s50 <= s200 {
                flags.push(RiskFlag::DeathCross);
                details.insert(
                    DetailKey::Crossover,
                    "Death Cross: SMA50 crossed below SMA200".to_string(),
                );
            }
        }
    }

    tracing::info!(
        regime = %regime,
        flags = ?flags,
        confidence,
        "regime detected"
    );

    RegimeResult {
        regime,
        risk_flags: flags,
        confidence,
        details,
    }
}
