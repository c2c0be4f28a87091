//! Published per-symbol pipeline state and its lifecycle phase.

use crate::decision::DcaResult;
use crate::domain::Timeframe;
use crate::heat_score::HeatScoreResult;
use crate::indicators::{IndicatorFrame, IndicatorSnapshot};
use crate::regime::RegimeResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one symbol's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Unloaded => "unloaded",
            Phase::Loading => "loading",
            Phase::Ready => "ready",
            Phase::Failed => "failed",
        })
    }
}

/// Immutable result of one pipeline run for a requested symbol.
///
/// Built once and shared behind an `Arc`; a refresh publishes a new value
/// instead of modifying this one.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub(crate) symbol: String,
    pub(crate) active_symbol: String,
    pub(crate) used_fallback: bool,
    pub(crate) fallback_reason: Option<String>,
    pub(crate) hourly: IndicatorFrame,
    pub(crate) daily: IndicatorFrame,
    pub(crate) latest: IndicatorSnapshot,
    pub(crate) regime: RegimeResult,
    pub(crate) heat_score: HeatScoreResult,
    pub(crate) dca: DcaResult,
    pub(crate) report: String,
    pub(crate) last_refresh: DateTime<Utc>,
    pub(crate) ready: bool,
}

impl PipelineState {
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The symbol this state was requested for.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The symbol whose bars produced this state (differs after a fallback).
    pub fn active_symbol(&self) -> &str {
        &self.active_symbol
    }

    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    pub fn rows(&self, timeframe: Timeframe) -> usize {
        self.frame(timeframe).len()
    }

    pub fn frame(&self, timeframe: Timeframe) -> &IndicatorFrame {
        match timeframe {
            Timeframe::Hourly => &self.hourly,
            Timeframe::Daily => &self.daily,
        }
    }

    pub fn hourly(&self) -> &IndicatorFrame {
        &self.hourly
    }

    pub fn daily(&self) -> &IndicatorFrame {
        &self.daily
    }

    /// The latest daily row that was scored.
    pub fn latest(&self) -> &IndicatorSnapshot {
        &self.latest
    }

    pub fn regime(&self) -> &RegimeResult {
        &self.regime
    }

    pub fn heat_score(&self) -> &HeatScoreResult {
        &self.heat_score
    }

    pub fn dca(&self) -> &DcaResult {
        &self.dca
    }

    pub fn report(&self) -> &str {
        &self.report
    }

    pub fn last_refresh(&self) -> DateTime<Utc> {
        self.last_refresh
    }
}

/// Flat summary of a state for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub symbol: String,
    pub active_symbol: String,
    pub used_fallback: bool,
    pub fallback_reason: Option<String>,
    pub hourly_rows: usize,
    pub daily_rows: usize,
    pub last_refresh: DateTime<Utc>,
    pub score: f64,
    pub label: String,
    pub regime: String,
    pub risk_flags: Vec<String>,
    pub action: String,
    pub multiplier: f64,
    pub suggested_amount: f64,
    pub currency: String,
}

impl From<&PipelineState> for StateSummary {
    fn from(state: &PipelineState) -> Self {
        Self {
            symbol: state.symbol.clone(),
            active_symbol: state.active_symbol.clone(),
            used_fallback: state.used_fallback,
            fallback_reason: state.fallback_reason.clone(),
            hourly_rows: state.hourly.len(),
            daily_rows: state.daily.len(),
            last_refresh: state.last_refresh,
            score: state.heat_score.score,
            label: state.heat_score.label.to_string(),
            regime: state.regime.regime.to_string(),
            risk_flags: state.regime.risk_flags.iter().map(|f| f.to_string()).collect(),
            action: state.dca.action.clone(),
            multiplier: state.dca.multiplier,
            suggested_amount: state.dca.suggested_amount,
            currency: state.dca.currency.clone(),
        }
    }
}
