//! Heat score: eight normalized indicator components combined into a 0–100
//! market temperature with a descriptive label.
//!
//! Components are always evaluated in the same order. A missing input (absent
//! or `NaN` in the snapshot) falls back to its configured default, so a score
//! is computable from any snapshot.

use crate::config::{find_bracket, Domain, HeatScoreConfig};
use crate::indicators::{col, IndicatorSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatLabel {
    Fear,
    Cooling,
    Neutral,
    Hot,
}

impl HeatLabel {
    pub fn label(self) -> &'static str {
        match self {
            HeatLabel::Fear => "Fear",
            HeatLabel::Cooling => "Cooling",
            HeatLabel::Neutral => "Neutral",
            HeatLabel::Hot => "Hot",
        }
    }
}

impl fmt::Display for HeatLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Rsi,
    MacdHistogram,
    BbPosition,
    MaTrend,
    Drawdown,
    Volatility,
    Momentum5d,
    DistanceMa200,
}

impl ComponentKind {
    /// Evaluation order.
    pub const ALL: [ComponentKind; 8] = [
        ComponentKind::Rsi,
        ComponentKind::MacdHistogram,
        ComponentKind::BbPosition,
        ComponentKind::MaTrend,
        ComponentKind::Drawdown,
        ComponentKind::Volatility,
        ComponentKind::Momentum5d,
        ComponentKind::DistanceMa200,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ComponentKind::Rsi => "RSI",
            ComponentKind::MacdHistogram => "MACD Histogram",
            ComponentKind::BbPosition => "BB Position",
            ComponentKind::MaTrend => "MA Trend",
            ComponentKind::Drawdown => "Drawdown",
            ComponentKind::Volatility => "Volatility",
            ComponentKind::Momentum5d => "5-Day Momentum",
            ComponentKind::DistanceMa200 => "Distance to MA200",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub kind: ComponentKind,
    pub raw_value: f64,
    /// Always within [0, 100].
    pub normalized: f64,
    pub weight: f64,
    /// `normalized * weight`.
    pub contribution: f64,
    pub description: String,
}

impl ScoreComponent {
    pub fn name(&self) -> &'static str {
        self.kind.label()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatScoreResult {
    pub score: f64,
    pub label: HeatLabel,
    pub components: Vec<ScoreComponent>,
}

impl HeatScoreResult {
    pub fn component(&self, kind: ComponentKind) -> Option<&ScoreComponent> {
        self.components.iter().find(|c| c.kind == kind)
    }

    pub fn total_weight(&self) -> f64 {
        self.components.iter().map(|c| c.weight).sum()
    }
}

/// Map `value` from `domain` onto [0, 100], clamped. An inverted domain
/// (lo > hi) flips the direction. A degenerate domain maps to 50.
pub fn linear_map(value: f64, domain: Domain) -> f64 {
    let (lo, hi) = (domain.lo(), domain.hi());
    if hi == lo {
        return 50.0;
    }
    ((value - lo) / (hi - lo) * 100.0).clamp(0.0, 100.0)
}

fn pct(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

/// Score one snapshot.
pub fn compute_heat_score(latest: &IndicatorSnapshot, config: &HeatScoreConfig) -> HeatScoreResult {
    let components: Vec<ScoreComponent> = ComponentKind::ALL
        .iter()
        .map(|&kind| score_component(kind, latest, config))
        .collect();

    let score = components
        .iter()
        .map(|c| c.contribution)
        .sum::<f64>()
        .clamp(0.0, 100.0);

    let label = find_bracket(config.labels.iter().map(|b| &b.range), score)
        .map(|i| config.labels[i].label)
        .unwrap_or(HeatLabel::Neutral);

    tracing::info!(score = format_args!("{score:.1}"), %label, "heat score computed");

    HeatScoreResult {
        score,
        label,
        components,
    }
}

fn score_component(
    kind: ComponentKind,
    latest: &IndicatorSnapshot,
    config: &HeatScoreConfig,
) -> ScoreComponent {
    let w = &config.weights;
    let norm = &config.normalization;
    let defaults = &config.defaults;
    let input = |name: &str, default: f64| latest.get(name).unwrap_or(default);

    let (raw, normalized, weight, description) = match kind {
        ComponentKind::Rsi => {
            let rsi = input(col::RSI, defaults.rsi);
            (rsi, rsi.clamp(0.0, 100.0), w.rsi, format!("RSI = {rsi:.1}"))
        }
        ComponentKind::MacdHistogram => {
            let hist = input(col::MACD_HIST, defaults.macd_histogram);
            let clamp = norm.macd_clamp;
            let clamped = hist.clamp(clamp.lo().min(clamp.hi()), clamp.lo().max(clamp.hi()));
            (
                hist,
                linear_map(clamped, clamp),
                w.macd_histogram,
                format!(
                    "MACD histogram = {hist:.4} (clamped to [{:?}, {:?}])",
                    clamp.lo(),
                    clamp.hi()
                ),
            )
        }
        ComponentKind::BbPosition => {
            let pct_b = input(col::BB_PCT_B, defaults.bb_percent_b);
            (
                pct_b,
                (pct_b * 100.0).clamp(0.0, 100.0),
                w.bb_position,
                format!("BB %B = {pct_b:.3} (0=lower band, 1=upper band)"),
            )
        }
        ComponentKind::MaTrend => {
            let dist = input(col::DIST_SMA50, defaults.dist_ma50);
            (
                dist,
                linear_map(dist, norm.ma_trend_range),
                w.ma_trend,
                format!("Distance to SMA50 = {}", pct(dist, 2)),
            )
        }
        ComponentKind::Drawdown => {
            let dd = input(col::DRAWDOWN, defaults.drawdown);
            (
                dd,
                linear_map(dd, norm.drawdown_range),
                w.drawdown,
                format!("Drawdown = {} (0% = at high)", pct(dd, 2)),
            )
        }
        ComponentKind::Volatility => {
            let vol = input(col::VOLATILITY, defaults.volatility);
            (
                vol,
                linear_map(vol, norm.volatility_range),
                w.volatility,
                format!(
                    "Annualized volatility = {} (inverted: high vol → low score)",
                    pct(vol, 1)
                ),
            )
        }
        ComponentKind::Momentum5d => {
            let mom = input(col::MOMENTUM, defaults.momentum_5d);
            (
                mom,
                linear_map(mom, norm.momentum_range),
                w.momentum_5d,
                format!("5-day price change = {}", pct(mom, 2)),
            )
        }
        ComponentKind::DistanceMa200 => {
            let dist = input(col::DIST_SMA200, defaults.dist_ma200);
            (
                dist,
                linear_map(dist, norm.distance_ma200_range),
                w.distance_ma200,
                format!("Distance to SMA200 = {}", pct(dist, 2)),
            )
        }
    };

    ScoreComponent {
        kind,
        raw_value: raw,
        normalized,
        weight,
        contribution: normalized * weight,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(pairs: &[(&str, f64)]) -> HeatScoreResult {
        compute_heat_score(
            &IndicatorSnapshot::from_pairs(pairs.iter().copied()),
            &HeatScoreConfig::default(),
        )
    }

    fn neutral_inputs() -> Vec<(&'static str, f64)> {
        vec![
            (col::RSI, 50.0),
            (col::MACD_HIST, 0.0),
            (col::BB_PCT_B, 0.5),
            (col::DIST_SMA50, 0.0),
            (col::DRAWDOWN, -0.05),
            (col::VOLATILITY, 0.20),
            (col::MOMENTUM, 0.0),
            (col::DIST_SMA200, 0.0),
        ]
    }

    #[test]
    fn eight_components_in_fixed_order() {
        let result = score(&neutral_inputs());
        let kinds: Vec<ComponentKind> = result.components.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, ComponentKind::ALL.to_vec());
        assert!((result.total_weight() - 1.0).abs() < 0.01);
    }

    #[test]
    fn fear_conditions() {
        let result = score(&[
            (col::RSI, 15.0),
            (col::MACD_HIST, -3.0),
            (col::BB_PCT_B, 0.0),
            (col::DIST_SMA50, -0.15),
            (col::DRAWDOWN, -0.25),
            (col::VOLATILITY, 0.50),
            (col::MOMENTUM, -0.08),
            (col::DIST_SMA200, -0.20),
        ]);
        assert!(result.score < 30.0);
        assert!((result.score - 3.0).abs() < 1e-9);
        assert_eq!(result.label, HeatLabel::Fear);
    }

    #[test]
    fn hot_conditions() {
        let result = score(&[
            (col::RSI, 85.0),
            (col::MACD_HIST, 3.0),
            (col::BB_PCT_B, 1.0),
            (col::DIST_SMA50, 0.15),
            (col::DRAWDOWN, 0.0),
            (col::VOLATILITY, 0.08),
            (col::MOMENTUM, 0.08),
            (col::DIST_SMA200, 0.20),
        ]);
        assert!(result.score > 65.0);
        assert!((result.score - 97.0).abs() < 1e-9);
        assert_eq!(result.label, HeatLabel::Hot);
    }

    #[test]
    fn neutral_conditions() {
        let result = score(&neutral_inputs());
        assert!((30.0..=70.0).contains(&result.score));
        assert!((result.score - 54.1666).abs() < 1e-3);
        assert_eq!(result.label, HeatLabel::Neutral);
    }

    #[test]
    fn missing_inputs_use_defaults() {
        let empty = score(&[]);
        let nan = score(&[(col::RSI, f64::NAN), (col::VOLATILITY, f64::NAN)]);
        assert_eq!(empty.score, nan.score);
        let rsi = empty.component(ComponentKind::Rsi).unwrap();
        assert_eq!(rsi.raw_value, 50.0);
        let vol = empty.component(ComponentKind::Volatility).unwrap();
        assert_eq!(vol.raw_value, 0.20);
    }

    #[test]
    fn linear_map_rules() {
        assert_eq!(linear_map(0.0, Domain(-1.0, 1.0)), 50.0);
        assert_eq!(linear_map(5.0, Domain(-1.0, 1.0)), 100.0);
        assert_eq!(linear_map(-5.0, Domain(-1.0, 1.0)), 0.0);
        assert_eq!(linear_map(3.0, Domain(2.0, 2.0)), 50.0);
        // Inverted domain: higher raw, lower score
        assert!((linear_map(0.40, Domain(0.40, 0.10)) - 0.0).abs() < 1e-9);
        assert!((linear_map(0.10, Domain(0.40, 0.10)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn descriptions_follow_inputs() {
        let result = score(&neutral_inputs());
        assert_eq!(result.components[0].description, "RSI = 50.0");
        assert_eq!(
            result.components[1].description,
            "MACD histogram = 0.0000 (clamped to [-2.0, 2.0])"
        );
        assert_eq!(result.components[4].description, "Drawdown = -5.00% (0% = at high)");
    }
}
