//! Typed pipeline configuration.
//!
//! Loaded once from TOML and validated before any stage sees it. Every
//! threshold, window, weight and bracket the pipeline uses lives here; the
//! `Default` impls carry the reference deployment values, and every section
//! is `#[serde(default)]` so a config file only needs the keys it overrides.
//!
//! Bracket tables (heat labels, contribution brackets) must tile `[0, 100]`
//! exactly: sorted, no gaps, no overlaps. Tables that don't are rejected at
//! load time instead of silently misclassifying scores.

use crate::heat_score::HeatLabel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const WEIGHT_TOLERANCE: f64 = 0.01;
const BOUNDARY_EPSILON: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("serialize config: {0}")]
    Serialize(String),

    #[error("invalid config `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

/// A numeric `[lo, hi]` pair. Serialized as a two-element array.
///
/// Used both as a half-open bracket `[lo, hi)` and as a normalization
/// domain, where `lo > hi` flips the direction of the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain(pub f64, pub f64);

impl Domain {
    pub fn lo(&self) -> f64 {
        self.0
    }

    pub fn hi(&self) -> f64 {
        self.1
    }

    /// Half-open membership `[lo, hi)`, closed at `hi` when `inclusive_hi`.
    pub fn contains(&self, value: f64, inclusive_hi: bool) -> bool {
        value >= self.0 && (value < self.1 || (inclusive_hi && value <= self.1))
    }
}

/// Index of the bracket containing `score`. The topmost bracket includes its upper bound.
pub fn find_bracket<'a>(ranges: impl ExactSizeIterator<Item = &'a Domain>, score: f64) -> Option<usize> {
    let last = ranges.len().checked_sub(1)?;
    ranges
        .enumerate()
        .find(|(i, range)| range.contains(score, *i == last))
        .map(|(i, _)| i)
}

// ── Sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub symbols: SymbolsConfig,
    pub data: DataConfig,
    pub validator: ValidatorConfig,
    pub indicators: IndicatorConfig,
    pub heat_score: HeatScoreConfig,
    pub dca: DcaConfig,
    pub regime: RegimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: String,
}

impl SymbolInfo {
    fn new(symbol: &str, name: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolsConfig {
    pub list: Vec<SymbolInfo>,
    /// Nominal default symbol. Falls back to the first listed symbol.
    pub default: Option<String>,
    /// Substitute for the default symbol when its hourly history is too short.
    pub fallback: Option<String>,
    /// Minimum hourly rows before the fallback symbol is used.
    pub min_rows: usize,
}

impl Default for SymbolsConfig {
    fn default() -> Self {
        Self {
            list: vec![
                SymbolInfo::new("SXR8.DE", "iShares Core S&P 500 UCITS (Xetra)"),
                SymbolInfo::new("SPY", "SPDR S&P 500 ETF"),
                SymbolInfo::new("VWCE.DE", "Vanguard FTSE All-World UCITS (Xetra)"),
                SymbolInfo::new("QQQ", "Invesco QQQ Trust"),
            ],
            default: Some("SXR8.DE".to_string()),
            fallback: Some("SPY".to_string()),
            min_rows: 50,
        }
    }
}

impl SymbolsConfig {
    /// The resolved default symbol.
    pub fn default_symbol(&self) -> Option<&str> {
        self.default
            .as_deref()
            .or_else(|| self.list.first().map(|s| s.symbol.as_str()))
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.list.iter().any(|s| s.symbol == symbol)
    }

    /// Fallback symbol to use for `symbol`, if the primary/fallback policy applies to it.
    pub fn fallback_for(&self, symbol: &str) -> Option<&str> {
        if self.default_symbol() != Some(symbol) {
            return None;
        }
        self.fallback.as_deref().filter(|fb| *fb != symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Provider range for hourly bars (e.g. "60d").
    pub hourly_period: String,
    /// Provider range for daily bars (e.g. "5y").
    pub daily_period: String,
    /// Cached data older than this triggers a refresh.
    pub max_age_hours: f64,
    pub cache_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            hourly_period: "60d".to_string(),
            daily_period: "5y".to_string(),
            max_age_hours: 1.0,
            cache_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub spike_window: usize,
    pub spike_min_periods: usize,
    pub spike_z_threshold: f64,
    /// Gaps longer than this multiple of the median interval are logged.
    pub gap_multiple: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            spike_window: 20,
            spike_min_periods: 5,
            spike_z_threshold: 10.0,
            gap_multiple: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub sma_periods: Vec<usize>,
    pub ema_periods: Vec<usize>,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub atr_period: usize,
    pub volatility_window: usize,
    pub trading_days_per_year: f64,
    pub momentum_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            sma_periods: vec![20, 50, 200],
            ema_periods: vec![20, 50],
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std: 2.0,
            atr_period: 14,
            volatility_window: 20,
            trading_days_per_year: 252.0,
            momentum_period: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatWeights {
    pub rsi: f64,
    pub macd_histogram: f64,
    pub bb_position: f64,
    pub ma_trend: f64,
    pub drawdown: f64,
    pub volatility: f64,
    pub momentum_5d: f64,
    pub distance_ma200: f64,
}

impl Default for HeatWeights {
    fn default() -> Self {
        Self {
            rsi: 0.20,
            macd_histogram: 0.15,
            bb_position: 0.10,
            ma_trend: 0.15,
            drawdown: 0.10,
            volatility: 0.10,
            momentum_5d: 0.10,
            distance_ma200: 0.10,
        }
    }
}

impl HeatWeights {
    fn named(&self) -> [(&'static str, f64); 8] {
        [
            ("rsi", self.rsi),
            ("macd_histogram", self.macd_histogram),
            ("bb_position", self.bb_position),
            ("ma_trend", self.ma_trend),
            ("drawdown", self.drawdown),
            ("volatility", self.volatility),
            ("momentum_5d", self.momentum_5d),
            ("distance_ma200", self.distance_ma200),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.named().iter().map(|(_, w)| w).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalization {
    pub macd_clamp: Domain,
    pub ma_trend_range: Domain,
    pub drawdown_range: Domain,
    /// Inverted by default: higher volatility maps to a lower score.
    pub volatility_range: Domain,
    pub momentum_range: Domain,
    pub distance_ma200_range: Domain,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            macd_clamp: Domain(-2.0, 2.0),
            ma_trend_range: Domain(-0.10, 0.10),
            drawdown_range: Domain(-0.20, 0.0),
            volatility_range: Domain(0.40, 0.10),
            momentum_range: Domain(-0.05, 0.05),
            distance_ma200_range: Domain(-0.15, 0.15),
        }
    }
}

/// Raw values substituted when an indicator is missing from the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentDefaults {
    pub rsi: f64,
    pub macd_histogram: f64,
    pub bb_percent_b: f64,
    pub dist_ma50: f64,
    pub drawdown: f64,
    pub volatility: f64,
    pub momentum_5d: f64,
    pub dist_ma200: f64,
}

impl Default for ComponentDefaults {
    fn default() -> Self {
        Self {
            rsi: 50.0,
            macd_histogram: 0.0,
            bb_percent_b: 0.5,
            dist_ma50: 0.0,
            drawdown: 0.0,
            volatility: 0.20,
            momentum_5d: 0.0,
            dist_ma200: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelBracket {
    pub label: HeatLabel,
    pub range: Domain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatScoreConfig {
    pub weights: HeatWeights,
    pub normalization: Normalization,
    pub defaults: ComponentDefaults,
    pub labels: Vec<LabelBracket>,
}

impl Default for HeatScoreConfig {
    fn default() -> Self {
        Self {
            weights: HeatWeights::default(),
            normalization: Normalization::default(),
            defaults: ComponentDefaults::default(),
            labels: vec![
                LabelBracket {
                    label: HeatLabel::Fear,
                    range: Domain(0.0, 30.0),
                },
                LabelBracket {
                    label: HeatLabel::Cooling,
                    range: Domain(30.0, 45.0),
                },
                LabelBracket {
                    label: HeatLabel::Neutral,
                    range: Domain(45.0, 65.0),
                },
                LabelBracket {
                    label: HeatLabel::Hot,
                    range: Domain(65.0, 100.0),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaBracket {
    pub action: String,
    pub range: Domain,
    pub multiplier: f64,
}

impl DcaBracket {
    fn new(action: &str, lo: f64, hi: f64, multiplier: f64) -> Self {
        Self {
            action: action.to_string(),
            range: Domain(lo, hi),
            multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcaConfig {
    pub base_amount: f64,
    pub currency: String,
    pub brackets: Vec<DcaBracket>,
}

impl Default for DcaConfig {
    fn default() -> Self {
        Self {
            base_amount: 500.0,
            currency: "EUR".to_string(),
            brackets: vec![
                DcaBracket::new("Aggressive Buy", 0.0, 30.0, 2.0),
                DcaBracket::new("Moderate Buy", 30.0, 45.0, 1.25),
                DcaBracket::new("Normal DCA", 45.0, 65.0, 1.0),
                DcaBracket::new("Reduce", 65.0, 80.0, 0.75),
                DcaBracket::new("Minimal", 80.0, 100.0, 0.5),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub overbought_rsi: f64,
    pub oversold_rsi: f64,
    /// Annualized volatility above this raises `HighVolatility`.
    pub high_volatility_threshold: f64,
    /// Drawdown below this (more negative) raises `ExtremeDrawdown`.
    pub extreme_drawdown_threshold: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            overbought_rsi: 70.0,
            oversold_rsi: 30.0,
            high_volatility_threshold: 0.30,
            extreme_drawdown_threshold: -0.10,
        }
    }
}

// ── Loading and validation ──────────────────────────────────────────

impl AppConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Reject configurations that would make a stage misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_symbols()?;
        self.validate_data()?;
        self.validate_validator()?;
        self.validate_indicators()?;
        self.validate_heat_score()?;
        self.validate_dca()?;
        self.validate_regime()
    }

    fn validate_symbols(&self) -> Result<(), ConfigError> {
        let symbols = &self.symbols;
        if symbols.list.is_empty() {
            return Err(invalid("symbols.list", "at least one symbol is required"));
        }
        if let Some(empty) = symbols.list.iter().find(|s| s.symbol.trim().is_empty()) {
            return Err(invalid(
                "symbols.list",
                format!("empty symbol (name '{}')", empty.name),
            ));
        }
        if let Some(default) = &symbols.default {
            if !symbols.contains(default) {
                return Err(invalid(
                    "symbols.default",
                    format!("'{default}' is not in symbols.list"),
                ));
            }
        }
        if matches!(&symbols.fallback, Some(fb) if fb.trim().is_empty()) {
            return Err(invalid("symbols.fallback", "must not be empty"));
        }
        Ok(())
    }

    fn validate_data(&self) -> Result<(), ConfigError> {
        if self.data.hourly_period.trim().is_empty() {
            return Err(invalid("data.hourly_period", "must not be empty"));
        }
        if self.data.daily_period.trim().is_empty() {
            return Err(invalid("data.daily_period", "must not be empty"));
        }
        if !(self.data.max_age_hours >= 0.0) {
            return Err(invalid("data.max_age_hours", "must be >= 0"));
        }
        Ok(())
    }

    fn validate_validator(&self) -> Result<(), ConfigError> {
        let v = &self.validator;
        if v.spike_window < 2 {
            return Err(invalid("validator.spike_window", "must be >= 2"));
        }
        if v.spike_min_periods < 2 || v.spike_min_periods > v.spike_window {
            return Err(invalid(
                "validator.spike_min_periods",
                "must be between 2 and spike_window",
            ));
        }
        if !(v.spike_z_threshold > 0.0) {
            return Err(invalid("validator.spike_z_threshold", "must be > 0"));
        }
        if !(v.gap_multiple > 0.0) {
            return Err(invalid("validator.gap_multiple", "must be > 0"));
        }
        Ok(())
    }

    fn validate_indicators(&self) -> Result<(), ConfigError> {
        let ind = &self.indicators;
        let windows = [
            ("indicators.rsi_period", ind.rsi_period),
            ("indicators.macd_fast", ind.macd_fast),
            ("indicators.macd_slow", ind.macd_slow),
            ("indicators.macd_signal", ind.macd_signal),
            ("indicators.bb_period", ind.bb_period),
            ("indicators.atr_period", ind.atr_period),
            ("indicators.momentum_period", ind.momentum_period),
        ];
        for (field, value) in windows {
            if value == 0 {
                return Err(invalid(field, "must be >= 1"));
            }
        }
        if ind.volatility_window < 2 {
            return Err(invalid("indicators.volatility_window", "must be >= 2"));
        }
        if ind.sma_periods.iter().chain(&ind.ema_periods).any(|&p| p == 0) {
            return Err(invalid("indicators.sma_periods/ema_periods", "periods must be >= 1"));
        }
        if ind.macd_fast >= ind.macd_slow {
            return Err(invalid(
                "indicators.macd_fast",
                format!("fast ({}) must be < slow ({})", ind.macd_fast, ind.macd_slow),
            ));
        }
        if !(ind.bb_std > 0.0) {
            return Err(invalid("indicators.bb_std", "must be > 0"));
        }
        if !(ind.trading_days_per_year > 0.0) {
            return Err(invalid("indicators.trading_days_per_year", "must be > 0"));
        }
        Ok(())
    }

    fn validate_heat_score(&self) -> Result<(), ConfigError> {
        let hs = &self.heat_score;
        for (name, weight) in hs.weights.named() {
            if !(0.0..=1.0).contains(&weight) {
                return Err(invalid(
                    format!("heat_score.weights.{name}"),
                    format!("{weight} is outside [0, 1]"),
                ));
            }
        }
        let total = hs.weights.sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(invalid(
                "heat_score.weights",
                format!("weights sum to {total:.4}, expected 1.0"),
            ));
        }
        let ranges: Vec<Domain> = hs.labels.iter().map(|b| b.range).collect();
        validate_brackets("heat_score.labels", &ranges)
    }

    fn validate_dca(&self) -> Result<(), ConfigError> {
        let dca = &self.dca;
        if !(dca.base_amount >= 0.0) {
            return Err(invalid("dca.base_amount", "must be >= 0"));
        }
        if dca.currency.trim().is_empty() {
            return Err(invalid("dca.currency", "must not be empty"));
        }
        if let Some(bad) = dca.brackets.iter().find(|b| !(b.multiplier >= 0.0)) {
            return Err(invalid(
                "dca.brackets",
                format!("multiplier for '{}' must be >= 0", bad.action),
            ));
        }
        let ranges: Vec<Domain> = dca.brackets.iter().map(|b| b.range).collect();
        validate_brackets("dca.brackets", &ranges)
    }

    fn validate_regime(&self) -> Result<(), ConfigError> {
        let r = &self.regime;
        if r.oversold_rsi >= r.overbought_rsi {
            return Err(invalid(
                "regime.oversold_rsi",
                format!(
                    "oversold ({}) must be below overbought ({})",
                    r.oversold_rsi, r.overbought_rsi
                ),
            ));
        }
        if r.extreme_drawdown_threshold > 0.0 {
            return Err(invalid("regime.extreme_drawdown_threshold", "must be <= 0"));
        }
        Ok(())
    }
}

/// Brackets must be non-empty, ascending, contiguous and span exactly [0, 100].
fn validate_brackets(field: &str, ranges: &[Domain]) -> Result<(), ConfigError> {
    let (first, last) = match (ranges.first(), ranges.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(invalid(field, "at least one bracket is required")),
    };
    if first.lo().abs() > BOUNDARY_EPSILON {
        return Err(invalid(field, format!("first bracket starts at {}, not 0", first.lo())));
    }
    if (last.hi() - 100.0).abs() > BOUNDARY_EPSILON {
        return Err(invalid(field, format!("last bracket ends at {}, not 100", last.hi())));
    }
    for (i, range) in ranges.iter().enumerate() {
        if !(range.lo() < range.hi()) {
            return Err(invalid(
                field,
                format!("bracket {i} [{}, {}) is empty", range.lo(), range.hi()),
            ));
        }
    }
    for (i, pair) in ranges.windows(2).enumerate() {
        let (prev, next) = (pair[0], pair[1]);
        if next.lo() > prev.hi() + BOUNDARY_EPSILON {
            return Err(invalid(
                field,
                format!("gap between bracket {i} (ends {}) and {} (starts {})", prev.hi(), i + 1, next.lo()),
            ));
        }
        if next.lo() < prev.hi() - BOUNDARY_EPSILON {
            return Err(invalid(
                field,
                format!("bracket {} overlaps bracket {i} ({} < {})", i + 1, next.lo(), prev.hi()),
            ));
        }
    }
    Ok(())
}
