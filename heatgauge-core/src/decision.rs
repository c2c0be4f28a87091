//! Contribution sizing: heat score → DCA multiplier via configured brackets.

use crate::config::{find_bracket, DcaConfig};
use crate::heat_score::HeatLabel;
use crate::regime::MarketRegime;
use serde::{Deserialize, Serialize};

const DEFAULT_ACTION: &str = "Normal DCA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaResult {
    pub action: String,
    pub base_amount: f64,
    pub multiplier: f64,
    /// `base_amount * multiplier`, rounded to cents.
    pub suggested_amount: f64,
    pub currency: String,
    pub reasoning: Vec<String>,
}

/// Round half away from zero to two decimals.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pick the first bracket containing `score` (topmost bracket closed at its
/// upper bound). No match means "Normal DCA" at 1.0×.
pub fn compute_dca(score: f64, label: HeatLabel, regime: MarketRegime, config: &DcaConfig) -> DcaResult {
    let matched = find_bracket(config.brackets.iter().map(|b| &b.range), score)
        .map(|i| &config.brackets[i]);

    let (action, multiplier) = match matched {
        Some(bracket) => (bracket.action.clone(), bracket.multiplier),
        None => (DEFAULT_ACTION.to_string(), 1.0),
    };
    let base = config.base_amount;
    let currency = &config.currency;
    let suggested = round_cents(base * multiplier);

    let bracket_line = match matched {
        Some(b) => format!(
            "Score falls in bracket [{}-{}] → {action} ({multiplier:?}x)",
            b.range.lo(),
            b.range.hi()
        ),
        None => format!("Score falls in no configured bracket → {action} ({multiplier:?}x)"),
    };

    let closing = if multiplier > 1.0 {
        "Market conditions suggest opportunity, consider increasing allocation"
    } else if multiplier < 1.0 {
        "Market conditions suggest caution, consider reducing allocation"
    } else {
        "Market conditions are neutral, maintain regular DCA schedule"
    };

    let reasoning = vec![
        format!("Heat Score is {score:.1} ({label})"),
        format!("Market regime: {regime}"),
        bracket_line,
        format!("Base monthly contribution: {currency} {base:.2}"),
        format!("Suggested contribution: {currency} {suggested:.2}"),
        closing.to_string(),
    ];

    tracing::info!(%action, multiplier, suggested, currency = %currency, "dca decision");

    DcaResult {
        action,
        base_amount: base,
        multiplier,
        suggested_amount: suggested,
        currency: currency.clone(),
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dca(score: f64) -> DcaResult {
        compute_dca(score, HeatLabel::Neutral, MarketRegime::Range, &DcaConfig::default())
    }

    #[test]
    fn brackets_map_to_actions() {
        let cases = [
            (0.0, "Aggressive Buy", 2.0),
            (15.0, "Aggressive Buy", 2.0),
            (30.0, "Moderate Buy", 1.25),
            (37.0, "Moderate Buy", 1.25),
            (55.0, "Normal DCA", 1.0),
            (72.0, "Reduce", 0.75),
            (90.0, "Minimal", 0.5),
            (100.0, "Minimal", 0.5),
        ];
        for (score, action, mult) in cases {
            let r = dca(score);
            assert_eq!(r.action, action, "score {score}");
            assert_eq!(r.multiplier, mult, "score {score}");
        }
    }

    #[test]
    fn suggested_amount_is_rounded_product() {
        assert_eq!(dca(15.0).suggested_amount, 1000.0);
        assert_eq!(dca(55.0).suggested_amount, 500.0);
        assert_eq!(dca(90.0).suggested_amount, 250.0);
        assert_eq!(dca(35.0).suggested_amount, 625.0);
        assert_eq!(round_cents(333.333), 333.33);
        assert_eq!(round_cents(0.125 * 10.0), 1.25);
    }

    #[test]
    fn reasoning_is_ordered() {
        let r = compute_dca(15.0, HeatLabel::Fear, MarketRegime::TrendDown, &DcaConfig::default());
        assert_eq!(r.currency, "EUR");
        assert_eq!(r.reasoning.len(), 6);
        assert_eq!(r.reasoning[0], "Heat Score is 15.0 (Fear)");
        assert_eq!(r.reasoning[1], "Market regime: Trend Down");
        assert_eq!(r.reasoning[2], "Score falls in bracket [0-30] → Aggressive Buy (2.0x)");
        assert_eq!(r.reasoning[3], "Base monthly contribution: EUR 500.00");
        assert_eq!(r.reasoning[4], "Suggested contribution: EUR 1000.00");
        assert!(r.reasoning[5].contains("opportunity"));
    }

    #[test]
    fn closing_sentence_tracks_multiplier() {
        assert!(dca(55.0).reasoning[5].contains("neutral"));
        assert!(dca(90.0).reasoning[5].contains("caution"));
    }

    #[test]
    fn out_of_range_score_falls_back_to_normal() {
        let r = dca(150.0);
        assert_eq!(r.action, "Normal DCA");
        assert_eq!(r.multiplier, 1.0);
        assert_eq!(r.suggested_amount, 500.0);
    }
}
