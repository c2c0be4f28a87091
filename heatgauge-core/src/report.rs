//! Markdown report assembled from one pipeline run's results.

use crate::decision::DcaResult;
use crate::heat_score::HeatScoreResult;
use crate::indicators::{col, IndicatorSnapshot};
use crate::regime::RegimeResult;
use chrono::{DateTime, Utc};

const DISCLAIMER: &str = "> This report is generated automatically for informational and educational \
purposes only. It is **not financial advice**. The Heat Score and DCA recommendations are based on \
technical indicators with fixed normalization ranges that may not be appropriate in all market \
conditions. Past performance does not guarantee future results. Always consult a qualified \
financial advisor before making investment decisions.";

/// Everything the report reads.
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub heat: &'a HeatScoreResult,
    pub regime: &'a RegimeResult,
    pub dca: &'a DcaResult,
    pub active_symbol: &'a str,
    pub used_fallback: bool,
    pub fallback_reason: Option<&'a str>,
    pub latest: &'a IndicatorSnapshot,
    pub generated_at: DateTime<Utc>,
}

fn pct(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

fn section(out: &mut String, title: &str) {
    out.push_str("\n---\n\n");
    out.push_str(&format!("## {title}\n"));
}

pub fn render_report(input: &ReportInput<'_>) -> String {
    let ReportInput {
        heat,
        regime,
        dca,
        latest,
        ..
    } = *input;
    let mut out = String::new();

    out.push_str("# Market Analysis Report\n");
    out.push_str(&format!(
        "**Generated:** {}\n",
        input.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));

    section(&mut out, "Data Source");
    out.push_str(&format!("- **Active Symbol:** {}\n", input.active_symbol));
    if input.used_fallback {
        out.push_str("- **Fallback Used:** Yes\n");
        out.push_str(&format!("- **Reason:** {}\n", input.fallback_reason.unwrap_or("unknown")));
    } else {
        out.push_str("- **Fallback Used:** No (primary symbol active)\n");
    }
    out.push_str(&format!("- **Latest Close:** {:.2}\n", latest.close().unwrap_or(0.0)));

    section(&mut out, "Heat Score");
    out.push_str(&format!("**Score: {:.1} / 100 ({})**\n", heat.score, heat.label));
    out.push('\n');
    out.push_str("| Component | Raw Value | Normalized | Weight | Contribution |\n");
    out.push_str("|-----------|-----------|------------|--------|--------------|\n");
    for c in &heat.components {
        let raw = if c.raw_value.abs() < 1.0 {
            format!("{:.4}", c.raw_value)
        } else {
            format!("{:.2}", c.raw_value)
        };
        out.push_str(&format!(
            "| {} | {raw} | {:.1} | {} | {:.1} |\n",
            c.name(),
            c.normalized,
            pct(c.weight),
            c.contribution
        ));
    }
    out.push_str(&format!(
        "| **Total** | | | **{}** | **{:.1}** |\n",
        pct(heat.total_weight()),
        heat.score
    ));

    section(&mut out, "Market Regime");
    out.push_str(&format!("- **Regime:** {}\n", regime.regime));
    out.push_str(&format!("- **Confidence:** {}\n", pct(regime.confidence)));
    if regime.risk_flags.is_empty() {
        out.push_str("- **Risk Flags:** None\n");
    } else {
        let flags: Vec<&str> = regime.risk_flags.iter().map(|f| f.label()).collect();
        out.push_str(&format!("- **Risk Flags:** {}\n", flags.join(", ")));
    }
    out.push('\n');
    for (key, detail) in &regime.details {
        out.push_str(&format!("- *{key}:* {detail}\n"));
    }

    section(&mut out, "DCA Recommendation");
    out.push_str(&format!("- **Action:** {}\n", dca.action));
    out.push_str(&format!("- **Multiplier:** {:?}x\n", dca.multiplier));
    out.push_str(&format!("- **Base Amount:** {} {:.2}\n", dca.currency, dca.base_amount));
    out.push_str(&format!(
        "- **Suggested Amount:** {} {:.2}\n",
        dca.currency, dca.suggested_amount
    ));
    out.push('\n');
    out.push_str("**Reasoning:**\n");
    for line in &dca.reasoning {
        out.push_str(&format!("- {line}\n"));
    }

    section(&mut out, "Key Levels");
    for (name, column) in [
        ("SMA 50", col::SMA_50),
        ("SMA 200", col::SMA_200),
        ("Bollinger Lower", col::BB_LOWER),
        ("Bollinger Upper", col::BB_UPPER),
    ] {
        if let Some(level) = latest.get(column) {
            out.push_str(&format!("- **{name}:** {level:.2}\n"));
        }
    }

    section(&mut out, "Disclaimer");
    out.push('\n');
    out.push_str(DISCLAIMER);
    out.push('\n');

    tracing::debug!(chars = out.len(), "report rendered");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DcaConfig, HeatScoreConfig, RegimeConfig};
    use crate::decision::compute_dca;
    use crate::heat_score::compute_heat_score;
    use crate::regime::detect_regime;
    use chrono::TimeZone;

    fn render(latest: &IndicatorSnapshot, used_fallback: bool) -> String {
        let heat = compute_heat_score(latest, &HeatScoreConfig::default());
        let regime = detect_regime(latest, None, &RegimeConfig::default());
        let dca = compute_dca(heat.score, heat.label, regime.regime, &DcaConfig::default());
        render_report(&ReportInput {
            heat: &heat,
            regime: &regime,
            dca: &dca,
            active_symbol: if used_fallback { "SPY" } else { "SXR8.DE" },
            used_fallback,
            fallback_reason: used_fallback.then_some("SXR8.DE returned only 3 hourly rows"),
            latest,
            generated_at: Utc.with_ymd_and_hms(2024, 6, 28, 21, 5, 0).unwrap(),
        })
    }

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot::from_pairs([
            (col::CLOSE, 550.0),
            (col::SMA_50, 530.0),
            (col::SMA_200, 500.0),
            (col::RSI, 62.0),
            (col::BB_LOWER, 520.0),
        ])
    }

    #[test]
    fn contains_every_section() {
        let report = render(&snapshot(), false);
        for heading in [
            "# Market Analysis Report",
            "**Generated:** 2024-06-28 21:05 UTC",
            "## Data Source",
            "## Heat Score",
            "## Market Regime",
            "## DCA Recommendation",
            "## Key Levels",
            "## Disclaimer",
        ] {
            assert!(report.contains(heading), "missing {heading}");
        }
        assert!(report.contains("- **Fallback Used:** No (primary symbol active)"));
        assert!(report.contains("- **Latest Close:** 550.00"));
        assert!(report.contains("| **Total** | | | **100%** |"));
        assert!(report.contains("- **Regime:** Trend Up"));
    }

    #[test]
    fn component_rows_and_levels() {
        let report = render(&snapshot(), false);
        assert_eq!(report.matches("\n| ").count(), 1 + 8 + 1);
        assert!(report.contains("| RSI | 62.00 | 62.0 | 20% | 12.4 |"));
        assert!(report.contains("- **SMA 50:** 530.00"));
        assert!(report.contains("- **Bollinger Lower:** 520.00"));
        assert!(!report.contains("Bollinger Upper"));
    }

    #[test]
    fn fallback_reason_is_reported() {
        let report = render(&snapshot(), true);
        assert!(report.contains("- **Active Symbol:** SPY"));
        assert!(report.contains("- **Fallback Used:** Yes"));
        assert!(report.contains("- **Reason:** SXR8.DE returned only 3 hourly rows"));
    }

    #[test]
    fn lines_and_section_rules_are_laid_out_in_order() {
        let report = render(&snapshot(), false);
        assert!(report.starts_with(
            "# Market Analysis Report\n\
             **Generated:** 2024-06-28 21:05 UTC\n\
             \n---\n\n## Data Source\n\
             - **Active Symbol:** SXR8.DE\n"
        ));
        assert_eq!(report.matches("\n---\n\n## ").count(), 6);
        assert!(report.contains("**Reasoning:**\n- "));
        assert!(report.ends_with('\n'));
    }
}
