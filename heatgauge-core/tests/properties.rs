//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Validator idempotence: validate(validate(x)) == validate(x)
//! 2. Heat score bounds and component shape for arbitrary snapshots
//! 3. DCA suggested amount is the rounded product of base and multiplier
//! 4. Cache merge size is |A| + |B| - overlap, with B winning

use chrono::{Duration, TimeZone, Utc};
use heatgauge_core::config::{DcaConfig, HeatScoreConfig, ValidatorConfig};
use heatgauge_core::data::{merge_bars, validate};
use heatgauge_core::decision::{compute_dca, round_cents};
use heatgauge_core::domain::Bar;
use heatgauge_core::heat_score::{compute_heat_score, ComponentKind, HeatLabel};
use heatgauge_core::indicators::{col, IndicatorSnapshot};
use heatgauge_core::regime::MarketRegime;
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_bar() -> impl Strategy<Value = Bar> {
    (
        0i64..120,
        prop_oneof![9 => (1.0..1000.0_f64), 1 => Just(f64::NAN)],
    )
        .prop_map(|(hour, close)| {
            let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
            Bar::new(ts, close, close * 1.01, close * 0.99, close, 1000.0)
        })
}

fn arb_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => (-1000.0..1000.0_f64),
        1 => (-1.0..1.0_f64),
        1 => Just(f64::NAN),
    ]
}

fn daily(range: std::ops::Range<i64>, close: f64) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    range
        .map(|i| Bar::new(base + Duration::days(i), close, close, close, close, 1.0))
        .collect()
}

// ── 1. Validator idempotence ─────────────────────────────────────────

proptest! {
    #[test]
    fn validate_is_idempotent(bars in prop::collection::vec(arb_bar(), 0..80)) {
        let config = ValidatorConfig::default();
        let once = validate(bars, &config);
        let twice = validate(once.clone(), &config);
        prop_assert_eq!(&once, &twice);
        prop_assert!(once.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        prop_assert!(once.iter().all(|b| !b.close.is_nan()));
    }

    #[test]
    fn tight_threshold_is_still_idempotent(bars in prop::collection::vec(arb_bar(), 25..80)) {
        let config = ValidatorConfig { spike_z_threshold: 2.0, ..ValidatorConfig::default() };
        let once = validate(bars, &config);
        prop_assert_eq!(validate(once.clone(), &config), once);
    }
}

// ── 2. Heat score bounds ─────────────────────────────────────────────

proptest! {
    #[test]
    fn heat_score_is_bounded(values in prop::collection::vec(arb_value(), 8)) {
        let names = [
            col::RSI, col::MACD_HIST, col::BB_PCT_B, col::DIST_SMA50,
            col::DRAWDOWN, col::VOLATILITY, col::MOMENTUM, col::DIST_SMA200,
        ];
        let snapshot = IndicatorSnapshot::from_pairs(names.iter().copied().zip(values));
        let result = compute_heat_score(&snapshot, &HeatScoreConfig::default());

        prop_assert!((0.0..=100.0).contains(&result.score));
        prop_assert_eq!(result.components.len(), 8);
        for (c, kind) in result.components.iter().zip(ComponentKind::ALL) {
            prop_assert_eq!(c.kind, kind);
            prop_assert!((0.0..=100.0).contains(&c.normalized));
            prop_assert!((c.contribution - c.normalized * c.weight).abs() < 1e-9);
        }
        prop_assert!((result.total_weight() - 1.0).abs() < 0.01);
    }
}

// ── 3. DCA rounding ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn suggested_amount_is_rounded_product(score in 0.0..=100.0_f64, base in 1.0..10_000.0_f64) {
        let config = DcaConfig { base_amount: base, ..DcaConfig::default() };
        let result = compute_dca(score, HeatLabel::Neutral, MarketRegime::Range, &config);
        prop_assert_eq!(result.suggested_amount, round_cents(base * result.multiplier));
        prop_assert!([0.5, 0.75, 1.0, 1.25, 2.0].contains(&result.multiplier));
        prop_assert_eq!(result.reasoning.len(), 6);
    }
}

// ── 4. Cache merge ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn merge_size_and_precedence(a_len in 0i64..40, b_start in 0i64..60, b_len in 0i64..40) {
        let a = daily(0..a_len, 1.0);
        let b = daily(b_start..b_start + b_len, 2.0);
        let overlap = (a_len.min(b_start + b_len) - b_start.max(0)).max(0);

        let merged = merge_bars(a, &b);
        prop_assert_eq!(merged.len() as i64, a_len + b_len - overlap);
        prop_assert!(merged.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        for bar in &merged {
            let in_b = b.iter().any(|x| x.timestamp == bar.timestamp);
            prop_assert_eq!(bar.close, if in_b { 2.0 } else { 1.0 });
        }
    }
}
