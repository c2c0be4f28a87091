//! Bar cleaning: ordering, duplicates, missing closes, price spikes, gaps.
//!
//! The validator never fails. It only drops rows, and every drop is logged
//! and counted in a [`ValidationReport`].

use crate::config::ValidatorConfig;
use crate::domain::Bar;
use chrono::Duration;

/// Counts of what one validation pass removed or flagged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub input_rows: usize,
    pub duplicates: usize,
    pub missing_close: usize,
    pub spikes: usize,
    /// Gaps are reported, never removed.
    pub gaps: usize,
}

impl ValidationReport {
    pub fn removed(&self) -> usize {
        self.duplicates + self.missing_close + self.spikes
    }
}

/// Clean a raw series. See [`validate_with_report`].
pub fn validate(bars: Vec<Bar>, config: &ValidatorConfig) -> Vec<Bar> {
    validate_with_report(bars, config).0
}

/// Clean a raw series and report what was removed.
///
/// Steps, in order:
/// 1. stable sort by timestamp
/// 2. drop duplicate timestamps, keeping the later occurrence
/// 3. drop rows whose close is missing
/// 4. drop return spikes whose rolling z-score exceeds the threshold,
///    repeated until no spike remains
/// 5. log gaps wider than `gap_multiple` × the median bar interval
pub fn validate_with_report(
    mut bars: Vec<Bar>,
    config: &ValidatorConfig,
) -> (Vec<Bar>, ValidationReport) {
    let mut report = ValidationReport {
        input_rows: bars.len(),
        ..Default::default()
    };
    if bars.is_empty() {
        return (bars, report);
    }

    bars.sort_by_key(|b| b.timestamp);

    let before = bars.len();
    bars = dedup_keep_last(bars);
    report.duplicates = before - bars.len();
    if report.duplicates > 0 {
        tracing::info!(removed = report.duplicates, "dropped duplicate timestamps");
    }

    let before = bars.len();
    bars.retain(Bar::has_close);
    report.missing_close = before - bars.len();
    if report.missing_close > 0 {
        tracing::info!(removed = report.missing_close, "dropped rows with missing close");
    }

    loop {
        let flagged = spike_mask(&bars, config);
        let count = flagged.iter().filter(|&&f| f).count();
        if count == 0 {
            break;
        }
        let mut flags = flagged.into_iter();
        bars.retain(|_| !flags.next().unwrap_or(false));
        report.spikes += count;
    }
    if report.spikes > 0 {
        tracing::warn!(
            removed = report.spikes,
            threshold = config.spike_z_threshold,
            "dropped price spikes"
        );
    }

    report.gaps = log_gaps(&bars, config.gap_multiple);

    if report.removed() > 0 {
        tracing::info!(
            input = report.input_rows,
            output = bars.len(),
            removed = report.removed(),
            "validation complete"
        );
    }
    (bars, report)
}

fn dedup_keep_last(bars: Vec<Bar>) -> Vec<Bar> {
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

/// Flag bars whose one-bar return is an outlier against the trailing window
/// of returns (current return included). Only runs when the series is longer
/// than the window.
fn spike_mask(bars: &[Bar], config: &ValidatorConfig) -> Vec<bool> {
    let n = bars.len();
    let window = config.spike_window.max(2);
    if n <= window {
        return vec![false; n];
    }

    let mut returns = vec![f64::NAN; n];
    for i in 1..n {
        returns[i] = bars[i].close / bars[i - 1].close - 1.0;
    }

    (0..n)
        .map(|i| {
            let r = returns[i];
            if !r.is_finite() {
                return false;
            }
            let start = (i + 1).saturating_sub(window);
            let valid: Vec<f64> = returns[start..=i]
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            if valid.len() < config.spike_min_periods.max(2) {
                return false;
            }
            let mean = valid.iter().sum::<f64>() / valid.len() as f64;
            let var = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (valid.len() - 1) as f64;
            let std = var.sqrt();
            if std == 0.0 || !std.is_finite() {
                return false;
            }
            ((r - mean) / std).abs() > config.spike_z_threshold
        })
        .collect()
}

fn log_gaps(bars: &[Bar], gap_multiple: f64) -> usize {
    if bars.len() < 3 {
        return 0;
    }
    let mut intervals: Vec<Duration> = bars
        .windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .collect();
    let mut sorted = intervals.clone();
    sorted.sort();
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2
    } else {
        sorted[mid]
    };
    if median <= Duration::zero() {
        return 0;
    }

    let limit_secs = median.num_seconds() as f64 * gap_multiple;
    let mut gaps = 0;
    for (i, interval) in intervals.drain(..).enumerate() {
        if interval.num_seconds() as f64 > limit_secs {
            gaps += 1;
            tracing::debug!(
                from = %bars[i].timestamp,
                to = %bars[i + 1].timestamp,
                hours = interval.num_hours(),
                "timestamp gap"
            );
        }
    }
    if gaps > 0 {
        tracing::info!(gaps, median_secs = median.num_seconds(), "detected timestamp gaps");
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(i: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i)
    }

    fn bar(i: i64, close: f64) -> Bar {
        Bar::new(at(i), close, close, close, close, 100.0)
    }

    /// Alternates 100 / 102 so returns swing ±2% with a stable spread.
    fn zigzag(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| bar(i as i64, if i % 2 == 0 { 100.0 } else { 102.0 }))
            .collect()
    }

    #[test]
    fn empty_input_is_empty_output() {
        let (out, report) = validate_with_report(Vec::new(), &ValidatorConfig::default());
        assert!(out.is_empty());
        assert_eq!(report, ValidationReport::default());
    }

    #[test]
    fn sorts_and_keeps_later_duplicate() {
        let bars = vec![bar(2, 12.0), bar(0, 10.0), bar(1, 11.0), bar(1, 11.5)];
        let (out, report) = validate_with_report(bars, &ValidatorConfig::default());
        assert_eq!(report.duplicates, 1);
        let closes: Vec<f64> = out.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![10.0, 11.5, 12.0]);
    }

    #[test]
    fn drops_missing_close() {
        let bars = vec![bar(0, 10.0), bar(1, f64::NAN), bar(2, 12.0)];
        let (out, report) = validate_with_report(bars, &ValidatorConfig::default());
        assert_eq!(report.missing_close, 1);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn removes_only_the_spike_bar() {
        let mut bars = zigzag(40);
        bars[30].close *= 1.5;
        let spiked_ts = bars[30].timestamp;
        let config = ValidatorConfig {
            spike_z_threshold: 3.0,
            ..Default::default()
        };
        let (out, report) = validate_with_report(bars, &config);
        assert_eq!(report.spikes, 1);
        assert_eq!(out.len(), 39);
        assert!(out.iter().all(|b| b.timestamp != spiked_ts));
    }

    #[test]
    fn default_threshold_keeps_moderate_moves() {
        let mut bars = zigzag(40);
        bars[30].close *= 1.5;
        let out = validate(bars, &ValidatorConfig::default());
        assert_eq!(out.len(), 40);
    }

    #[test]
    fn short_series_skips_spike_filter() {
        let mut bars = zigzag(20);
        bars[15].close *= 10.0;
        let config = ValidatorConfig {
            spike_z_threshold: 1.0,
            ..Default::default()
        };
        assert_eq!(validate(bars, &config).len(), 20);
    }

    #[test]
    fn gaps_are_counted_not_removed() {
        let mut bars = zigzag(10);
        for (i, b) in bars.iter_mut().enumerate().skip(5) {
            b.timestamp = at(i as i64 + 48);
        }
        let (out, report) = validate_with_report(bars, &ValidatorConfig::default());
        assert_eq!(out.len(), 10);
        assert_eq!(report.gaps, 1);
    }

    #[test]
    fn clean_input_is_unchanged() {
        let bars = zigzag(60);
        assert_eq!(validate(bars.clone(), &ValidatorConfig::default()), bars);
    }

    #[test]
    fn even_interval_count_uses_mean_of_middle_pair() {
        // Intervals 1,1,1,3,3,12 hours: median 2h, so 12h clears the 10h limit.
        let bars: Vec<Bar> = [0, 1, 2, 3, 6, 9, 21].iter().map(|&h| bar(h, 100.0)).collect();
        let (out, report) = validate_with_report(bars, &ValidatorConfig::default());
        assert_eq!(out.len(), 7);
        assert_eq!(report.gaps, 1);
    }
}
