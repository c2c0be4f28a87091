//! Concurrency tests for the orchestrator: single-flight first loads and
//! independent per-symbol refreshes.

use chrono::{TimeZone, Utc};
use heatgauge_core::data::{DataError, DataProvider, FetchResult, SyntheticProvider};
use heatgauge_core::domain::Timeframe;
use heatgauge_core::{AppConfig, Orchestrator, Phase};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Synthetic data behind a fetch counter and an artificial delay, so
/// concurrent callers pile up on the symbol lock.
struct CountingProvider {
    inner: SyntheticProvider,
    fetches: AtomicUsize,
    delay: Duration,
}

impl CountingProvider {
    fn new(delay: Duration) -> Self {
        let end = Utc.with_ymd_and_hms(2024, 6, 28, 20, 0, 0).unwrap();
        Self {
            inner: SyntheticProvider::new(11).with_end(end),
            fetches: AtomicUsize::new(0),
            delay,
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl DataProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn fetch(&self, symbol: &str, timeframe: Timeframe, period: &str) -> Result<FetchResult, DataError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.inner.fetch(symbol, timeframe, period)
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn orchestrator(dir: &std::path::Path, provider: Arc<CountingProvider>) -> Arc<Orchestrator> {
    let mut config = AppConfig::default();
    config.data.cache_dir = dir.to_path_buf();
    Arc::new(Orchestrator::new(config, provider).unwrap())
}

#[test]
fn concurrent_first_requests_trigger_one_refresh() {
    const CALLERS: usize = 8;
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::new(Duration::from_millis(50)));
    let orch = orchestrator(dir.path(), Arc::clone(&provider));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let orch = Arc::clone(&orch);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                orch.get_state("QQQ").unwrap()
            })
        })
        .collect();
    let states: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // One refresh = one hourly fetch + one daily fetch.
    assert_eq!(provider.fetches(), 2);
    for state in &states[1..] {
        assert!(Arc::ptr_eq(&states[0], state));
    }
    assert_eq!(orch.status("QQQ"), Phase::Ready);
}

#[test]
fn concurrent_refreshes_of_a_loaded_symbol_share_one_run() {
    const CALLERS: usize = 8;
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::new(Duration::from_millis(50)));
    let orch = orchestrator(dir.path(), Arc::clone(&provider));
    let loaded = orch.get_state("QQQ").unwrap();
    assert_eq!(provider.fetches(), 2);

    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let orch = Arc::clone(&orch);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                orch.refresh("QQQ").unwrap()
            })
        })
        .collect();
    let states: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Callers queued behind the first run return its result.
    assert_eq!(provider.fetches(), 4);
    assert!(!Arc::ptr_eq(&loaded, &states[0]));
    for state in &states[1..] {
        assert!(Arc::ptr_eq(&states[0], state));
    }
    assert!(Arc::ptr_eq(&states[0], &orch.snapshot("QQQ").unwrap()));
    assert_eq!(orch.status("QQQ"), Phase::Ready);
}

#[test]
fn readers_see_a_complete_state_during_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::new(Duration::from_millis(20)));
    let orch = orchestrator(dir.path(), Arc::clone(&provider));
    let first = orch.get_state("SPY").unwrap();

    let refresher = {
        let orch = Arc::clone(&orch);
        thread::spawn(move || orch.refresh("SPY").unwrap())
    };
    for _ in 0..20 {
        let seen = orch.snapshot("SPY").unwrap();
        assert!(seen.is_ready());
        assert_eq!(seen.daily().len(), seen.rows(Timeframe::Daily));
        thread::sleep(Duration::from_millis(2));
    }
    let second = refresher.join().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&second, &orch.snapshot("SPY").unwrap()));
    assert!(second.last_refresh() >= first.last_refresh());
}

#[test]
fn refresh_all_covers_every_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::new(Duration::ZERO));
    let orch = orchestrator(dir.path(), Arc::clone(&provider));

    let results = orch.refresh_all();
    let symbols: Vec<&str> = orch.symbols().iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(results.len(), symbols.len());
    for (symbol, outcome) in &results {
        let state = outcome.as_ref().unwrap();
        assert_eq!(state.symbol(), symbol);
        assert_eq!(orch.status(symbol), Phase::Ready);
    }
    assert_eq!(provider.fetches(), 2 * symbols.len());

    let cached = orch.cache_status();
    assert!(cached.iter().all(|s| s.cached));
}
