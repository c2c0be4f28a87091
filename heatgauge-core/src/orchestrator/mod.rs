//! Per-symbol pipeline orchestration.
//!
//! Each symbol owns a slot in a concurrent map. A slot pairs a gate mutex,
//! held for the whole load or refresh body, with the published state behind a
//! read-write lock. Readers only touch the read lock, so they always see a
//! complete `PipelineState` (old or new). Callers that queue on the gate while
//! another thread loads observe that thread's result instead of fetching again.

mod state;

pub use state::{Phase, PipelineState, StateSummary};

use crate::config::{AppConfig, ConfigError, SymbolInfo};
use crate::data::{
    acquire, series_hash, validate, Acquisition, BarStore, CacheMetadata, CacheStatus, DataError,
    DataProvider, FallbackPolicy,
};
use crate::decision::compute_dca;
use crate::domain::Timeframe;
use crate::heat_score::compute_heat_score;
use crate::indicators::compute_indicators;
use crate::regime::detect_regime;
use crate::report::{render_report, ReportInput};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rayon::prelude::*;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;

/// Errors surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No daily data survived indicator computation. Retry with `refresh`.
    #[error("{symbol} is not ready: no daily data available")]
    NotReady { symbol: String },

    #[error("unknown symbol: {symbol}")]
    UnknownSymbol { symbol: String },

    #[error(transparent)]
    Storage(#[from] DataError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Whether a later refresh may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::NotReady { .. })
    }
}

type Outcome = Result<Arc<PipelineState>, PipelineError>;

#[derive(Debug, Default)]
struct SlotState {
    phase: Phase,
    state: Option<Arc<PipelineState>>,
    /// Bumped on every publication, successful or not.
    generation: u64,
}

#[derive(Debug, Default)]
struct SymbolSlot {
    gate: Mutex<()>,
    current: RwLock<SlotState>,
}

impl SymbolSlot {
    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, f: impl FnOnce(&SlotState) -> T) -> T {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut SlotState) -> T) -> T {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// The settled result, or `None` while the slot is unloaded or loading.
    fn settled(&self, symbol: &str) -> Option<Outcome> {
        self.read(|s| match (s.phase, &s.state) {
            (Phase::Ready, Some(state)) => Some(Ok(Arc::clone(state))),
            (Phase::Failed, _) => Some(Err(PipelineError::NotReady {
                symbol: symbol.to_string(),
            })),
            _ => None,
        })
    }

    fn publish(&self, outcome: Outcome) -> Outcome {
        self.write(|s| {
            s.generation += 1;
            match &outcome {
                Ok(state) => {
                    s.phase = Phase::Ready;
                    s.state = Some(Arc::clone(state));
                }
                // The previous snapshot stays readable.
                Err(_) => s.phase = Phase::Failed,
            }
        });
        outcome
    }
}

/// Owns the per-symbol state table and drives the pipeline.
pub struct Orchestrator {
    config: AppConfig,
    provider: Arc<dyn DataProvider>,
    store: BarStore,
    slots: DashMap<String, Arc<SymbolSlot>>,
}

impl Orchestrator {
    /// Validates `config` and opens the bar store at `config.data.cache_dir`.
    pub fn new(config: AppConfig, provider: Arc<dyn DataProvider>) -> Result<Self, PipelineError> {
        config.validate()?;
        let store = BarStore::new(config.data.cache_dir.clone());
        tracing::info!(
            provider = provider.name(),
            cache_dir = %store.cache_dir().display(),
            symbols = config.symbols.list.len(),
            "orchestrator ready"
        );
        Ok(Self {
            config,
            provider,
            store,
            slots: DashMap::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &BarStore {
        &self.store
    }

    /// Configured symbols with display names.
    pub fn symbols(&self) -> &[SymbolInfo] {
        &self.config.symbols.list
    }

    fn is_known(&self, symbol: &str) -> bool {
        self.config.symbols.contains(symbol)
            || self.config.symbols.fallback.as_deref() == Some(symbol)
    }

    fn check_known(&self, symbol: &str) -> Result<(), PipelineError> {
        if self.is_known(symbol) {
            Ok(())
        } else {
            Err(PipelineError::UnknownSymbol {
                symbol: symbol.to_string(),
            })
        }
    }

    fn slot(&self, symbol: &str) -> Arc<SymbolSlot> {
        Arc::clone(self.slots.entry(symbol.to_string()).or_default().value())
    }

    /// The published state for `symbol`, loading it on first use.
    ///
    /// The first load comes from the cache when it is fresh, otherwise from a
    /// full refresh. A symbol whose last load failed reports `NotReady` until
    /// `refresh` succeeds.
    pub fn get_state(&self, symbol: &str) -> Result<Arc<PipelineState>, PipelineError> {
        self.check_known(symbol)?;
        let slot = self.slot(symbol);
        if let Some(outcome) = slot.settled(symbol) {
            return outcome;
        }

        let _gate = slot.lock_gate();
        if let Some(outcome) = slot.settled(symbol) {
            return outcome;
        }
        slot.write(|s| s.phase = Phase::Loading);
        let outcome = self.load_or_refresh(symbol);
        if let Err(e) = &outcome {
            tracing::error!(symbol, error = %e, "initial load failed");
        }
        slot.publish(outcome)
    }

    /// Run the full pipeline for `symbol` and publish the result.
    ///
    /// Concurrent calls collapse: a caller that waited on an in-flight
    /// refresh returns that refresh's result.
    pub fn refresh(&self, symbol: &str) -> Result<Arc<PipelineState>, PipelineError> {
        self.check_known(symbol)?;
        let slot = self.slot(symbol);
        let seen = slot.read(|s| s.generation);

        let _gate = slot.lock_gate();
        if slot.read(|s| s.generation) != seen {
            tracing::debug!(symbol, "joined in-flight refresh");
            if let Some(outcome) = slot.settled(symbol) {
                return outcome;
            }
        }
        slot.write(|s| s.phase = Phase::Loading);
        let outcome = self.run_pipeline(symbol);
        if let Err(e) = &outcome {
            tracing::error!(symbol, error = %e, "refresh failed");
        }
        slot.publish(outcome)
    }

    /// Refresh every configured symbol in parallel.
    pub fn refresh_all(&self) -> Vec<(String, Result<Arc<PipelineState>, PipelineError>)> {
        self.config
            .symbols
            .list
            .par_iter()
            .map(|info| (info.symbol.clone(), self.refresh(&info.symbol)))
            .collect()
    }

    /// Load the default symbol. When it resolved to its fallback, the
    /// fallback's slot is seeded with the same state.
    pub fn initialize(&self) -> Result<Arc<PipelineState>, PipelineError> {
        let default = self
            .config
            .symbols
            .default_symbol()
            .ok_or_else(|| ConfigError::Invalid {
                field: "symbols.default".to_string(),
                reason: "no default symbol".to_string(),
            })?
            .to_string();

        let state = self.get_state(&default)?;
        let active = state.active_symbol();
        if active != default {
            let slot = self.slot(active);
            let _gate = slot.lock_gate();
            if slot.read(|s| s.phase) != Phase::Ready {
                slot.publish(Ok(Arc::clone(&state)))?;
                tracing::info!(symbol = %default, active, "seeded fallback symbol state");
            }
        }
        Ok(state)
    }

    /// The published state, without triggering a load.
    pub fn snapshot(&self, symbol: &str) -> Option<Arc<PipelineState>> {
        self.slots
            .get(symbol)
            .and_then(|slot| slot.read(|s| s.state.clone()))
    }

    pub fn status(&self, symbol: &str) -> Phase {
        self.slots
            .get(symbol)
            .map(|slot| slot.read(|s| s.phase))
            .unwrap_or_default()
    }

    /// On-disk cache state of every configured symbol.
    pub fn cache_status(&self) -> Vec<CacheStatus> {
        let symbols: Vec<&str> = self
            .config
            .symbols
            .list
            .iter()
            .map(|s| s.symbol.as_str())
            .collect();
        self.store.status(&symbols)
    }

    fn load_or_refresh(&self, symbol: &str) -> Outcome {
        if self.store.needs_refresh(self.config.data.max_age_hours, symbol) {
            return self.run_pipeline(symbol);
        }
        let Some(meta) = self.store.load_metadata(symbol) else {
            return self.run_pipeline(symbol);
        };

        let daily = self.store.load(&meta.active_symbol, Timeframe::Daily)?;
        if daily.is_empty() {
            tracing::warn!(symbol, active = %meta.active_symbol, "metadata present but no cached daily bars");
            return self.run_pipeline(symbol);
        }
        let hourly = self.store.load(&meta.active_symbol, Timeframe::Hourly)?;
        tracing::info!(
            symbol,
            active = %meta.active_symbol,
            hourly = hourly.len(),
            daily = daily.len(),
            "loaded from cache"
        );

        let acquisition = Acquisition {
            hourly,
            daily,
            active_symbol: meta.active_symbol,
            used_fallback: meta.used_fallback,
            fallback_reason: meta.fallback_reason,
        };
        self.build_state(symbol, acquisition, meta.last_refresh)
            .map(Arc::new)
    }

    fn run_pipeline(&self, symbol: &str) -> Outcome {
        tracing::info!(symbol, "refresh started");
        let policy = FallbackPolicy::for_symbol(&self.config, symbol);
        let fetched = acquire(self.provider.as_ref(), symbol, policy, &self.config.data);

        let hourly = validate(fetched.hourly, &self.config.validator);
        let daily = validate(fetched.daily, &self.config.validator);
        let active = fetched.active_symbol;
        let hourly_rows = self.store.save(&hourly, Timeframe::Hourly, &active)?;
        let daily_rows = self.store.save(&daily, Timeframe::Daily, &active)?;

        let now = Utc::now();
        let acquisition = Acquisition {
            hourly,
            daily,
            active_symbol: active,
            used_fallback: fetched.used_fallback,
            fallback_reason: fetched.fallback_reason,
        };
        let state = self.build_state(symbol, acquisition, now)?;

        let stored_daily = self.store.load(&state.active_symbol, Timeframe::Daily)?;
        let meta = CacheMetadata {
            last_refresh: now,
            active_symbol: state.active_symbol.clone(),
            used_fallback: state.used_fallback,
            fallback_reason: state.fallback_reason.clone(),
            hourly_rows,
            daily_rows,
            data_hash: series_hash(&stored_daily)?,
        };
        self.store.write_metadata(symbol, &meta)?;

        tracing::info!(
            symbol,
            active = %state.active_symbol,
            score = format_args!("{:.1}", state.heat_score.score),
            "refresh finished"
        );
        Ok(Arc::new(state))
    }

    fn build_state(
        &self,
        symbol: &str,
        acquisition: Acquisition,
        last_refresh: DateTime<Utc>,
    ) -> Result<PipelineState, PipelineError> {
        let indicators = &self.config.indicators;
        let hourly = compute_indicators(acquisition.hourly, indicators);
        let daily = compute_indicators(acquisition.daily, indicators);

        let Some(latest) = daily.latest() else {
            tracing::warn!(symbol, active = %acquisition.active_symbol, "no daily data after indicators");
            return Err(PipelineError::NotReady {
                symbol: symbol.to_string(),
            });
        };
        let previous = daily.previous();

        let regime = detect_regime(&latest, previous.as_ref(), &self.config.regime);
        let heat_score = compute_heat_score(&latest, &self.config.heat_score);
        let dca = compute_dca(heat_score.score, heat_score.label, regime.regime, &self.config.dca);
        let report = render_report(&ReportInput {
            heat: &heat_score,
            regime: &regime,
            dca: &dca,
            active_symbol: &acquisition.active_symbol,
            used_fallback: acquisition.used_fallback,
            fallback_reason: acquisition.fallback_reason.as_deref(),
            latest: &latest,
            generated_at: Utc::now(),
        });

        Ok(PipelineState {
            symbol: symbol.to_string(),
            active_symbol: acquisition.active_symbol,
            used_fallback: acquisition.used_fallback,
            fallback_reason: acquisition.fallback_reason,
            hourly,
            daily,
            latest,
            regime,
            heat_score,
            dca,
            report,
            last_refresh,
            ready: true,
        })
    }
}
