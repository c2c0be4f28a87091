//! Heatgauge Core: market data pipeline, heat score and contribution sizing.
//!
//! Stages, in pipeline order:
//! - Data acquisition with primary/fallback symbol selection
//! - Validation (ordering, duplicates, missing closes, return spikes)
//! - Parquet bar store with merge-on-write and refresh metadata
//! - Indicator engine (causal rolling windows only)
//! - Regime detection and risk flags
//! - Heat score (8 weighted components) and DCA multiplier
//! - Markdown report
//!
//! The `orchestrator` ties the stages together behind per-symbol
//! single-flight loading and atomically published state.

pub mod config;
pub mod data;
pub mod decision;
pub mod domain;
pub mod heat_score;
pub mod indicators;
pub mod orchestrator;
pub mod regime;
pub mod report;

pub use config::{AppConfig, ConfigError};
pub use orchestrator::{Orchestrator, Phase, PipelineError, PipelineState, StateSummary};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<indicators::IndicatorFrame>();
        require_sync::<indicators::IndicatorFrame>();
        require_send::<PipelineState>();
        require_sync::<PipelineState>();
        require_send::<Orchestrator>();
        require_sync::<Orchestrator>();
        require_send::<data::BarStore>();
        require_sync::<data::BarStore>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
        require_send::<AppConfig>();
        require_sync::<AppConfig>();
    }
}
