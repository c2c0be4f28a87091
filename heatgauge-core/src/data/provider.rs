//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over market data sources (Yahoo Finance,
//! synthetic random walks) so we can swap implementations and mock for tests.

use crate::domain::{Bar, Timeframe};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for data operations.
///
/// Acquisition turns provider errors into empty series; the cache errors
/// propagate to the orchestrator.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    YahooFinance,
    Synthetic,
}

/// Result of a successful fetch for one symbol and timeframe.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: Vec<Bar>,
    pub source: DataSource,
}

/// Trait for market data providers.
///
/// Implementations return UTC-stamped bars in provider order; they may return
/// fewer rows than the period implies. Sorting, deduplication and cleaning
/// happen downstream in the validator.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch bars for `symbol` at `timeframe` covering the trailing `period`
    /// (provider range syntax such as "60d" or "5y").
    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        period: &str,
    ) -> Result<FetchResult, DataError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}
