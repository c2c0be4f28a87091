//! Market data: providers, acquisition with fallback, cleaning, and the bar store.

pub mod acquire;
pub mod cache;
pub mod circuit_breaker;
pub mod provider;
pub mod synthetic;
pub mod validate;
pub mod yahoo;

pub use acquire::{acquire, download, resample_daily, Acquisition, FallbackPolicy};
pub use cache::{merge_bars, series_hash, BarStore, CacheMetadata, CacheStatus};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use provider::{DataError, DataProvider, DataSource, FetchResult};
pub use synthetic::SyntheticProvider;
pub use validate::{validate, validate_with_report, ValidationReport};
pub use yahoo::YahooProvider;
