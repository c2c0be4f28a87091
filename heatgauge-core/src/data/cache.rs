//! Parquet bar store with per-symbol refresh metadata.
//!
//! Layout:
//! - `{cache_dir}/{SAFE_SYMBOL}/{timeframe}/{timeframe}.parquet`
//! - `{cache_dir}/{SAFE_SYMBOL}/metadata.json`
//!
//! `.` and `/` in symbols become `_`, so `SXR8.DE` lives under `SXR8_DE/`.
//!
//! Features:
//! - Merge-on-write: stored and new bars are combined, new values win on
//!   overlapping timestamps
//! - Atomic writes (write to a unique temp file, persist into place)
//! - Writes to one file are serialized across every clone of the store
//! - Quarantine for corrupt files ({filename}.quarantined), treated as absent
//! - BLAKE3 hash of the stored daily series in the metadata

use super::provider::DataError;
use crate::domain::{Bar, Timeframe};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;

const COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Refresh record for one requested symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub last_refresh: DateTime<Utc>,
    pub active_symbol: String,
    pub used_fallback: bool,
    pub fallback_reason: Option<String>,
    #[serde(default)]
    pub hourly_rows: usize,
    #[serde(default)]
    pub daily_rows: usize,
    #[serde(default)]
    pub data_hash: String,
}

/// Cache status for a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub cached: bool,
    pub last_refresh: Option<DateTime<Utc>>,
    pub active_symbol: Option<String>,
    pub hourly_rows: Option<usize>,
    pub daily_rows: Option<usize>,
}

/// Hex BLAKE3 digest of a bar series.
pub fn series_hash(bars: &[Bar]) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(bars)
        .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Directory-safe form of a ticker.
pub fn safe_symbol(symbol: &str) -> String {
    symbol.replace(['.', '/'], "_")
}

/// The on-disk bar store.
///
/// Clones share one lock table: a read-merge-write cycle on a file runs
/// alone, whichever requested symbol started it.
#[derive(Debug, Clone)]
pub struct BarStore {
    cache_dir: PathBuf,
    write_locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl BarStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            write_locks: Arc::new(DashMap::new()),
        }
    }

    fn write_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(safe_symbol(symbol))
    }

    fn series_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.symbol_dir(symbol)
            .join(timeframe.as_str())
            .join(format!("{}.parquet", timeframe.as_str()))
    }

    fn metadata_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join("metadata.json")
    }

    /// Merge `bars` into the stored series and persist the result.
    ///
    /// Returns the stored row count. An empty `bars` leaves the store as is.
    pub fn save(&self, bars: &[Bar], timeframe: Timeframe, symbol: &str) -> Result<usize, DataError> {
        let path = self.series_path(symbol, timeframe);
        let lock = self.write_lock(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = self.load(symbol, timeframe)?;
        if bars.is_empty() {
            return Ok(existing.len());
        }

        let merged = if existing.is_empty() {
            bars.to_vec()
        } else {
            let merged = merge_bars(existing.clone(), bars);
            tracing::info!(
                symbol,
                %timeframe,
                existing = existing.len(),
                new = bars.len(),
                merged = merged.len(),
                "merged with cached series"
            );
            merged
        };

        let dir = path
            .parent()
            .ok_or_else(|| DataError::CacheError(format!("no parent dir for {}", path.display())))?;
        fs::create_dir_all(dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;
        let df = bars_to_dataframe(&merged)?;
        let tmp = NamedTempFile::new_in(dir)
            .map_err(|e| DataError::CacheError(format!("temp file: {e}")))?;
        write_parquet(&df, tmp.as_file())?;
        tmp.persist(&path)
            .map_err(|e| DataError::CacheError(format!("atomic rename failed: {}", e.error)))?;

        tracing::debug!(symbol, %timeframe, rows = merged.len(), path = %path.display(), "saved series");
        Ok(merged.len())
    }

    /// Load the stored series, ascending. Absent or corrupt stores load as empty.
    pub fn load(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Bar>, DataError> {
        let path = self.series_path(symbol, timeframe);
        if !path.exists() {
            return Ok(Vec::new());
        }

        match load_and_validate_parquet(&path) {
            Ok(mut bars) => {
                bars.sort_by_key(|b| b.timestamp);
                Ok(bars)
            }
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                tracing::warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
                fs::rename(&path, &quarantine)
                    .map_err(|e| DataError::CacheError(format!("quarantine rename failed: {e}")))?;
                Ok(Vec::new())
            }
        }
    }

    /// Atomically replace the metadata record for `symbol`.
    pub fn write_metadata(&self, symbol: &str, meta: &CacheMetadata) -> Result<(), DataError> {
        let dir = self.symbol_dir(symbol);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        let path = self.metadata_path(symbol);
        let lock = self.write_lock(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut tmp = NamedTempFile::new_in(&dir)
            .map_err(|e| DataError::CacheError(format!("temp file: {e}")))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;
        tmp.persist(&path)
            .map_err(|e| DataError::CacheError(format!("atomic rename failed: {}", e.error)))?;

        tracing::info!(symbol, active = %meta.active_symbol, last_refresh = %meta.last_refresh, "wrote cache metadata");
        Ok(())
    }

    /// Read the metadata record. Missing or unreadable records are `None`.
    pub fn load_metadata(&self, symbol: &str) -> Option<CacheMetadata> {
        let content = fs::read_to_string(self.metadata_path(symbol)).ok()?;
        match serde_json::from_str(&content) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "ignoring unreadable cache metadata");
                None
            }
        }
    }

    /// True when no metadata exists or it is older than `max_age_hours`.
    pub fn needs_refresh(&self, max_age_hours: f64, symbol: &str) -> bool {
        self.needs_refresh_at(max_age_hours, symbol, Utc::now())
    }

    pub fn needs_refresh_at(&self, max_age_hours: f64, symbol: &str, now: DateTime<Utc>) -> bool {
        let Some(meta) = self.load_metadata(symbol) else {
            return true;
        };
        let age_hours = (now - meta.last_refresh).num_milliseconds() as f64 / 3_600_000.0;
        age_hours > max_age_hours
    }

    pub fn status(&self, symbols: &[&str]) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|sym| {
                let meta = self.load_metadata(sym);
                CacheStatus {
                    symbol: sym.to_string(),
                    cached: meta.is_some(),
                    last_refresh: meta.as_ref().map(|m| m.last_refresh),
                    active_symbol: meta.as_ref().map(|m| m.active_symbol.clone()),
                    hourly_rows: meta.as_ref().map(|m| m.hourly_rows),
                    daily_rows: meta.as_ref().map(|m| m.daily_rows),
                }
            })
            .collect()
    }
}

/// Concatenate, keep the incoming bar on timestamp collisions, re-sort.
pub fn merge_bars(existing: Vec<Bar>, incoming: &[Bar]) -> Vec<Bar> {
    let mut combined = existing;
    combined.extend_from_slice(incoming);
    // Stable sort keeps incoming rows after stored rows with the same stamp.
    combined.sort_by_key(|b| b.timestamp);

    let mut out: Vec<Bar> = Vec::with_capacity(combined.len());
    for bar in combined {
        match out.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[Bar]) -> Result<DataFrame, DataError> {
    let stamps: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_millis()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), stamps)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| DataError::ParquetError(format!("timestamp cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, file: &fs::File) -> Result<(), DataError> {
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<Bar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    for col_name in COLUMNS {
        if df.column(col_name).is_err() {
            return Err(DataError::CacheError(format!("missing column '{col_name}'")));
        }
    }

    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>, DataError> {
    let map_err = |e: PolarsError| DataError::ParquetError(format!("column read: {e}"));

    let stamps = df
        .column("timestamp")
        .map_err(map_err)?
        .cast(&DataType::Int64)
        .map_err(map_err)?;
    let stamp_ca = stamps.i64().map_err(map_err)?;
    let f64_column = |name: &str| -> Result<Vec<f64>, DataError> {
        let col = df.column(name).map_err(map_err)?;
        let ca = col.f64().map_err(map_err)?;
        Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    };
    let opens = f64_column("open")?;
    let highs = f64_column("high")?;
    let lows = f64_column("low")?;
    let closes = f64_column("close")?;
    let volumes = f64_column("volume")?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let millis = stamp_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null timestamp at row {i}")))?;
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| DataError::ParquetError(format!("timestamp out of range at row {i}")))?;
        bars.push(Bar {
            timestamp,
            open: opens[i],
            high: highs[i],
            low: lows[i],
            close: closes[i],
            volume: volumes[i],
        });
    }
    Ok(bars)
}
