//! Bar cache on top of a [`BlobStore`].
//!
//! Layout per symbol:
//! - `symbol={SYMBOL}/bars.parquet`: all bars, one Parquet blob
//! - `symbol={SYMBOL}/meta.json`: date range, bar count, BLAKE3 hash, source
//!
//! The hash covers the bar data, so a blob that decodes but does not match
//! its sidecar is reported as corrupt rather than silently used.

use super::provider::{DataError, DataSource, RawBar};
use super::storage::BlobStore;
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

const BARS_FILE: &str = "bars.parquet";
const META_FILE: &str = "meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bar_count: usize,
    pub data_hash: String,
    pub source: DataSource,
    pub cached_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub cached: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub bar_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    NotCached,
    FullyCovered,
    PartiallyCovered {
        cached_start: NaiveDate,
        cached_end: NaiveDate,
    },
}

pub struct BarCache<'a> {
    store: &'a dyn BlobStore,
}

impl<'a> BarCache<'a> {
    pub fn new(store: &'a dyn BlobStore) -> Self {
        Self { store }
    }

    fn key(symbol: &str, file: &str) -> String {
        format!("symbol={symbol}/{file}")
    }

    /// Replace the cached bars for `symbol`. Bars must be sorted by date.
    pub fn write(&self, symbol: &str, bars: &[RawBar], source: DataSource) -> Result<CacheMeta, DataError> {
        let (first, last) = match (bars.first(), bars.last()) {
            (Some(f), Some(l)) => (f.date, l.date),
            _ => return Err(DataError::Cache("no bars to cache".into())),
        };

        let blob = encode_bars(bars)?;
        let meta = CacheMeta {
            symbol: symbol.to_string(),
            start_date: first,
            end_date: last,
            bar_count: bars.len(),
            data_hash: hash_bars(bars)?,
            source,
            cached_at: chrono::Utc::now().naive_utc(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| DataError::Cache(format!("meta serialization: {e}")))?;

        // Bars first: a meta.json always points at a complete blob.
        self.store.put(&Self::key(symbol, BARS_FILE), &blob)?;
        self.store.put(&Self::key(symbol, META_FILE), &meta_json)?;
        debug!(symbol, bars = bars.len(), hash = %meta.data_hash, "cache write");
        Ok(meta)
    }

    /// All cached bars for `symbol`, sorted by date.
    pub fn load(&self, symbol: &str) -> Result<Vec<RawBar>, DataError> {
        let blob = self
            .store
            .get(&Self::key(symbol, BARS_FILE))?
            .ok_or_else(|| DataError::NoCachedData {
                symbol: symbol.to_string(),
            })?;

        let mut bars = decode_bars(blob)
            .map_err(|e| DataError::Cache(format!("corrupt cache for {symbol}: {e}")))?;
        if bars.is_empty() {
            return Err(DataError::Cache(format!("empty cache blob for {symbol}")));
        }
        bars.sort_by_key(|b| b.date);

        if let Some(meta) = self.meta(symbol)? {
            let actual = hash_bars(&bars)?;
            if actual != meta.data_hash {
                return Err(DataError::Cache(format!(
                    "hash mismatch for {symbol}: meta {} vs data {actual}",
                    meta.data_hash
                )));
            }
        }
        Ok(bars)
    }

    /// Metadata sidecar, if present and readable.
    pub fn meta(&self, symbol: &str) -> Result<Option<CacheMeta>, DataError> {
        match self.store.get(&Self::key(symbol, META_FILE))? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| DataError::Cache(format!("corrupt meta for {symbol}: {e}"))),
        }
    }

    pub fn remove(&self, symbol: &str) -> Result<(), DataError> {
        self.store.delete(&Self::key(symbol, BARS_FILE))?;
        self.store.delete(&Self::key(symbol, META_FILE))
    }

    /// Symbols with a metadata sidecar, sorted.
    pub fn cached_symbols(&self) -> Result<Vec<String>, DataError> {
        let suffix = format!("/{META_FILE}");
        Ok(self
            .store
            .keys("symbol=")?
            .into_iter()
            .filter_map(|k| {
                k.strip_prefix("symbol=")
                    .and_then(|rest| rest.strip_suffix(&suffix))
                    .map(str::to_string)
            })
            .collect())
    }

    pub fn status(&self, symbols: &[&str]) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|sym| {
                let meta = self.meta(sym).ok().flatten();
                CacheStatus {
                    symbol: sym.to_string(),
                    cached: meta.is_some(),
                    start_date: meta.as_ref().map(|m| m.start_date),
                    end_date: meta.as_ref().map(|m| m.end_date),
                    bar_count: meta.as_ref().map(|m| m.bar_count),
                }
            })
            .collect()
    }

    pub fn covers_range(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> CoverageResult {
        match self.meta(symbol).ok().flatten() {
            None => CoverageResult::NotCached,
            Some(meta) if meta.start_date <= start && meta.end_date >= end => {
                CoverageResult::FullyCovered
            }
            Some(meta) => CoverageResult::PartiallyCovered {
                cached_start: meta.start_date,
                cached_end: meta.end_date,
            },
        }
    }
}

/// BLAKE3 over the JSON encoding of the bars.
pub fn hash_bars(bars: &[RawBar]) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(bars)
        .map_err(|e| DataError::Cache(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet encoding ────────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn encode_bars(bars: &[RawBar]) -> Result<Vec<u8>, DataError> {
    let epoch = epoch();
    let days: Vec<i32> = bars
        .iter()
        .map(|b| (b.date - epoch).num_days() as i32)
        .collect();
    let col = |f: fn(&RawBar) -> f64| -> Vec<f64> { bars.iter().map(f).collect() };

    let mut df = DataFrame::new(vec![
        Column::new("date".into(), days)
            .cast(&DataType::Date)
            .map_err(|e| DataError::Storage(format!("date cast: {e}")))?,
        Column::new("open".into(), col(|b| b.open)),
        Column::new("high".into(), col(|b| b.high)),
        Column::new("low".into(), col(|b| b.low)),
        Column::new("close".into(), col(|b| b.close)),
        Column::new("volume".into(), bars.iter().map(|b| b.volume).collect::<Vec<u64>>()),
        Column::new("adj_close".into(), col(|b| b.adj_close)),
    ])
    .map_err(|e| DataError::Storage(format!("dataframe creation: {e}")))?;

    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf)
        .finish(&mut df)
        .map_err(|e| DataError::Storage(format!("write parquet: {e}")))?;
    Ok(buf)
}

fn decode_bars(blob: Vec<u8>) -> Result<Vec<RawBar>, DataError> {
    let df = ParquetReader::new(Cursor::new(blob))
        .finish()
        .map_err(|e| DataError::Storage(format!("read: {e}")))?;

    let column = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::Storage(format!("missing column '{name}': {e}")))
    };
    let floats = |name: &str| -> Result<Vec<f64>, DataError> {
        let ca = column(name)?
            .f64()
            .map_err(|e| DataError::Storage(format!("{name} column type: {e}")))?;
        Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    };

    let date_ca = column("date")?
        .date()
        .map_err(|e| DataError::Storage(format!("date column type: {e}")))?;
    let volume_ca = column("volume")?
        .u64()
        .map_err(|e| DataError::Storage(format!("volume column type: {e}")))?;
    let open = floats("open")?;
    let high = floats("high")?;
    let low = floats("low")?;
    let close = floats("close")?;
    let adj_close = floats("adj_close")?;

    let epoch = epoch();
    (0..df.height())
        .map(|i| {
            let days = date_ca
                .get(i)
                .ok_or_else(|| DataError::Storage(format!("null date at row {i}")))?;
            Ok(RawBar {
                date: epoch + chrono::Duration::days(days as i64),
                open: open[i],
                high: high[i],
                low: low[i],
                close: close[i],
                volume: volume_ca.get(i).unwrap_or(0),
                adj_close: adj_close[i],
            })
        })
        .collect()
}
