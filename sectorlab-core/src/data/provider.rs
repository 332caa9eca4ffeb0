//! The seam between the bar cache and remote market data.
//!
//! Sector, benchmark and macro series all come through the same
//! [`DataProvider`] interface, keyed by ticker. The cache sits above this
//! trait; providers know nothing about persistence.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw daily bar from a data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: f64,
}

impl RawBar {
    /// Price used for the panel: adjusted close, or close when no
    /// adjustment is published (indices, futures).
    pub fn price(&self) -> f64 {
        if self.adj_close.is_nan() {
            self.close
        } else {
            self.adj_close
        }
    }
}

/// Failures while fetching or caching a series.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network error: {0}")]
    Network(String),

    #[error("provider is rate limiting, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("unexpected provider response: {0}")]
    BadResponse(String),

    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider is blocking requests; waiting out the cooldown")]
    ProviderBlocked,

    #[error("bar cache: {0}")]
    Cache(String),

    #[error("parquet storage: {0}")]
    Storage(String),

    #[error("'{symbol}' is not cached; run `sectorlab download` first")]
    NoCachedData { symbol: String },

    #[error("{0}")]
    Other(String),
}

/// Bars returned for one symbol, sorted by date.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub bars: Vec<RawBar>,
    pub source: DataSource,
}

/// Where a series came from. Recorded in cache metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    YahooFinance,
    Cache,
    Synthetic,
}

pub trait DataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch daily bars for `symbol` over `[start, end]`.
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<FetchResult, DataError>;

    /// False while the provider refuses requests (rate limit, ban).
    fn is_available(&self) -> bool;
}

/// Progress callback for multi-symbol downloads.
pub trait DownloadProgress: Send {
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    fn on_complete(&self, symbol: &str, index: usize, total: usize, result: &Result<(), DataError>);

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Reports download progress through `tracing`.
pub struct LogProgress;

impl DownloadProgress for LogProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        tracing::info!(symbol, n = index + 1, total, "fetching");
    }

    fn on_complete(&self, symbol: &str, _index: usize, _total: usize, result: &Result<(), DataError>) {
        match result {
            Ok(()) => tracing::info!(symbol, "cached"),
            Err(e) => tracing::warn!(symbol, error = %e, "download failed"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!(succeeded, failed, total, "download complete");
    }
}
