//! Download orchestrator: multi-symbol fetch → cache with progress reporting.

use super::cache::{BarCache, CoverageResult};
use super::provider::{DataError, DataProvider, DownloadProgress};
use chrono::NaiveDate;

/// Fetch every symbol and store it in the cache.
///
/// Symbols already covering `[start, end]` are skipped unless `force`.
/// Stops early once the provider becomes unavailable (circuit breaker);
/// remaining symbols are reported as failed.
pub fn download_symbols(
    provider: &dyn DataProvider,
    cache: &BarCache<'_>,
    symbols: &[&str],
    start: NaiveDate,
    end: NaiveDate,
    force: bool,
    progress: &dyn DownloadProgress,
) -> DownloadSummary {
    let total = symbols.len();
    let mut summary = DownloadSummary {
        total,
        ..DownloadSummary::default()
    };

    for (i, symbol) in symbols.iter().enumerate() {
        progress.on_start(symbol, i, total);

        if !force && cache.covers_range(symbol, start, end) == CoverageResult::FullyCovered {
            progress.on_complete(symbol, i, total, &Ok(()));
            summary.skipped += 1;
            summary.succeeded += 1;
            continue;
        }

        let result = download_single(provider, cache, symbol, start, end);
        progress.on_complete(symbol, i, total, &result);
        match result {
            Ok(()) => summary.succeeded += 1,
            Err(e) => {
                summary.errors.push((symbol.to_string(), e));
                summary.failed += 1;
            }
        }

        if !provider.is_available() {
            for sym in &symbols[(i + 1)..] {
                summary
                    .errors
                    .push((sym.to_string(), DataError::ProviderBlocked));
                summary.failed += 1;
            }
            break;
        }
    }

    progress.on_batch_complete(summary.succeeded, summary.failed, total);
    summary
}

/// Fetch one symbol and cache it.
pub fn download_single(
    provider: &dyn DataProvider,
    cache: &BarCache<'_>,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), DataError> {
    let fetched = provider.fetch(symbol, start, end)?;
    let mut bars = fetched.bars;
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    cache.write(symbol, &bars, fetched.source)?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Symbols served from an up-to-date cache without fetching.
    pub skipped: usize,
    pub errors: Vec<(String, DataError)>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
