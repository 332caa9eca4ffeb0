//! Price loading for the runner.
//!
//! Resolves each ticker in turn:
//! 1. cached bars (unless `force`)
//! 2. download through the provider, written back to the cache
//! 3. synthetic random walk, when `synthetic` is set
//! 4. otherwise an error naming the ticker
//!
//! Synthetic data is a developer-only debug mode; results built on it are
//! tagged `has_synthetic`.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Weekday};
use thiserror::Error;
use tracing::{debug, warn};

use sectorlab_core::data::cache::hash_bars;
use sectorlab_core::data::{
    bars_to_panel, BarCache, DataError, DataProvider, DataSource, DownloadProgress, RawBar,
};
use sectorlab_core::{Panel, PanelError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no cached data for '{symbol}' and no network access (use --synthetic for synthetic data)")]
    NoCachedDataOffline { symbol: String },

    #[error("no cached data for '{symbol}' and download failed: {reason}")]
    DownloadFailed { symbol: String, reason: String },

    #[error("no bars for '{symbol}' between {start} and {end}")]
    EmptyRange {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("panel error: {0}")]
    Panel(#[from] PanelError),
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Never touch the network.
    pub offline: bool,
    /// Fall back to synthetic bars when real data is unavailable.
    pub synthetic: bool,
    /// Re-download even when cached.
    pub force: bool,
}

/// Prices for a set of tickers on the union of their dates.
#[derive(Debug, Clone)]
pub struct LoadedPanel {
    /// Columns in the requested ticker order.
    pub panel: Panel,
    pub sources: HashMap<String, DataSource>,
    /// BLAKE3 over every ticker's bars, in ticker order.
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

/// Load `symbols` over `[opts.start, opts.end]` and align them into one panel.
pub fn load_panel(
    symbols: &[&str],
    cache: &BarCache<'_>,
    provider: Option<&dyn DataProvider>,
    progress: Option<&dyn DownloadProgress>,
    opts: &LoadOptions,
) -> Result<LoadedPanel, LoadError> {
    let total = symbols.len();
    let mut series: Vec<(String, Vec<RawBar>)> = Vec::with_capacity(total);
    let mut sources = HashMap::new();
    let mut has_synthetic = false;

    for (i, symbol) in symbols.iter().enumerate() {
        let (bars, source) = resolve_symbol(symbol, i, total, cache, provider, progress, opts)?;
        let bars: Vec<RawBar> = bars
            .into_iter()
            .filter(|b| b.date >= opts.start && b.date <= opts.end)
            .collect();
        if bars.is_empty() {
            return Err(LoadError::EmptyRange {
                symbol: symbol.to_string(),
                start: opts.start,
                end: opts.end,
            });
        }
        has_synthetic |= source == DataSource::Synthetic;
        sources.insert(symbol.to_string(), source);
        series.push((symbol.to_string(), bars));
    }

    let dataset_hash = dataset_hash(&series)?;
    let panel = bars_to_panel(&series)?;
    debug!(
        symbols = total,
        days = panel.n_rows(),
        hash = %dataset_hash,
        "panel loaded"
    );

    if let Some(p) = progress {
        p.on_batch_complete(sources.len(), total - sources.len(), total);
    }

    Ok(LoadedPanel {
        panel,
        sources,
        dataset_hash,
        has_synthetic,
    })
}

fn resolve_symbol(
    symbol: &str,
    index: usize,
    total: usize,
    cache: &BarCache<'_>,
    provider: Option<&dyn DataProvider>,
    progress: Option<&dyn DownloadProgress>,
    opts: &LoadOptions,
) -> Result<(Vec<RawBar>, DataSource), LoadError> {
    if !opts.force {
        match cache.load(symbol) {
            Ok(bars) => return Ok((bars, DataSource::Cache)),
            Err(DataError::NoCachedData { .. }) => {}
            Err(e) => warn!(symbol, error = %e, "ignoring unreadable cache entry"),
        }
    }

    let mut failure = None;
    if !opts.offline {
        if let Some(prov) = provider.filter(|p| p.is_available()) {
            if let Some(p) = progress {
                p.on_start(symbol, index, total);
            }
            let fetched = prov.fetch(symbol, opts.start, opts.end).and_then(|f| {
                let mut bars = f.bars;
                bars.sort_by_key(|b| b.date);
                bars.dedup_by_key(|b| b.date);
                cache.write(symbol, &bars, f.source)?;
                Ok((bars, f.source))
            });
            match fetched {
                Ok(found) => {
                    if let Some(p) = progress {
                        p.on_complete(symbol, index, total, &Ok(()));
                    }
                    return Ok(found);
                }
                Err(e) => {
                    failure = Some(e.to_string());
                    if let Some(p) = progress {
                        p.on_complete(symbol, index, total, &Err(e));
                    }
                }
            }
        }
    }

    if opts.synthetic {
        warn!(symbol, "generating synthetic data, results will be tagged as synthetic");
        return Ok((
            generate_synthetic_bars(symbol, opts.start, opts.end),
            DataSource::Synthetic,
        ));
    }

    if opts.offline {
        return Err(LoadError::NoCachedDataOffline {
            symbol: symbol.to_string(),
        });
    }
    Err(LoadError::DownloadFailed {
        symbol: symbol.to_string(),
        reason: failure.unwrap_or_else(|| "no data provider available".into()),
    })
}

fn dataset_hash(series: &[(String, Vec<RawBar>)]) -> Result<String, DataError> {
    let mut hasher = blake3::Hasher::new();
    for (symbol, bars) in series {
        hasher.update(symbol.as_bytes());
        hasher.update(hash_bars(bars)?.as_bytes());
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Deterministic random walk from 100.0 on weekdays, seeded by the ticker.
pub fn generate_synthetic_bars(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawBar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::new();
    let mut price = 100.0_f64;
    let mut current = start;

    while current <= end {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += chrono::Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.02..0.02);
        let open = price;
        let close = price * (1.0 + daily_return);
        bars.push(RawBar {
            date: current,
            open,
            high: open.max(close) * (1.0 + rng.gen_range(0.0..0.01)),
            low: open.min(close) * (1.0 - rng.gen_range(0.0..0.01)),
            close,
            volume: rng.gen_range(500_000..5_000_000u64),
            adj_close: close,
        });

        price = close;
        current += chrono::Duration::days(1);
    }

    bars
}
