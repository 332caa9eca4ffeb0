//! End-to-end rotation runs over an in-memory blob store.
//!
//! A fake provider serves deterministic synthetic bars so the full
//! download → cache → signal → backtest path runs without a network.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;

use sectorlab_core::data::{
    BarCache, DataError, DataProvider, DataSource, FetchResult, MemoryBlobStore,
};
use sectorlab_runner::config::RotationConfig;
use sectorlab_runner::data_loader::{generate_synthetic_bars, LoadError, LoadOptions};
use sectorlab_runner::runner::{run_rotation, RunError};

struct FakeProvider {
    calls: AtomicUsize,
    missing: HashSet<String>,
}

impl FakeProvider {
    fn new(missing: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            missing: missing.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DataProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<FetchResult, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains(symbol) {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars: generate_synthetic_bars(symbol, start, end),
            source: DataSource::YahooFinance,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn config() -> RotationConfig {
    RotationConfig::from_toml(
        r#"
        [strategy]
        top_k = 2
        momentum_period = 60
        volatility_period = 20
        rsi_period = 14
        value_period = 120

        [backtest]
        start_date = "2022-01-01"
        end_date = "2023-12-31"
        "#,
    )
    .unwrap()
}

fn opts(offline: bool, synthetic: bool) -> LoadOptions {
    LoadOptions {
        start: date(2020, 1, 1),
        end: date(2023, 12, 31),
        offline,
        synthetic,
        force: false,
    }
}

#[test]
fn download_then_offline_rerun_matches() {
    let store = MemoryBlobStore::new();
    let provider = FakeProvider::new(&[]);
    let config = config();

    let online = run_rotation(&config, &store, Some(&provider), None, &opts(false, false)).unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 9);
    assert!(!online.has_synthetic);

    let cached = BarCache::new(&store).cached_symbols().unwrap();
    assert_eq!(cached.len(), 9);

    let offline = run_rotation(&config, &store, None, None, &opts(true, false)).unwrap();
    assert_eq!(offline.equity, online.equity);
    assert_eq!(offline.dataset_hash, online.dataset_hash);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 9);
}

#[test]
fn weights_respect_top_k_invariants() {
    let store = MemoryBlobStore::new();
    let result = run_rotation(&config(), &store, None, None, &opts(true, true)).unwrap();
    assert!(result.has_synthetic);
    assert!(!result.decisions.is_empty());

    let weights = &result.weights;
    for row in 0..weights.n_rows() {
        let w = weights.row(row);
        let sum: f64 = w.iter().sum();
        assert!(sum <= 1.0 + 1e-12);
        for v in w {
            assert!(v == 0.0 || (v - 0.5).abs() < 1e-12, "unexpected weight {v}");
        }
    }
    assert!(result.report.unwrap().benchmark.is_some());
}

#[test]
fn missing_macro_series_skips_overlay() {
    let store = MemoryBlobStore::new();
    let provider = FakeProvider::new(&["INR=X", "CL=F"]);
    let result =
        run_rotation(&config(), &store, Some(&provider), None, &opts(false, false)).unwrap();
    assert!(result.report.is_some());
    assert!(!BarCache::new(&store)
        .cached_symbols()
        .unwrap()
        .contains(&"INR=X".to_string()));
}

#[test]
fn missing_sector_is_an_error() {
    let store = MemoryBlobStore::new();
    let provider = FakeProvider::new(&["^CNXMETAL"]);
    let err = run_rotation(&config(), &store, Some(&provider), None, &opts(false, false))
        .unwrap_err();
    match err {
        RunError::Data(LoadError::DownloadFailed { symbol, reason }) => {
            assert_eq!(symbol, "^CNXMETAL");
            assert!(reason.contains("symbol not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn offline_empty_cache_fails_without_synthetic() {
    let store = MemoryBlobStore::new();
    let err = run_rotation(&config(), &store, None, None, &opts(true, false)).unwrap_err();
    assert!(matches!(
        err,
        RunError::Data(LoadError::NoCachedDataOffline { .. })
    ));
}
