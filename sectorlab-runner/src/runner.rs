//! Rotation runner: wires data loading, the signal pipeline and the backtest.
//!
//! Two entry points:
//! - `run_rotation()`: loads sectors, benchmark and macro series through the
//!   cache, then runs. Used by the CLI.
//! - `run_rotation_from_data()`: takes pre-loaded panels, no I/O.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use sectorlab_core::data::{BarCache, BlobStore, DataProvider, DownloadProgress};
use sectorlab_core::panel::{intersect_dates, is_last_weekday_of_month};
use sectorlab_core::{Panel, RebalanceDecision, SectorRotation, StrategyError, TimeSeries};

use crate::backtest::Backtest;
use crate::config::RotationConfig;
use crate::data_loader::{load_panel, LoadError, LoadOptions};
use crate::metrics::MetricsReport;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("data error: {0}")]
    Data(#[from] LoadError),

    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

/// Everything one rotation run produces, restricted to the backtest window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationResult {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: f64,
    /// Daily held weights, columns = sector tickers.
    pub weights: Panel,
    pub returns: TimeSeries,
    pub equity: TimeSeries,
    pub benchmark_equity: Option<TimeSeries>,
    /// `None` when the window holds no return days.
    pub report: Option<MetricsReport>,
    /// Rebalances taken up to the window end, including the one in force
    /// on the first backtest day. A month the data stops partway through
    /// yields no decision.
    pub decisions: Vec<RebalanceDecision>,
    /// Month-ends inside the window with too few scored sectors.
    pub skipped: Vec<NaiveDate>,
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

impl RotationResult {
    /// The most recent rebalance, i.e. what the strategy currently holds.
    pub fn latest_decision(&self) -> Option<&RebalanceDecision> {
        self.decisions.last()
    }
}

/// Load the configured universe and run the rotation.
///
/// Sector and benchmark data are required. Macro data is optional: if it
/// cannot be loaded the regime overlay is skipped.
pub fn run_rotation(
    config: &RotationConfig,
    store: &dyn BlobStore,
    provider: Option<&dyn DataProvider>,
    progress: Option<&dyn DownloadProgress>,
    opts: &LoadOptions,
) -> Result<RotationResult, RunError> {
    let cache = BarCache::new(store);
    let universe = &config.universe;

    let sectors = load_panel(&universe.sector_tickers(), &cache, provider, progress, opts)?;
    let benchmark_ticker = universe.benchmark.ticker.as_str();
    let benchmark = load_panel(&[benchmark_ticker], &cache, provider, progress, opts)?;
    let benchmark_series = benchmark
        .panel
        .series(benchmark_ticker)
        .ok_or_else(|| RunError::InsufficientData(format!("benchmark {benchmark_ticker} missing")))?;

    let macro_data = if config.regime.enabled {
        match load_panel(&universe.macro_tickers(), &cache, provider, progress, opts) {
            Ok(loaded) => Some(loaded),
            Err(e) => {
                warn!(error = %e, "macro data unavailable, regime overlay skipped");
                None
            }
        }
    } else {
        None
    };

    let mut result = run_rotation_from_data(
        config,
        &sectors.panel,
        Some(&benchmark_series),
        macro_data.as_ref().map(|m| &m.panel),
        opts.end,
    )?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(sectors.dataset_hash.as_bytes());
    hasher.update(benchmark.dataset_hash.as_bytes());
    if let Some(m) = &macro_data {
        hasher.update(m.dataset_hash.as_bytes());
    }
    result.dataset_hash = hasher.finalize().to_hex().to_string();
    result.has_synthetic = sectors.has_synthetic
        || benchmark.has_synthetic
        || macro_data.as_ref().is_some_and(|m| m.has_synthetic);
    Ok(result)
}

/// Run the rotation on pre-loaded panels.
///
/// `prices` holds one column per sector over the full history (factors need
/// the warm-up). `today` stands in for an unset `backtest.end_date`.
pub fn run_rotation_from_data(
    config: &RotationConfig,
    prices: &Panel,
    benchmark: Option<&TimeSeries>,
    macro_panel: Option<&Panel>,
    today: NaiveDate,
) -> Result<RotationResult, RunError> {
    if prices.is_empty() {
        return Err(RunError::InsufficientData("price panel is empty".into()));
    }

    let (prices, benchmark) = match benchmark {
        Some(b) => {
            let common = intersect_dates(prices.dates(), b.dates());
            (prices.reindex(&common), Some(b.restrict_to(&common)))
        }
        None => (prices.clone(), None),
    };
    if prices.n_rows() < 2 {
        return Err(RunError::InsufficientData(
            "sectors and benchmark share fewer than two dates".into(),
        ));
    }

    let strategy = SectorRotation::new(config.strategy_config())?;
    let signals = strategy.generate(&prices, macro_panel)?;

    let (start, end) = config.backtest_window(today);
    let window_prices = prices.slice_dates(start, end);
    if window_prices.n_rows() < 2 {
        return Err(RunError::InsufficientData(format!(
            "fewer than two trading days between {start} and {end}"
        )));
    }
    let window_weights = signals.weights().slice_dates(start, end);
    let window_benchmark = benchmark.map(|b| b.slice_dates(start, end));

    let capital = config.backtest.initial_capital;
    let backtest = Backtest::new(
        &window_prices,
        &window_weights,
        window_benchmark.as_ref(),
        capital,
    )
    .with_risk_free_rate(config.backtest.risk_free_rate);
    let run = backtest.run();
    let report = backtest.generate_report();

    let window_dates = window_prices.dates();
    let first_day = window_dates[0];
    let last_day = window_dates[window_dates.len() - 1];
    // The data stops inside a month: its "month end" is just the last
    // observed day, and a selection made there never trades.
    let partial_month = |date: NaiveDate| date == last_day && !is_last_weekday_of_month(date);
    let allocation = &signals.allocation;
    let in_force = allocation
        .decisions
        .iter()
        .rposition(|d| d.date < first_day)
        .unwrap_or(0);
    let decisions: Vec<RebalanceDecision> = allocation.decisions[in_force..]
        .iter()
        .filter(|d| d.date <= end && !partial_month(d.date))
        .cloned()
        .collect();
    let skipped: Vec<NaiveDate> = allocation
        .skipped
        .iter()
        .copied()
        .filter(|d| *d >= start && *d <= end && !partial_month(*d))
        .collect();

    info!(
        %start,
        %end,
        days = run.returns.len(),
        rebalances = decisions.len(),
        skipped = skipped.len(),
        "rotation backtest complete"
    );

    Ok(RotationResult {
        start,
        end,
        initial_capital: capital,
        weights: window_weights,
        returns: run.returns,
        equity: run.equity,
        benchmark_equity: backtest.benchmark_equity(),
        report,
        decisions,
        skipped,
        dataset_hash: panel_hash(&window_prices),
        has_synthetic: false,
    })
}

/// BLAKE3 over a panel's dates, columns and values.
fn panel_hash(panel: &Panel) -> String {
    let mut hasher = blake3::Hasher::new();
    for column in panel.columns() {
        hasher.update(column.as_bytes());
    }
    for date in panel.dates() {
        hasher.update(date.to_string().as_bytes());
    }
    for column in panel.column_data() {
        for v in column {
            hasher.update(&v.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration};

    fn trading_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    fn small_config() -> RotationConfig {
        let mut config = RotationConfig::default();
        config.strategy.top_k = 1;
        config.strategy.factors.momentum_period = 5;
        config.strategy.factors.volatility_period = 5;
        config.strategy.factors.rsi_period = 3;
        config.strategy.factors.value_period = 10;
        config.regime.enabled = false;
        config.backtest.start_date = Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        config.backtest.end_date = Some(NaiveDate::from_ymd_opt(2024, 4, 30).unwrap());
        config
    }

    fn trending_panel() -> Panel {
        let dates = trading_days(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 130);
        let up: Vec<f64> = (0..130).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        let flat: Vec<f64> = (0..130).map(|i| 100.0 + (i % 2) as f64).collect();
        Panel::new(dates, vec!["UP".into(), "FLAT".into()], vec![up, flat]).unwrap()
    }

    #[test]
    fn empty_prices_are_rejected() {
        let err = run_rotation_from_data(
            &small_config(),
            &Panel::empty(),
            None,
            None,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, RunError::InsufficientData(_)));
    }

    #[test]
    fn result_is_limited_to_backtest_window() {
        let config = small_config();
        let result = run_rotation_from_data(
            &config,
            &trending_panel(),
            None,
            None,
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        )
        .unwrap();

        assert_eq!(result.start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(result.returns.dates().iter().all(|d| *d > result.start && *d <= result.end));
        assert_eq!(result.equity.len(), result.returns.len());
        assert!(result.report.is_some());
        assert!(result.benchmark_equity.is_none());
        assert_eq!(result.latest_decision().unwrap().selected, vec!["UP".to_string()]);
    }

    #[test]
    fn month_cut_short_by_the_data_yields_no_decision() {
        // trending_panel() runs through Thursday 2024-05-09.
        let mut config = small_config();
        config.backtest.end_date = Some(NaiveDate::from_ymd_opt(2024, 5, 9).unwrap());
        let result =
            run_rotation_from_data(&config, &trending_panel(), None, None, NaiveDate::MAX).unwrap();
        let latest = result.latest_decision().unwrap();
        assert_eq!(latest.date, NaiveDate::from_ymd_opt(2024, 4, 30).unwrap());
        assert!(result.decisions.iter().all(|d| d.date.month() != 5));
        assert!(result.skipped.iter().all(|d| d.month() != 5));
        assert_eq!(result.returns.dates().last(), Some(&NaiveDate::from_ymd_opt(2024, 5, 9).unwrap()));
    }

    #[test]
    fn completed_final_month_keeps_its_decision() {
        let result = run_rotation_from_data(
            &small_config(),
            &trending_panel(),
            None,
            None,
            NaiveDate::MAX,
        )
        .unwrap();
        assert_eq!(
            result.latest_decision().unwrap().date,
            NaiveDate::from_ymd_opt(2024, 4, 30).unwrap()
        );
    }

    #[test]
    fn benchmark_is_aligned_and_reported() {
        let prices = trending_panel();
        let bench = TimeSeries::new(
            prices.dates().to_vec(),
            (0..130).map(|i| 100.0 + i as f64).collect(),
        )
        .unwrap();
        let result =
            run_rotation_from_data(&small_config(), &prices, Some(&bench), None, prices.dates()[129])
                .unwrap();
        let report = result.report.unwrap();
        assert!(report.benchmark.is_some());
        let beq = result.benchmark_equity.unwrap();
        assert_eq!(beq.dates(), result.equity.dates());
    }

    #[test]
    fn regime_without_macro_columns_is_an_error() {
        let mut config = small_config();
        config.regime.enabled = true;
        let macro_panel = Panel::new(
            trending_panel().dates().to_vec(),
            vec!["OTHER".into()],
            vec![vec![1.0; 130]],
        )
        .unwrap();
        let err = run_rotation_from_data(
            &config,
            &trending_panel(),
            None,
            Some(&macro_panel),
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RunError::Strategy(StrategyError::MissingMacroSeries(_))
        ));
    }
}
