//! SectorLab CLI: download, run, and cache commands.
//!
//! Commands:
//! - `download`: fetch the configured universe from Yahoo Finance into the cache
//! - `run`: run the sector rotation backtest and save artifacts
//! - `cache status`: list cached symbols and their date ranges

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sectorlab_core::data::{
    download_symbols, BarCache, CircuitBreaker, DataError, DataProvider, DownloadProgress,
    FsBlobStore, LogProgress, YahooProvider,
};
use sectorlab_runner::config::DEFAULT_FETCH_YEARS;
use sectorlab_runner::export::format_statistic;
use sectorlab_runner::{run_rotation, save_artifacts, LoadOptions, RotationConfig, RotationResult};

#[derive(Parser)]
#[command(
    name = "sectorlab",
    about = "SectorLab CLI: monthly sector rotation backtests"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download sectors, benchmark and macro series into the cache.
    Download {
        /// Start date (YYYY-MM-DD). Defaults to 12 years before the end date.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Force re-download even if cached.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// TOML config whose [universe] section lists the tickers.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Run the rotation backtest.
    Run {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of sectors held each month.
        #[arg(long)]
        top_k: Option<usize>,

        /// Backtest start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Backtest end date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Offline mode: no network access.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Use synthetic data as fallback.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached symbols with date ranges and bar counts.
    Status {
        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Download {
            start,
            end,
            force,
            config,
            cache_dir,
        } => run_download(start, end, force, config, cache_dir),
        Commands::Run {
            config,
            top_k,
            start,
            end,
            offline,
            synthetic,
            cache_dir,
            output_dir,
        } => run_rotation_cmd(
            config, top_k, start, end, offline, synthetic, cache_dir, output_dir,
        ),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
        },
    }
}

fn parse_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    s.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
    })
    .transpose()
}

fn load_config(path: Option<&Path>) -> Result<RotationConfig> {
    match path {
        Some(p) => RotationConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(RotationConfig::default()),
    }
}

fn run_download(
    start: Option<String>,
    end: Option<String>,
    force: bool,
    config: Option<PathBuf>,
    cache_dir: PathBuf,
) -> Result<()> {
    let config = load_config(config.as_deref())?;
    let end_date = parse_date(end.as_deref())?.unwrap_or_else(|| chrono::Local::now().date_naive());
    let start_date = parse_date(start.as_deref())?
        .unwrap_or(end_date - chrono::Duration::days(DEFAULT_FETCH_YEARS * 365));

    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    let provider = YahooProvider::new(circuit_breaker)?;
    let store = FsBlobStore::new(cache_dir);
    let cache = BarCache::new(&store);

    let tickers = config.universe.all_tickers();
    let summary = download_symbols(
        &provider,
        &cache,
        &tickers,
        start_date,
        end_date,
        force,
        &StdoutProgress,
    );

    if !summary.all_succeeded() {
        for (sym, err) in &summary.errors {
            eprintln!("Error for {sym}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_rotation_cmd(
    config_path: Option<PathBuf>,
    top_k: Option<usize>,
    start: Option<String>,
    end: Option<String>,
    offline: bool,
    synthetic: bool,
    cache_dir: PathBuf,
    output_dir: PathBuf,
) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if let Some(k) = top_k {
        config.strategy.top_k = k;
    }
    if let Some(d) = parse_date(start.as_deref())? {
        config.backtest.start_date = Some(d);
    }
    if let Some(d) = parse_date(end.as_deref())? {
        config.backtest.end_date = Some(d);
    }
    config.validate()?;

    let today = chrono::Local::now().date_naive();
    let (data_start, data_end) = config.data_window(today);
    let opts = LoadOptions {
        start: data_start,
        end: data_end,
        offline,
        synthetic,
        force: false,
    };
    tracing::info!(start = %data_start, end = %data_end, offline, synthetic, "loading universe");

    let store = FsBlobStore::new(&cache_dir);
    let provider = if offline {
        None
    } else {
        Some(YahooProvider::new(Arc::new(CircuitBreaker::default_provider()))?)
    };
    let provider_ref = provider.as_ref().map(|p| p as &dyn DataProvider);

    let result = run_rotation(&config, &store, provider_ref, Some(&LogProgress), &opts)?;

    print_summary(&config, &result);

    let dir = save_artifacts(&result, &output_dir)?;
    println!("Artifacts saved to: {}", dir.display());
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let store = FsBlobStore::new(cache_dir);
    let cache = BarCache::new(&store);
    let symbols = cache.cached_symbols()?;
    if symbols.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
    println!("Cache: {}", cache_dir.display());
    println!("Symbols: {}", symbols.len());
    println!();
    println!("{:<12} {:<25} {:>8}", "Symbol", "Date Range", "Bars");
    println!("{}", "-".repeat(47));
    for status in cache.status(&refs) {
        let range = match (status.start_date, status.end_date) {
            (Some(s), Some(e)) => format!("{s} to {e}"),
            _ => "(corrupt meta)".into(),
        };
        let bars = status.bar_count.map(|n| n.to_string()).unwrap_or_default();
        println!("{:<12} {:<25} {:>8}", status.symbol, range, bars);
    }
    Ok(())
}

fn print_summary(config: &RotationConfig, result: &RotationResult) {
    println!();
    println!("=== Sector Rotation ===");
    println!("Period:         {} to {}", result.start, result.end);
    println!("Top K:          {}", config.strategy.top_k);
    println!("Rebalances:     {}", result.decisions.len());
    println!("Skipped months: {}", result.skipped.len());
    if let Some((_, last)) = result.equity.last() {
        println!(
            "Equity:         {:.0} -> {:.0}",
            result.initial_capital, last
        );
    }
    println!();

    match &result.report {
        Some(report) => {
            println!("{:<20} {:>12} {:>12}", "Statistic", "Strategy", "Benchmark");
            println!("{}", "-".repeat(46));
            for row in &report.rows {
                let bench = row
                    .benchmark
                    .map(|b| format_statistic(row.statistic, b))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<20} {:>12} {:>12}",
                    row.statistic.label(),
                    format_statistic(row.statistic, row.strategy),
                    bench
                );
            }
        }
        None => println!("No return days in the backtest window."),
    }

    if let Some(latest) = result.latest_decision() {
        println!();
        println!("Holdings from {}:", latest.date);
        for ticker in &latest.selected {
            let name = config.universe.name_of(ticker).unwrap_or(ticker);
            println!("  {name:<10} ({ticker})");
        }
    }

    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}

/// Prints download progress to stdout.
struct StdoutProgress;

impl DownloadProgress for StdoutProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        println!("[{}/{}] Fetching {symbol}...", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<(), DataError>,
    ) {
        match result {
            Ok(()) => println!("  OK: {symbol}"),
            Err(e) => println!("  FAIL: {symbol}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        println!("{succeeded}/{total} ready, {failed} failed");
    }
}
