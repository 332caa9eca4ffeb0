//! SectorLab Runner: backtest engine, metrics and rotation runs.
//!
//! This crate builds on `sectorlab-core` to provide:
//! - Vectorized portfolio backtest over daily weights
//! - Performance metrics and strategy/benchmark reports
//! - TOML run configuration
//! - Data loading with cache/download/synthetic fallback
//! - End-to-end rotation runner and artifact export

pub mod backtest;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;

pub use backtest::{Backtest, BacktestRun, DEFAULT_INITIAL_CAPITAL};
pub use config::{ConfigError, RotationConfig};
pub use data_loader::{load_panel, LoadError, LoadOptions, LoadedPanel};
pub use export::save_artifacts;
pub use metrics::{MetricsReport, PerformanceMetrics, Statistic};
pub use runner::{run_rotation, run_rotation_from_data, RotationResult, RunError};
