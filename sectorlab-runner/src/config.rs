//! TOML run configuration.
//!
//! Every section and field is optional; an empty file yields the default
//! NSE rotation (six sectors, top 5, five-year backtest).

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sectorlab_core::allocator::DEFAULT_TOP_K;
use sectorlab_core::data::Universe;
use sectorlab_core::factors::FactorParams;
use sectorlab_core::regime::{default_rules, RegimeConfig, SectorMap, SectorTag};
use sectorlab_core::StrategyConfig;

use crate::backtest::DEFAULT_INITIAL_CAPITAL;
use crate::metrics::RISK_FREE_RATE;

/// History fetched by default: backtest window plus value warm-up plus buffer.
pub const DEFAULT_FETCH_YEARS: i64 = 12;

/// Extra calendar history loaded ahead of the backtest start so every
/// factor window is full on the first backtest day.
pub const WARMUP_DAYS: i64 = 7 * 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub strategy: StrategySection,
    pub backtest: BacktestSection,
    pub universe: Universe,
    pub regime: RegimeSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySection {
    pub top_k: usize,
    #[serde(flatten)]
    pub factors: FactorParams,
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            factors: FactorParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub initial_capital: f64,
    /// Window length counted back from the end date, when `start_date` is unset.
    pub backtest_years: u32,
    pub risk_free_rate: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            backtest_years: 5,
            risk_free_rate: RISK_FREE_RATE,
            start_date: None,
            end_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeSection {
    pub enabled: bool,
    pub ma_period: usize,
    /// Explicit ticker → tags map. When absent, tags come from ticker substrings.
    pub sector_tags: Option<BTreeMap<String, Vec<SectorTag>>>,
}

impl Default for RegimeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ma_period: 50,
            sector_tags: None,
        }
    }
}

impl RotationConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.strategy.top_k == 0 {
            return invalid("strategy.top_k must be >= 1".into());
        }
        let f = &self.strategy.factors;
        for (name, value, min) in [
            ("momentum_period", f.momentum_period, 1),
            ("volatility_period", f.volatility_period, 2),
            ("rsi_period", f.rsi_period, 1),
            ("value_period", f.value_period, 1),
        ] {
            if value < min {
                return invalid(format!("strategy.{name} must be >= {min}, got {value}"));
            }
        }
        if self.regime.ma_period == 0 {
            return invalid("regime.ma_period must be >= 1".into());
        }
        let b = &self.backtest;
        if !(b.initial_capital.is_finite() && b.initial_capital > 0.0) {
            return invalid(format!(
                "backtest.initial_capital must be positive, got {}",
                b.initial_capital
            ));
        }
        if b.start_date.is_none() && b.backtest_years == 0 {
            return invalid("backtest.backtest_years must be >= 1".into());
        }
        if let (Some(start), Some(end)) = (b.start_date, b.end_date) {
            if start >= end {
                return invalid(format!("backtest.start_date {start} is not before end_date {end}"));
            }
        }
        if self.universe.sectors.is_empty() {
            return invalid("universe.sectors is empty".into());
        }
        Ok(())
    }

    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig {
            factors: self.strategy.factors,
            top_k: self.strategy.top_k,
            regime: self.regime_config(),
        }
    }

    /// `None` when the overlay is disabled.
    pub fn regime_config(&self) -> Option<RegimeConfig> {
        if !self.regime.enabled {
            return None;
        }
        let sector_map = match &self.regime.sector_tags {
            Some(tags) => SectorMap::explicit(tags.clone()),
            None => SectorMap::Substring,
        };
        Some(RegimeConfig {
            currency: self.universe.currency.ticker.clone(),
            commodity: self.universe.commodity.ticker.clone(),
            ma_period: self.regime.ma_period,
            rules: default_rules(),
            sector_map,
        })
    }

    /// Inclusive backtest window. `today` stands in for an unset end date.
    pub fn backtest_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = self.backtest.end_date.unwrap_or(today);
        let start = self
            .backtest
            .start_date
            .unwrap_or_else(|| end - Duration::days(i64::from(self.backtest.backtest_years) * 365));
        (start, end)
    }

    /// Inclusive range of history to load: the backtest window plus warm-up,
    /// and never less than [`DEFAULT_FETCH_YEARS`].
    pub fn data_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let (start, end) = self.backtest_window(today);
        let default_start = end - Duration::days(DEFAULT_FETCH_YEARS * 365);
        (default_start.min(start - Duration::days(WARMUP_DAYS)), end)
    }
}
