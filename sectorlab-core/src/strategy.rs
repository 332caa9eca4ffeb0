//! Sector-rotation signal pipeline.
//!
//! Wires the stages together: prices → factors → z-scored composite
//! (+ optional regime overlay) → monthly top-K allocation. Every stage
//! output is kept in [`Signals`] so callers can inspect intermediate tables.

use crate::allocator::{allocate, Allocation, DEFAULT_TOP_K};
use crate::factors::{compute_factors, FactorParams, FactorSet};
use crate::panel::Panel;
use crate::regime::{regime_overlay, RegimeConfig, RegimeError};
use crate::scorer::composite_score;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("top_k must be >= 1")]
    InvalidTopK,

    #[error("{name} must be >= {min}, got {value}")]
    InvalidPeriod {
        name: &'static str,
        min: usize,
        value: usize,
    },

    #[error("macro series '{0}' not found")]
    MissingMacroSeries(String),

    #[error("regime overlay: {0}")]
    Regime(RegimeError),
}

impl From<RegimeError> for StrategyError {
    fn from(e: RegimeError) -> Self {
        match e {
            RegimeError::MissingIndicator(name) => StrategyError::MissingMacroSeries(name),
            other => StrategyError::Regime(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub factors: FactorParams,
    pub top_k: usize,
    /// `None` disables the macro overlay entirely.
    pub regime: Option<RegimeConfig>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            factors: FactorParams::default(),
            top_k: DEFAULT_TOP_K,
            regime: Some(RegimeConfig::default()),
        }
    }
}

/// Every intermediate table produced by one pipeline pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Signals {
    pub factors: FactorSet,
    pub overlay: Option<Panel>,
    pub scores: Panel,
    pub allocation: Allocation,
}

impl Signals {
    /// Daily held weights.
    pub fn weights(&self) -> &Panel {
        &self.allocation.weights
    }
}

/// The configured rotation strategy.
#[derive(Debug, Clone)]
pub struct SectorRotation {
    config: StrategyConfig,
}

impl SectorRotation {
    pub fn new(config: StrategyConfig) -> Result<Self, StrategyError> {
        if config.top_k == 0 {
            return Err(StrategyError::InvalidTopK);
        }
        let p = &config.factors;
        for (name, min, value) in [
            ("momentum_period", 1, p.momentum_period),
            ("volatility_period", 2, p.volatility_period),
            ("rsi_period", 1, p.rsi_period),
            ("value_period", 1, p.value_period),
        ] {
            if value < min {
                return Err(StrategyError::InvalidPeriod { name, min, value });
            }
        }
        if let Some(regime) = &config.regime {
            if regime.ma_period == 0 {
                return Err(StrategyError::InvalidPeriod {
                    name: "ma_period",
                    min: 1,
                    value: 0,
                });
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Run the full signal pipeline.
    ///
    /// The overlay is applied only when a regime config is set and a macro
    /// panel is supplied.
    pub fn generate(
        &self,
        prices: &Panel,
        macro_panel: Option<&Panel>,
    ) -> Result<Signals, StrategyError> {
        let factors = compute_factors(prices, &self.config.factors);

        let overlay = match (&self.config.regime, macro_panel) {
            (Some(regime), Some(m)) => Some(regime_overlay(m, prices, regime)?),
            (Some(_), None) => {
                debug!("no macro panel supplied, regime overlay skipped");
                None
            }
            (None, _) => None,
        };

        let scores = composite_score(&factors, overlay.as_ref());
        let allocation = allocate(&scores, self.config.top_k);

        info!(
            assets = prices.n_cols(),
            days = prices.n_rows(),
            rebalances = allocation.decisions.len(),
            skipped = allocation.skipped.len(),
            "signals generated"
        );

        Ok(Signals {
            factors,
            overlay,
            scores,
            allocation,
        })
    }
}
