//! Factor engine: per-asset raw factors over a price panel.
//!
//! Every factor is a pure function of one asset's price history. The engine
//! forward-fills the panel once, then computes each factor column by column
//! (in parallel across assets). No value at row t depends on prices after t.

pub mod momentum;
pub mod rolling;
pub mod rsi;
pub mod value;
pub mod volatility;

pub use momentum::Momentum;
pub use rsi::Rsi;
pub use value::ValueDeviation;
pub use volatility::Volatility;

use crate::panel::Panel;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Additive guard against division by zero in ratios and z-scores.
pub const EPSILON: f64 = 1e-6;

/// A single-asset factor.
///
/// `compute` returns a series of the same length as `prices`; the first
/// `lookback()` values (and any value whose window touches a missing price)
/// are `f64::NAN`.
pub trait Factor: Send + Sync {
    /// Short name, e.g. "momentum_252".
    fn name(&self) -> &str;

    /// Rows needed before the first valid value.
    fn lookback(&self) -> usize;

    fn compute(&self, prices: &[f64]) -> Vec<f64>;
}

/// Lookback windows for the four factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorParams {
    pub momentum_period: usize,
    pub volatility_period: usize,
    pub rsi_period: usize,
    pub value_period: usize,
}

impl Default for FactorParams {
    fn default() -> Self {
        Self {
            momentum_period: 252,
            volatility_period: 126,
            rsi_period: 14,
            value_period: 252 * 5,
        }
    }
}

/// The four raw factor tables, each shaped like the price panel.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorSet {
    pub momentum: Panel,
    pub volatility: Panel,
    pub rsi: Panel,
    pub value: Panel,
}

/// Compute all four factors for every asset in `prices`.
pub fn compute_factors(prices: &Panel, params: &FactorParams) -> FactorSet {
    let filled = prices.forward_fill();
    FactorSet {
        momentum: apply_factor(&filled, &Momentum::new(params.momentum_period)),
        volatility: apply_factor(&filled, &Volatility::new(params.volatility_period)),
        rsi: apply_factor(&filled, &Rsi::new(params.rsi_period)),
        value: apply_factor(&filled, &ValueDeviation::new(params.value_period)),
    }
}

/// Run one factor over every column of a panel.
///
/// Columns are independent, so they are computed in parallel; `collect`
/// preserves column order.
pub fn apply_factor(prices: &Panel, factor: &dyn Factor) -> Panel {
    let data: Vec<Vec<f64>> = prices
        .column_data()
        .par_iter()
        .map(|col| factor.compute(col))
        .collect();
    prices.with_data(data)
}

/// Assert two f64 values are approximately equal.
#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}
