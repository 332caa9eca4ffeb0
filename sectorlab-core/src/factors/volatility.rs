//! Trailing volatility: sample standard deviation of daily percentage returns.
//!
//! Returns start at index 1, so the first valid value is at index `period`.

use super::rolling::rolling_std;
use super::Factor;
use crate::panel::pct_change;

#[derive(Debug, Clone)]
pub struct Volatility {
    period: usize,
    name: String,
}

impl Volatility {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "volatility period must be >= 2");
        Self {
            period,
            name: format!("volatility_{period}"),
        }
    }
}

impl Factor for Volatility {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, prices: &[f64]) -> Vec<f64> {
        if prices.is_empty() {
            return Vec::new();
        }
        // Keep returns aligned to price rows: no return on the first row.
        let mut returns = Vec::with_capacity(prices.len());
        returns.push(f64::NAN);
        returns.extend(pct_change(prices));
        rolling_std(&returns, self.period)
    }
}
