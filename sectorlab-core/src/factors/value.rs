//! Value-deviation proxy: distance of price from its long-run average.
//!
//! VAL[t] = (price[t] - SMA_period[t]) / (SMA_period[t] + EPSILON)
//! Negative values mean the asset trades below its multi-year average.
//! Lookback: period - 1.

use super::rolling::rolling_mean;
use super::{Factor, EPSILON};

#[derive(Debug, Clone)]
pub struct ValueDeviation {
    period: usize,
    name: String,
}

impl ValueDeviation {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "value period must be >= 1");
        Self {
            period,
            name: format!("value_{period}"),
        }
    }
}

impl Factor for ValueDeviation {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, prices: &[f64]) -> Vec<f64> {
        rolling_mean(prices, self.period)
            .into_iter()
            .zip(prices)
            .map(|(sma, &p)| (p - sma) / (sma + EPSILON))
            .collect()
    }
}
