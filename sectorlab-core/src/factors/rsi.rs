//! RSI-style trend oscillator.
//!
//! Simple (not Wilder) averages over the trailing `period` price changes:
//! rs = avg_gain / (avg_loss + EPSILON), RSI = 100 - 100 / (1 + rs).
//!
//! A price with no earlier price to difference against (the first row, or
//! the first observation after a leading gap) contributes a zero change, so
//! the first value lands at row `period - 1`. Only a missing price itself
//! makes its change, and every window containing it, missing.
//!
//! Higher RSI scores as favorable downstream: it is read as trend
//! confirmation, not as an overbought warning.

use super::{Factor, EPSILON};

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Factor for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, prices: &[f64]) -> Vec<f64> {
        let n = prices.len();
        let mut result = vec![f64::NAN; n];

        if n < self.period {
            return result;
        }

        let changes: Vec<f64> = (0..n)
            .map(|i| match (i.checked_sub(1).map(|j| prices[j]), prices[i]) {
                (_, p) if p.is_nan() => f64::NAN,
                (Some(prev), p) if !prev.is_nan() => p - prev,
                _ => 0.0,
            })
            .collect();

        for i in (self.period - 1)..n {
            let window = &changes[(i + 1 - self.period)..=i];
            if window.iter().any(|c| c.is_nan()) {
                continue;
            }
            let gain = window.iter().map(|c| c.max(0.0)).sum::<f64>() / self.period as f64;
            let loss = window.iter().map(|c| (-c).max(0.0)).sum::<f64>() / self.period as f64;
            let rs = gain / (loss + EPSILON);
            result[i] = 100.0 - 100.0 / (1.0 + rs);
        }

        result
    }
}
