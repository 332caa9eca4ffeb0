//! Vectorized portfolio backtest.
//!
//! Weights are taken as already lagged: the weight on day t is the position
//! held over day t's return. No re-lag, no costs.

use crate::metrics::{MetricsReport, PerformanceMetrics, RISK_FREE_RATE};
use sectorlab_core::panel::intersect_dates;
use sectorlab_core::{Panel, TimeSeries};
use tracing::debug;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;

/// Portfolio returns and equity, both dated from the second common day.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRun {
    pub returns: TimeSeries,
    pub equity: TimeSeries,
}

#[derive(Debug, Clone)]
pub struct Backtest {
    prices: Panel,
    weights: Panel,
    benchmark: Option<TimeSeries>,
    initial_capital: f64,
    risk_free_rate: f64,
}

impl Backtest {
    /// Align prices, weights and benchmark on their common dates.
    ///
    /// Weight columns are matched to price columns by name; a price column
    /// with no weights is held at zero.
    pub fn new(
        prices: &Panel,
        weights: &Panel,
        benchmark: Option<&TimeSeries>,
        initial_capital: f64,
    ) -> Self {
        let common = intersect_dates(prices.dates(), weights.dates());
        let prices = prices.reindex(&common);
        let weights = weights.conform_to(&prices, 0.0);
        let benchmark = benchmark.map(|b| b.restrict_to(&common));
        debug!(
            days = common.len(),
            assets = prices.n_cols(),
            has_benchmark = benchmark.is_some(),
            "backtest aligned"
        );
        Self {
            prices,
            weights,
            benchmark,
            initial_capital,
            risk_free_rate: RISK_FREE_RATE,
        }
    }

    pub fn with_risk_free_rate(mut self, annual: f64) -> Self {
        self.risk_free_rate = annual;
        self
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn dates(&self) -> &[chrono::NaiveDate] {
        self.prices.dates()
    }

    /// Daily portfolio returns and the compounded equity curve.
    pub fn run(&self) -> BacktestRun {
        let asset_returns = self.prices.pct_change();
        let held = self.weights.conform_to(&asset_returns, 0.0);
        let returns = asset_returns.weighted_row_sum(&held);
        let equity = returns.compound(self.initial_capital);
        BacktestRun { returns, equity }
    }

    pub fn calculate_metrics(&self, returns: &TimeSeries) -> Option<PerformanceMetrics> {
        PerformanceMetrics::from_returns(returns.values(), self.risk_free_rate)
    }

    /// Benchmark daily returns over the aligned window, missing days dropped.
    pub fn benchmark_returns(&self) -> Option<TimeSeries> {
        self.benchmark.as_ref().map(|b| b.pct_change().drop_missing())
    }

    /// Benchmark value path scaled to the same starting capital.
    pub fn benchmark_equity(&self) -> Option<TimeSeries> {
        self.benchmark_returns()
            .map(|r| r.compound(self.initial_capital))
    }

    /// Strategy statistics, with benchmark statistics alongside when available.
    ///
    /// `None` when the aligned window has no return days.
    pub fn generate_report(&self) -> Option<MetricsReport> {
        let run = self.run();
        let strategy = self.calculate_metrics(&run.returns)?;
        let benchmark = self
            .benchmark_returns()
            .and_then(|r| self.calculate_metrics(&r));
        Some(MetricsReport::new(strategy, benchmark))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Statistic;
    use chrono::NaiveDate;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect()
    }

    fn prices() -> Panel {
        Panel::new(
            dates(4),
            vec!["A".into(), "B".into()],
            vec![vec![100.0, 110.0, 99.0, 99.0], vec![50.0, 50.0, 55.0, 66.0]],
        )
        .unwrap()
    }

    #[test]
    fn portfolio_return_is_weighted_asset_return() {
        let weights = Panel::new(
            dates(4),
            vec!["A".into(), "B".into()],
            vec![vec![0.0, 1.0, 0.5, 0.0], vec![0.0, 0.0, 0.5, 1.0]],
        )
        .unwrap();
        let bt = Backtest::new(&prices(), &weights, None, 1000.0);
        let run = bt.run();
        assert_eq!(run.returns.dates(), &dates(4)[1..]);
        let r = run.returns.values();
        assert!((r[0] - 0.10).abs() < 1e-12);
        // 0.5 * (-0.1) + 0.5 * 0.1
        assert!(r[1].abs() < 1e-12);
        assert!((r[2] - 0.2).abs() < 1e-12);
        assert!((run.equity.values()[2] - 1000.0 * 1.1 * 1.0 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn missing_weight_column_holds_nothing() {
        let weights = Panel::new(dates(4), vec!["A".into()], vec![vec![1.0; 4]]).unwrap();
        let run = Backtest::new(&prices(), &weights, None, 1.0).run();
        assert!((run.returns.values()[0] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn indices_are_intersected() {
        let weights = Panel::new(
            dates(6)[2..].to_vec(),
            vec!["A".into(), "B".into()],
            vec![vec![1.0; 4], vec![0.0; 4]],
        )
        .unwrap();
        let bt = Backtest::new(&prices(), &weights, None, 1.0);
        assert_eq!(bt.dates(), &dates(4)[2..]);
        assert_eq!(bt.run().returns.len(), 1);
    }

    #[test]
    fn disjoint_indices_give_empty_result() {
        let weights = Panel::new(
            dates(10)[6..].to_vec(),
            vec!["A".into()],
            vec![vec![1.0; 4]],
        )
        .unwrap();
        let bt = Backtest::new(&prices(), &weights, None, 1.0);
        assert!(bt.run().returns.is_empty());
        assert!(bt.generate_report().is_none());
    }

    #[test]
    fn report_includes_benchmark_when_given() {
        let weights = prices().filled_like(0.5);
        let bench = TimeSeries::new(dates(4), vec![10.0, 10.5, 10.0, 11.0]).unwrap();
        let bt = Backtest::new(&prices(), &weights, Some(&bench), 100.0);
        let report = bt.generate_report().unwrap();
        let total = report.get(Statistic::TotalReturn).unwrap();
        assert!((total.benchmark.unwrap() - 0.1).abs() < 1e-12);

        let beq = bt.benchmark_equity().unwrap();
        assert_eq!(beq.len(), 3);
        assert!((beq.values()[2] - 110.0).abs() < 1e-9);
    }
}
