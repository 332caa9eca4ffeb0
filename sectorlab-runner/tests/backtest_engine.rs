//! Integration tests for the backtest engine: alignment, compounding and
//! the metrics report.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use sectorlab_core::{Panel, TimeSeries};
use sectorlab_runner::backtest::Backtest;
use sectorlab_runner::metrics::{PerformanceMetrics, Statistic, RISK_FREE_RATE};

fn dates_from(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    (0..n).map(|i| start + Duration::days(i as i64)).collect()
}

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

/// Price path from a list of daily returns, starting at 100.
fn path(returns: &[f64]) -> Vec<f64> {
    let mut p = vec![100.0];
    for r in returns {
        let last = p[p.len() - 1];
        p.push(last * (1.0 + r));
    }
    p
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn equity_is_capital_times_cumulative_growth(
        returns in prop::collection::vec(-0.05f64..0.05, 2..80),
        capital in 1_000.0f64..1_000_000.0,
    ) {
        let n = returns.len() + 1;
        let dates = dates_from(jan(1), n);
        let prices = Panel::new(dates.clone(), vec!["A".into()], vec![path(&returns)]).unwrap();
        let weights = Panel::new(dates, vec!["A".into()], vec![vec![1.0; n]]).unwrap();

        let run = Backtest::new(&prices, &weights, None, capital).run();
        prop_assert_eq!(run.equity.len(), returns.len());

        let mut growth = 1.0;
        for (t, r) in run.returns.values().iter().enumerate() {
            growth *= 1.0 + r;
            let expected = capital * growth;
            prop_assert!((run.equity.values()[t] - expected).abs() <= 1e-9 * expected);
        }
    }

    #[test]
    fn half_weight_halves_the_return(
        returns in prop::collection::vec(-0.05f64..0.05, 2..40),
    ) {
        let n = returns.len() + 1;
        let dates = dates_from(jan(1), n);
        let prices = Panel::new(dates.clone(), vec!["A".into()], vec![path(&returns)]).unwrap();
        let weights = Panel::new(dates, vec!["A".into()], vec![vec![0.5; n]]).unwrap();

        let run = Backtest::new(&prices, &weights, None, 1.0).run();
        for (got, r) in run.returns.values().iter().zip(&returns) {
            prop_assert!((got - 0.5 * r).abs() < 1e-12);
        }
    }
}

#[test]
fn single_return_metrics() {
    let m = PerformanceMetrics::from_returns(&[0.01], RISK_FREE_RATE).unwrap();
    assert!((m.total_return - 0.01).abs() < 1e-12);
    assert!(m.annualized_return.is_finite());
}

#[test]
fn single_return_through_engine() {
    let prices = Panel::new(vec![jan(1), jan(2)], vec!["A".into()], vec![vec![100.0, 101.0]]).unwrap();
    let weights = prices.filled_like(1.0);
    let bt = Backtest::new(&prices, &weights, None, 100_000.0);
    let report = bt.generate_report().unwrap();
    let total = report.get(Statistic::TotalReturn).unwrap();
    assert!((total.strategy - 0.01).abs() < 1e-12);
    assert!(total.benchmark.is_none());
    assert!((bt.run().equity.values()[0] - 101_000.0).abs() < 1e-6);
}

#[test]
fn misaligned_inputs_use_the_intersection() {
    let prices = Panel::new(
        dates_from(jan(1), 6),
        vec!["A".into(), "B".into()],
        vec![
            vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0],
            vec![50.0, 50.0, 50.0, 50.0, 50.0, 50.0],
        ],
    )
    .unwrap();
    // weights start two days later and carry an unknown column
    let weights = Panel::new(
        dates_from(jan(3), 6),
        vec!["B".into(), "Z".into(), "A".into()],
        vec![vec![0.5; 6], vec![1.0; 6], vec![0.5; 6]],
    )
    .unwrap();
    let bench = TimeSeries::new(dates_from(jan(2), 3), vec![10.0, 11.0, 12.1]).unwrap();

    let bt = Backtest::new(&prices, &weights, Some(&bench), 1.0);
    assert_eq!(bt.dates(), &dates_from(jan(3), 4)[..]);

    let run = bt.run();
    assert_eq!(run.returns.dates(), &dates_from(jan(4), 3)[..]);
    // only A moves; "Z" has no price column and is ignored
    assert!((run.returns.values()[0] - 0.5 * (103.0 / 102.0 - 1.0)).abs() < 1e-12);

    // benchmark keeps only 3rd and 4th Jan: one return day
    let bench_returns = bt.benchmark_returns().unwrap();
    assert_eq!(bench_returns.len(), 1);
    assert!((bench_returns.values()[0] - 0.1).abs() < 1e-12);
}

#[test]
fn missing_asset_return_contributes_nothing() {
    let prices = Panel::new(
        dates_from(jan(1), 3),
        vec!["A".into(), "B".into()],
        vec![vec![100.0, 110.0, 121.0], vec![f64::NAN, 50.0, 55.0]],
    )
    .unwrap();
    let weights = prices.filled_like(0.5);
    let run = Backtest::new(&prices, &weights, None, 1.0).run();
    assert!((run.returns.values()[0] - 0.05).abs() < 1e-12);
    assert!((run.returns.values()[1] - 0.10).abs() < 1e-12);
}

#[test]
fn disjoint_inputs_produce_no_report() {
    let prices = Panel::new(dates_from(jan(1), 3), vec!["A".into()], vec![vec![1.0; 3]]).unwrap();
    let weights = Panel::new(dates_from(jan(10), 3), vec!["A".into()], vec![vec![1.0; 3]]).unwrap();
    let bt = Backtest::new(&prices, &weights, None, 1.0);
    assert!(bt.run().equity.is_empty());
    assert!(bt.generate_report().is_none());
}
