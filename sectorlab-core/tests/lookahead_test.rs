//! Look-ahead contamination tests.
//!
//! No factor value, score or held weight at day t may depend on prices
//! after t. Factors are checked by truncation (prefix of the full run must
//! equal the truncated run); the full pipeline is checked by perturbing
//! every price after a cutoff and comparing weights up to the cutoff.

use chrono::{Datelike, NaiveDate, Weekday};
use sectorlab_core::factors::{Factor, FactorParams, Momentum, Rsi, ValueDeviation, Volatility};
use sectorlab_core::regime::RegimeConfig;
use sectorlab_core::{Panel, SectorRotation, StrategyConfig};

fn weekdays(n: usize) -> Vec<NaiveDate> {
    let mut d = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(d);
        }
        d = d.succ_opt().unwrap();
    }
    out
}

/// Deterministic LCG random walk.
fn walk(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
    let mut price = 100.0;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let u = (state >> 33) as f64 / (1u64 << 31) as f64; // [0, 1)
            price *= 1.0 + (u - 0.5) * 0.04;
            price
        })
        .collect()
}

fn sector_panel(n: usize) -> Panel {
    let tickers = ["^NSEBANK", "^CNXIT", "^CNXFMCG", "^CNXAUTO", "^CNXPHARMA", "^CNXMETAL"];
    Panel::new(
        weekdays(n),
        tickers.iter().map(|t| t.to_string()).collect(),
        tickers.iter().enumerate().map(|(i, _)| walk(n, i as u64 + 1)).collect(),
    )
    .unwrap()
}

fn macro_panel(n: usize) -> Panel {
    Panel::new(
        weekdays(n),
        vec!["INR=X".into(), "CL=F".into()],
        vec![walk(n, 101), walk(n, 202)],
    )
    .unwrap()
}

/// Multiply every value at or after `from_row` by `factor`.
fn perturb_after(panel: &Panel, from_row: usize, factor: f64) -> Panel {
    let data = panel
        .column_data()
        .iter()
        .map(|col| {
            col.iter()
                .enumerate()
                .map(|(i, v)| if i >= from_row { v * factor } else { *v })
                .collect()
        })
        .collect();
    Panel::new(panel.dates().to_vec(), panel.columns().to_vec(), data).unwrap()
}

fn assert_prefix_identical(name: &str, truncated: &[f64], full: &[f64]) {
    for (i, (t, f)) in truncated.iter().zip(full).enumerate() {
        if t.is_nan() && f.is_nan() {
            continue;
        }
        assert!(
            t.to_bits() == f.to_bits(),
            "{name}: value at row {i} changed with future data (truncated={t}, full={f})"
        );
    }
}

#[test]
fn factors_do_not_look_ahead() {
    let prices = walk(400, 7);
    let factors: Vec<Box<dyn Factor>> = vec![
        Box::new(Momentum::new(20)),
        Box::new(Volatility::new(20)),
        Box::new(Rsi::new(14)),
        Box::new(ValueDeviation::new(60)),
    ];
    for factor in &factors {
        let full = factor.compute(&prices);
        let truncated = factor.compute(&prices[..250]);
        assert_eq!(truncated.len(), 250);
        assert_prefix_identical(factor.name(), &truncated, &full[..250]);
    }
}

#[test]
fn weights_ignore_prices_after_cutoff_with_default_params() {
    let n = 1500;
    let prices = sector_panel(n);
    let macro_data = macro_panel(n);
    let strategy = SectorRotation::new(StrategyConfig::default()).unwrap();

    let base = strategy.generate(&prices, Some(&macro_data)).unwrap();
    assert!(
        !base.allocation.decisions.is_empty(),
        "1500 days should leave room for rebalances after the 1260-day warm-up"
    );

    for cutoff in [1300, 1350, 1420] {
        let shocked = strategy
            .generate(
                &perturb_after(&prices, cutoff + 1, 1.7),
                Some(&perturb_after(&macro_data, cutoff + 1, 0.6)),
            )
            .unwrap();
        for col in 0..prices.n_cols() {
            assert_prefix_identical(
                "weights",
                &base.weights().column_at(col)[..=cutoff],
                &shocked.weights().column_at(col)[..=cutoff],
            );
            assert_prefix_identical(
                "scores",
                &base.scores.column_at(col)[..=cutoff],
                &shocked.scores.column_at(col)[..=cutoff],
            );
        }
    }
}

#[test]
fn shock_on_rebalance_day_only_moves_later_weights() {
    let n = 260;
    let prices = sector_panel(n);
    let strategy = SectorRotation::new(StrategyConfig {
        factors: FactorParams {
            momentum_period: 20,
            volatility_period: 20,
            rsi_period: 14,
            value_period: 60,
        },
        top_k: 2,
        regime: Some(RegimeConfig::default()),
    })
    .unwrap();
    let base = strategy.generate(&prices, None).unwrap();

    // Shock exactly on a rebalance date: the decision may change, but the
    // weights held on that date may not.
    let decision = base.allocation.decisions[2].date;
    let row = prices.row_index(decision).unwrap();
    let shocked = strategy
        .generate(&perturb_after(&prices, row, 3.0), None)
        .unwrap();
    for col in 0..prices.n_cols() {
        assert_prefix_identical(
            "weights",
            &base.weights().column_at(col)[..=row],
            &shocked.weights().column_at(col)[..=row],
        );
    }
}
