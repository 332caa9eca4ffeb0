//! Cross-sectional scoring.
//!
//! Each factor table is z-scored across assets per day, the four z-scores
//! are blended with fixed weights, and the optional regime overlay is added
//! on top without normalization.

use crate::factors::{FactorSet, EPSILON};
use crate::panel::Panel;

pub const MOMENTUM_WEIGHT: f64 = 0.3;
pub const VALUE_WEIGHT: f64 = 0.3;
pub const RSI_WEIGHT: f64 = 0.2;
pub const VOLATILITY_WEIGHT: f64 = 0.2;

/// Z-score every row of `table` across its columns.
///
/// Mean and sample standard deviation use the non-missing cells only.
/// A row with fewer than two values has no dispersion and comes out fully
/// missing; missing cells stay missing.
pub fn zscore_cross_section(table: &Panel) -> Panel {
    let n_rows = table.n_rows();
    let n_cols = table.n_cols();
    let mut data = vec![vec![f64::NAN; n_rows]; n_cols];

    for row in 0..n_rows {
        let values = table.row(row);
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.len() < 2 {
            continue;
        }
        let count = present.len() as f64;
        let mean = present.iter().sum::<f64>() / count;
        let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1.0);
        let denom = var.sqrt() + EPSILON;
        for (col, v) in values.iter().enumerate() {
            if !v.is_nan() {
                data[col][row] = (v - mean) / denom;
            }
        }
    }

    table.with_data(data)
}

/// Blend the factor z-scores into one composite score per asset per day.
///
/// Momentum and RSI score positively; value deviation and volatility are
/// sign-flipped so that cheaper and calmer assets rank higher. The overlay,
/// when present, must share the factor tables' shape.
pub fn composite_score(factors: &FactorSet, overlay: Option<&Panel>) -> Panel {
    let z_mom = zscore_cross_section(&factors.momentum);
    let z_val = zscore_cross_section(&factors.value);
    let z_rsi = zscore_cross_section(&factors.rsi);
    let z_vol = zscore_cross_section(&factors.volatility);

    let data = (0..z_mom.n_cols())
        .map(|col| {
            let (m, v, r, s) = (
                z_mom.column_at(col),
                z_val.column_at(col),
                z_rsi.column_at(col),
                z_vol.column_at(col),
            );
            (0..z_mom.n_rows())
                .map(|row| {
                    let score = MOMENTUM_WEIGHT * m[row]
                        + VALUE_WEIGHT * -v[row]
                        + RSI_WEIGHT * r[row]
                        + VOLATILITY_WEIGHT * -s[row];
                    match overlay {
                        Some(o) => score + o.value(row, col),
                        None => score,
                    }
                })
                .collect()
        })
        .collect();

    z_mom.with_data(data)
}
