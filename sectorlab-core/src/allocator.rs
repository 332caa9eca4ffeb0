//! Monthly top-K allocation.
//!
//! Scores are sampled once per calendar month on the month's last trading
//! day. The K best-scoring assets get `1/K` each. Decisions are then held
//! over the daily calendar and applied from the next trading day, so a
//! weight held on day t only ever reflects scores known at the close of an
//! earlier day.
//!
//! Ties are broken by column order: among equal scores, the asset that
//! appears first in the panel is selected first.

use crate::panel::{month_key, Panel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 5;

/// One monthly rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceDecision {
    /// Last trading day of the month; weights apply from the next day.
    pub date: NaiveDate,
    /// Selected identifiers, best score first.
    pub selected: Vec<String>,
    /// Target weight per panel column.
    pub weights: Vec<f64>,
}

/// Output of the allocator.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub decisions: Vec<RebalanceDecision>,
    /// Month-end dates skipped because fewer than K assets had a score.
    pub skipped: Vec<NaiveDate>,
    /// Daily held weights on the score calendar.
    pub weights: Panel,
}

/// Sample scores once per calendar month.
///
/// The row date is the month's last date in the score index; each asset
/// carries its last non-missing score within that month.
pub fn monthly_scores(scores: &Panel) -> Panel {
    let dates = scores.dates();
    let mut month_ends = Vec::new();
    let mut data: Vec<Vec<f64>> = vec![Vec::new(); scores.n_cols()];

    let mut start = 0;
    while start < dates.len() {
        let key = month_key(dates[start]);
        let mut end = start;
        while end + 1 < dates.len() && month_key(dates[end + 1]) == key {
            end += 1;
        }
        month_ends.push(dates[end]);
        for (col, out) in data.iter_mut().enumerate() {
            let values = &scores.column_at(col)[start..=end];
            let last = values
                .iter()
                .rev()
                .copied()
                .find(|v| !v.is_nan())
                .unwrap_or(f64::NAN);
            out.push(last);
        }
        start = end + 1;
    }

    // Month ends are a subsequence of a sorted index.
    Panel::from_parts(month_ends, scores.columns().to_vec(), data)
}

/// Indices of the `k` highest scores, best first.
///
/// Returns `None` when fewer than `k` scores are present. The sort is stable,
/// so equal scores keep their column order.
pub fn select_top_k(scores: &[f64], k: usize) -> Option<Vec<usize>> {
    let mut valid: Vec<usize> = (0..scores.len()).filter(|&i| !scores[i].is_nan()).collect();
    if valid.len() < k {
        return None;
    }
    valid.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    valid.truncate(k);
    Some(valid)
}

/// Run the monthly selection and expand it to daily held weights.
pub fn allocate(scores: &Panel, top_k: usize) -> Allocation {
    assert!(top_k >= 1, "top_k must be >= 1");
    let monthly = monthly_scores(scores);
    let weight = 1.0 / top_k as f64;

    let mut decisions = Vec::new();
    let mut skipped = Vec::new();

    for (row, &date) in monthly.dates().iter().enumerate() {
        let values = monthly.row(row);
        match select_top_k(&values, top_k) {
            Some(picked) => {
                let mut weights = vec![0.0; monthly.n_cols()];
                for &i in &picked {
                    weights[i] = weight;
                }
                decisions.push(RebalanceDecision {
                    date,
                    selected: picked.iter().map(|&i| monthly.columns()[i].clone()).collect(),
                    weights,
                });
            }
            None => {
                let available = values.iter().filter(|v| !v.is_nan()).count();
                debug!(%date, available, top_k, "skipping rebalance: insufficient universe");
                skipped.push(date);
            }
        }
    }

    let weights = expand_daily(&decisions, scores);
    Allocation {
        decisions,
        skipped,
        weights,
    }
}

/// Hold each decision from the trading day after its date until the next one.
///
/// `template` supplies the daily calendar and column order; days before the
/// first applied decision hold nothing.
pub fn expand_daily(decisions: &[RebalanceDecision], template: &Panel) -> Panel {
    let n_rows = template.n_rows();
    let mut data = vec![vec![0.0; n_rows]; template.n_cols()];
    let mut held: Option<&RebalanceDecision> = None;
    let mut next = decisions.iter().peekable();

    for (row, &date) in template.dates().iter().enumerate() {
        // Apply everything decided strictly before today.
        while let Some(decision) = next.peek() {
            if decision.date < date {
                held = next.next();
            } else {
                break;
            }
        }
        if let Some(decision) = held {
            for (col, w) in decision.weights.iter().enumerate() {
                data[col][row] = *w;
            }
        }
    }

    template.with_data(data)
}
