//! Performance metrics: pure functions over a daily returns series.
//!
//! Conventions:
//! - 252 trading days per year
//! - sample standard deviation (n - 1)
//! - missing (NaN) returns are dropped before anything is computed
//! - a statistic that is undefined for the input (stdev of one day) is NaN

use sectorlab_core::serde_nan;
use serde::{Deserialize, Serialize};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Annual risk-free rate used for the Sharpe ratio.
pub const RISK_FREE_RATE: f64 = 0.06;

/// Daily rate that compounds to `annual` over one trading year.
pub fn daily_risk_free(annual: f64) -> f64 {
    (1.0 + annual).powf(1.0 / TRADING_DAYS_PER_YEAR) - 1.0
}

/// Undefined statistics are NaN in memory and `null` in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(with = "serde_nan")]
    pub total_return: f64,
    #[serde(with = "serde_nan")]
    pub annualized_return: f64,
    #[serde(with = "serde_nan")]
    pub volatility: f64,
    #[serde(with = "serde_nan")]
    pub sharpe: f64,
    #[serde(with = "serde_nan")]
    pub max_drawdown: f64,
    /// Number of returns the statistics were computed from.
    pub days: usize,
}

impl PerformanceMetrics {
    /// `None` when there is not a single valid return.
    pub fn from_returns(returns: &[f64], annual_risk_free: f64) -> Option<Self> {
        let r: Vec<f64> = returns.iter().copied().filter(|v| !v.is_nan()).collect();
        let days = r.len();
        if days < 1 {
            return None;
        }
        let total = total_return(&r);
        Some(Self {
            total_return: total,
            annualized_return: annualized_return(total, days),
            volatility: volatility(&r),
            sharpe: sharpe_ratio(&r, daily_risk_free(annual_risk_free)),
            max_drawdown: max_drawdown(&r),
            days,
        })
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// prod(1 + r) - 1
pub fn total_return(returns: &[f64]) -> f64 {
    returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0
}

/// (1 + total)^(252 / days) - 1
pub fn annualized_return(total_return: f64, days: usize) -> f64 {
    if days == 0 {
        return f64::NAN;
    }
    (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / days as f64) - 1.0
}

/// Annualized volatility: sample stdev × sqrt(252).
pub fn volatility(returns: &[f64]) -> f64 {
    sample_std(returns) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// (mean(r) - daily_rf) / stdev(r) × sqrt(252). NaN when stdev is zero or undefined.
pub fn sharpe_ratio(returns: &[f64], daily_rf: f64) -> f64 {
    let std = sample_std(returns);
    if std.is_nan() || std == 0.0 {
        return f64::NAN;
    }
    (mean(returns) - daily_rf) / std * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Worst peak-to-trough decline of cumprod(1 + r), as a non-positive fraction.
///
/// The running peak starts at the first cumulative value, not at 1.0, so a
/// loss on the very first day is not counted as a drawdown.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cum = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for r in returns {
        cum *= 1.0 + r;
        peak = peak.max(cum);
        if peak > 0.0 {
            worst = worst.min((cum - peak) / peak);
        }
    }
    worst
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; NaN for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

// ─── Report ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    TotalReturn,
    AnnualizedReturn,
    Volatility,
    SharpeRatio,
    MaxDrawdown,
}

impl Statistic {
    pub const ALL: [Statistic; 5] = [
        Statistic::TotalReturn,
        Statistic::AnnualizedReturn,
        Statistic::Volatility,
        Statistic::SharpeRatio,
        Statistic::MaxDrawdown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Statistic::TotalReturn => "Total Return",
            Statistic::AnnualizedReturn => "Annualized Return",
            Statistic::Volatility => "Volatility",
            Statistic::SharpeRatio => "Sharpe Ratio",
            Statistic::MaxDrawdown => "Max Drawdown",
        }
    }

    /// Sharpe is a ratio; the rest read as percentages.
    pub fn is_percentage(&self) -> bool {
        !matches!(self, Statistic::SharpeRatio)
    }

    pub fn value(&self, m: &PerformanceMetrics) -> f64 {
        match self {
            Statistic::TotalReturn => m.total_return,
            Statistic::AnnualizedReturn => m.annualized_return,
            Statistic::Volatility => m.volatility,
            Statistic::SharpeRatio => m.sharpe,
            Statistic::MaxDrawdown => m.max_drawdown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub statistic: Statistic,
    #[serde(with = "serde_nan")]
    pub strategy: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_nan::option"
    )]
    pub benchmark: Option<f64>,
}

/// Strategy and benchmark statistics side by side, in a fixed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub strategy: PerformanceMetrics,
    pub benchmark: Option<PerformanceMetrics>,
    pub rows: Vec<ReportRow>,
}

impl MetricsReport {
    pub fn new(strategy: PerformanceMetrics, benchmark: Option<PerformanceMetrics>) -> Self {
        let rows = Statistic::ALL
            .iter()
            .map(|s| ReportRow {
                statistic: *s,
                strategy: s.value(&strategy),
                benchmark: benchmark.as_ref().map(|b| s.value(b)),
            })
            .collect();
        Self {
            strategy,
            benchmark,
            rows,
        }
    }

    pub fn get(&self, statistic: Statistic) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.statistic == statistic)
    }
}
