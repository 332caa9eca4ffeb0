//! Date-indexed tables shared by every pipeline stage.
//!
//! A [`Panel`] is a dates × columns table of `f64` stored column-major.
//! Missing observations are `f64::NAN`, the same convention the factor
//! functions use for warmup. A [`TimeSeries`] is the single-column case
//! (portfolio returns, equity curves, the benchmark).
//!
//! Invariants enforced at construction:
//! - dates are strictly increasing (sorted, no duplicates)
//! - column identifiers are unique
//! - every column holds exactly one value per date

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Structural errors when building a panel or series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PanelError {
    #[error("dates are not strictly increasing at row {row} ({prev} then {next})")]
    UnsortedDates {
        row: usize,
        prev: NaiveDate,
        next: NaiveDate,
    },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("column '{column}' has {actual} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("{columns} column names for {data} data columns")]
    ColumnCountMismatch { columns: usize, data: usize },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

/// Dates × columns table, column-major, NaN = missing.
///
/// Deserialization goes through [`Panel::new`], so a decoded panel holds the
/// same invariants as a constructed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PanelRepr")]
pub struct Panel {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    data: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct PanelRepr {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    #[serde(deserialize_with = "crate::serde_nan::deserialize_columns")]
    data: Vec<Vec<f64>>,
}

impl TryFrom<PanelRepr> for Panel {
    type Error = PanelError;

    fn try_from(repr: PanelRepr) -> Result<Self, Self::Error> {
        Panel::new(repr.dates, repr.columns, repr.data)
    }
}

impl Panel {
    /// Build a panel, validating date order, column uniqueness and shape.
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        data: Vec<Vec<f64>>,
    ) -> Result<Self, PanelError> {
        check_sorted(&dates)?;

        if columns.len() != data.len() {
            return Err(PanelError::ColumnCountMismatch {
                columns: columns.len(),
                data: data.len(),
            });
        }

        let mut seen = HashSet::new();
        for (name, values) in columns.iter().zip(&data) {
            if !seen.insert(name.as_str()) {
                return Err(PanelError::DuplicateColumn(name.clone()));
            }
            if values.len() != dates.len() {
                return Err(PanelError::LengthMismatch {
                    column: name.clone(),
                    expected: dates.len(),
                    actual: values.len(),
                });
            }
        }

        Ok(Self {
            dates,
            columns,
            data,
        })
    }

    /// A panel with no rows and no columns.
    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            columns: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Same dates and columns as `self`, every cell set to `value`.
    pub fn filled_like(&self, value: f64) -> Self {
        Self {
            dates: self.dates.clone(),
            columns: self.columns.clone(),
            data: vec![vec![value; self.dates.len()]; self.columns.len()],
        }
    }

    /// Same dates and columns as `self` with new column data.
    ///
    /// Callers guarantee the shape; used by stages that transform column by column.
    pub(crate) fn with_data(&self, data: Vec<Vec<f64>>) -> Self {
        debug_assert_eq!(data.len(), self.columns.len());
        debug_assert!(data.iter().all(|c| c.len() == self.dates.len()));
        Self {
            dates: self.dates.clone(),
            columns: self.columns.clone(),
            data,
        }
    }

    /// Assemble a panel from parts already known to satisfy the invariants,
    /// e.g. a subsequence of another panel's index.
    pub(crate) fn from_parts(dates: Vec<NaiveDate>, columns: Vec<String>, data: Vec<Vec<f64>>) -> Self {
        debug_assert!(check_sorted(&dates).is_ok());
        debug_assert_eq!(columns.len(), data.len());
        Self {
            dates,
            columns,
            data,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// True when there are no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.columns.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of a named column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_index(name).map(|i| self.data[i].as_slice())
    }

    /// Values of the column at position `index`.
    pub fn column_at(&self, index: usize) -> &[f64] {
        &self.data[index]
    }

    /// All columns in order.
    pub fn column_data(&self) -> &[Vec<f64>] {
        &self.data
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.data[col][row]
    }

    /// One row across all columns.
    pub fn row(&self, row: usize) -> Vec<f64> {
        self.data.iter().map(|c| c[row]).collect()
    }

    /// Position of `date` in the index.
    pub fn row_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Extract one column as a dated series.
    pub fn series(&self, name: &str) -> Option<TimeSeries> {
        self.column(name).map(|values| TimeSeries {
            dates: self.dates.clone(),
            values: values.to_vec(),
        })
    }

    /// Keep only the named columns, in the order given.
    pub fn select_columns(&self, names: &[&str]) -> Result<Self, PanelError> {
        let mut columns = Vec::with_capacity(names.len());
        let mut data = Vec::with_capacity(names.len());
        for name in names {
            let idx = self
                .column_index(name)
                .ok_or_else(|| PanelError::UnknownColumn(name.to_string()))?;
            columns.push(self.columns[idx].clone());
            data.push(self.data[idx].clone());
        }
        Panel::new(self.dates.clone(), columns, data)
    }

    /// Carry the last observed value forward over missing cells.
    ///
    /// Leading missing values stay missing: no history is fabricated.
    pub fn forward_fill(&self) -> Self {
        self.with_data(self.data.iter().map(|c| forward_fill(c)).collect())
    }

    /// Re-express the panel on another calendar by exact date match.
    ///
    /// Dates absent from `self` become missing rows. `dates` must be sorted.
    pub fn reindex(&self, dates: &[NaiveDate]) -> Self {
        let rows: Vec<Option<usize>> = dates.iter().map(|d| self.row_index(*d)).collect();
        let data = self
            .data
            .iter()
            .map(|col| {
                rows.iter()
                    .map(|r| r.map_or(f64::NAN, |i| col[i]))
                    .collect()
            })
            .collect();
        Self {
            dates: dates.to_vec(),
            columns: self.columns.clone(),
            data,
        }
    }

    /// Re-express on `template`'s dates and columns, matching by date and name.
    ///
    /// Cells with no counterpart in `self` take `fill`.
    pub fn conform_to(&self, template: &Panel, fill: f64) -> Self {
        let rows: Vec<Option<usize>> = template.dates.iter().map(|d| self.row_index(*d)).collect();
        let data = template
            .columns
            .iter()
            .map(|name| match self.column(name) {
                Some(col) => rows.iter().map(|r| r.map_or(fill, |i| col[i])).collect(),
                None => vec![fill; rows.len()],
            })
            .collect();
        template.with_data(data)
    }

    /// Keep only rows whose date appears in `dates` (a date-set intersection).
    pub fn restrict_to(&self, dates: &[NaiveDate]) -> Self {
        let common = intersect_dates(&self.dates, dates);
        self.reindex(&common)
    }

    /// Rows with `start <= date <= end`.
    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end).max(lo);
        Self {
            dates: self.dates[lo..hi].to_vec(),
            columns: self.columns.clone(),
            data: self.data.iter().map(|c| c[lo..hi].to_vec()).collect(),
        }
    }

    /// Daily percentage change per column, first row dropped.
    pub fn pct_change(&self) -> Self {
        if self.dates.is_empty() {
            return self.clone();
        }
        Self {
            dates: self.dates[1..].to_vec(),
            columns: self.columns.clone(),
            data: self.data.iter().map(|c| pct_change(c)).collect(),
        }
    }

    /// Per-row `sum_i weights[t, i] * self[t, i]`, columns matched by position.
    ///
    /// A missing cell in either table contributes nothing to its row.
    pub fn weighted_row_sum(&self, weights: &Panel) -> TimeSeries {
        debug_assert_eq!(self.n_cols(), weights.n_cols());
        debug_assert_eq!(self.n_rows(), weights.n_rows());
        let values = (0..self.n_rows())
            .map(|row| {
                self.data
                    .iter()
                    .zip(&weights.data)
                    .map(|(x, w)| x[row] * w[row])
                    .filter(|v| !v.is_nan())
                    .sum()
            })
            .collect();
        TimeSeries {
            dates: self.dates.clone(),
            values,
        }
    }
}

/// A single dated column of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesRepr")]
pub struct TimeSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct SeriesRepr {
    dates: Vec<NaiveDate>,
    #[serde(deserialize_with = "crate::serde_nan::deserialize_values")]
    values: Vec<f64>,
}

impl TryFrom<SeriesRepr> for TimeSeries {
    type Error = PanelError;

    fn try_from(repr: SeriesRepr) -> Result<Self, Self::Error> {
        TimeSeries::new(repr.dates, repr.values)
    }
}

impl TimeSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self, PanelError> {
        check_sorted(&dates)?;
        if dates.len() != values.len() {
            return Err(PanelError::LengthMismatch {
                column: "series".into(),
                expected: dates.len(),
                actual: values.len(),
            });
        }
        Ok(Self { dates, values })
    }

    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        self.dates.last().copied().zip(self.values.last().copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    /// Value at an exact date.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| self.values[i])
    }

    /// Keep only observations whose date appears in `dates`.
    pub fn restrict_to(&self, dates: &[NaiveDate]) -> Self {
        let common = intersect_dates(&self.dates, dates);
        let values = common
            .iter()
            .filter_map(|d| self.get(*d))
            .collect();
        Self {
            dates: common,
            values,
        }
    }

    /// Observations with `start <= date <= end`.
    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end).max(lo);
        Self {
            dates: self.dates[lo..hi].to_vec(),
            values: self.values[lo..hi].to_vec(),
        }
    }

    /// Daily percentage change, first observation dropped.
    pub fn pct_change(&self) -> Self {
        if self.dates.is_empty() {
            return self.clone();
        }
        Self {
            dates: self.dates[1..].to_vec(),
            values: pct_change(&self.values),
        }
    }

    /// Observations whose value is present.
    pub fn drop_missing(&self) -> Self {
        let (dates, values) = self.iter().filter(|(_, v)| !v.is_nan()).unzip();
        Self { dates, values }
    }

    /// Treat values as daily returns and compound them: `start * cumprod(1 + r)`.
    pub fn compound(&self, start: f64) -> Self {
        let mut acc = 1.0;
        let values = self
            .values
            .iter()
            .map(|r| {
                acc *= 1.0 + r;
                start * acc
            })
            .collect();
        Self {
            dates: self.dates.clone(),
            values,
        }
    }
}

// ── Column helpers ──────────────────────────────────────────────────

/// Forward-fill NaN gaps with the last finite value.
pub fn forward_fill(values: &[f64]) -> Vec<f64> {
    let mut last = f64::NAN;
    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                last
            } else {
                last = v;
                v
            }
        })
        .collect()
}

/// `v[t]/v[t-1] - 1` for t >= 1. Missing if either side is missing.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| {
            if w[0].is_nan() || w[1].is_nan() || w[0] == 0.0 {
                f64::NAN
            } else {
                w[1] / w[0] - 1.0
            }
        })
        .collect()
}

/// Sorted intersection of two sorted date lists.
pub fn intersect_dates(a: &[NaiveDate], b: &[NaiveDate]) -> Vec<NaiveDate> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Calendar month key used for monthly resampling.
pub fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

/// True when no weekday of the same calendar month follows `date`.
///
/// Exchange holidays are not known here, so a month whose data ends on the
/// day before a trailing holiday still reads as incomplete.
pub fn is_last_weekday_of_month(date: NaiveDate) -> bool {
    let mut day = date;
    while let Some(next) = day.succ_opt() {
        if next.month() != date.month() {
            return true;
        }
        if !matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        day = next;
    }
    true
}

fn check_sorted(dates: &[NaiveDate]) -> Result<(), PanelError> {
    for (row, w) in dates.windows(2).enumerate() {
        if w[1] <= w[0] {
            return Err(PanelError::UnsortedDates {
                row: row + 1,
                prev: w[0],
                next: w[1],
            });
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_dates(n: usize) -> Vec<NaiveDate> {
    let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    (0..n)
        .map(|i| base + chrono::Duration::days(i as i64))
        .collect()
}
