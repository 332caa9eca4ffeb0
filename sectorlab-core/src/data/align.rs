//! Multi-symbol time alignment.
//!
//! Per-symbol bars are laid onto the union of their dates. A symbol with no
//! bar on a date gets NaN there; no forward-fill happens at this stage.

use super::provider::RawBar;
use crate::panel::{Panel, PanelError};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// Build a price panel from `(ticker, bars)` pairs, keeping the given column order.
///
/// Each cell is the bar's adjusted close, falling back to close.
pub fn bars_to_panel(series: &[(String, Vec<RawBar>)]) -> Result<Panel, PanelError> {
    let dates: Vec<NaiveDate> = series
        .iter()
        .flat_map(|(_, bars)| bars.iter().map(|b| b.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let row_of: HashMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut columns = Vec::with_capacity(series.len());
    let mut data = Vec::with_capacity(series.len());
    for (symbol, bars) in series {
        let mut values = vec![f64::NAN; dates.len()];
        for bar in bars {
            values[row_of[&bar.date]] = bar.price();
        }
        columns.push(symbol.clone());
        data.push(values);
    }

    Panel::new(dates, columns, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> RawBar {
        RawBar {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1000,
            adj_close: close,
        }
    }

    #[test]
    fn union_of_dates_with_nan_gaps() {
        let panel = bars_to_panel(&[
            (
                "^CNXIT".into(),
                vec![bar("2024-01-02", 100.0), bar("2024-01-03", 101.0), bar("2024-01-04", 102.0)],
            ),
            ("^CNXAUTO".into(), vec![bar("2024-01-02", 200.0), bar("2024-01-04", 202.0)]),
        ])
        .unwrap();

        assert_eq!(panel.n_rows(), 3);
        assert_eq!(panel.columns(), &["^CNXIT".to_string(), "^CNXAUTO".to_string()]);
        assert_eq!(panel.column("^CNXIT").unwrap()[1], 101.0);
        assert!(panel.column("^CNXAUTO").unwrap()[1].is_nan());
    }

    #[test]
    fn uses_adjusted_close() {
        let mut b = bar("2024-01-02", 100.0);
        b.adj_close = 95.0;
        let panel = bars_to_panel(&[("X".into(), vec![b])]).unwrap();
        assert_eq!(panel.value(0, 0), 95.0);
    }

    #[test]
    fn duplicate_ticker_is_rejected() {
        let err = bars_to_panel(&[
            ("X".into(), vec![bar("2024-01-02", 1.0)]),
            ("X".into(), vec![bar("2024-01-02", 2.0)]),
        ])
        .unwrap_err();
        assert_eq!(err, PanelError::DuplicateColumn("X".into()));
    }
}
