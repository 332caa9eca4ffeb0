//! The traded universe: sector indices, the benchmark and macro series.
//!
//! Each entry is a display name plus a provider ticker; panels are keyed by
//! ticker. In TOML an entry is written as a `["Name", "TICKER"]` pair.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Listing {
    pub name: String,
    pub ticker: String,
}

impl Listing {
    pub fn new(name: impl Into<String>, ticker: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ticker: ticker.into(),
        }
    }
}

impl From<(String, String)> for Listing {
    fn from((name, ticker): (String, String)) -> Self {
        Self { name, ticker }
    }
}

impl From<Listing> for (String, String) {
    fn from(l: Listing) -> Self {
        (l.name, l.ticker)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Universe {
    pub sectors: Vec<Listing>,
    pub benchmark: Listing,
    /// Home-currency exchange rate (quoted as units of home currency per USD).
    pub currency: Listing,
    pub commodity: Listing,
}

impl Default for Universe {
    fn default() -> Self {
        Self::nse_sectors()
    }
}

impl Universe {
    /// Six NSE sector indices against the Nifty 50, with USD/INR and WTI crude as macro inputs.
    pub fn nse_sectors() -> Self {
        Self {
            sectors: vec![
                Listing::new("Bank", "^NSEBANK"),
                Listing::new("IT", "^CNXIT"),
                Listing::new("FMCG", "^CNXFMCG"),
                Listing::new("Auto", "^CNXAUTO"),
                Listing::new("Pharma", "^CNXPHARMA"),
                Listing::new("Metal", "^CNXMETAL"),
            ],
            benchmark: Listing::new("Nifty50", "^NSEI"),
            currency: Listing::new("USDINR", "INR=X"),
            commodity: Listing::new("CrudeOil", "CL=F"),
        }
    }

    pub fn sector_tickers(&self) -> Vec<&str> {
        self.sectors.iter().map(|l| l.ticker.as_str()).collect()
    }

    pub fn macro_tickers(&self) -> Vec<&str> {
        vec![self.currency.ticker.as_str(), self.commodity.ticker.as_str()]
    }

    /// Sectors, then benchmark, then macro.
    pub fn all_tickers(&self) -> Vec<&str> {
        let mut out = self.sector_tickers();
        out.push(self.benchmark.ticker.as_str());
        out.extend(self.macro_tickers());
        out
    }

    /// Display name for a ticker, if it belongs to the universe.
    pub fn name_of(&self, ticker: &str) -> Option<&str> {
        self.sectors
            .iter()
            .chain([&self.benchmark, &self.currency, &self.commodity])
            .find(|l| l.ticker == ticker)
            .map(|l| l.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_universe_layout() {
        let u = Universe::default();
        assert_eq!(u.sectors.len(), 6);
        assert_eq!(u.all_tickers().len(), 9);
        assert_eq!(u.all_tickers()[6], "^NSEI");
        assert_eq!(u.macro_tickers(), vec!["INR=X", "CL=F"]);
        assert_eq!(u.name_of("^CNXPHARMA"), Some("Pharma"));
        assert_eq!(u.name_of("CL=F"), Some("CrudeOil"));
        assert_eq!(u.name_of("SPY"), None);
    }

    #[test]
    fn listing_serializes_as_pair() {
        let json = serde_json::to_string(&Listing::new("IT", "^CNXIT")).unwrap();
        assert_eq!(json, r#"["IT","^CNXIT"]"#);
        let back: Listing = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ticker, "^CNXIT");
    }
}
