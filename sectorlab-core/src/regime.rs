//! Macro regime overlay.
//!
//! Turns currency and commodity trend conditions into an additive score
//! adjustment per asset per day. A condition holds on a day when the macro
//! series closes above its own trailing moving average; each [`RegimeRule`]
//! then nudges every asset carrying the rule's sector tag.
//!
//! Sector membership comes from a [`SectorMap`]. The default map derives tags
//! from identifier substrings ("IT", "PHARMA", "AUTO"); callers with a real
//! taxonomy pass an explicit map instead.

use crate::factors::rolling::rolling_mean;
use crate::panel::Panel;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegimeError {
    #[error("macro series '{0}' not found in macro panel")]
    MissingIndicator(String),

    #[error("regime moving-average period must be >= 1")]
    InvalidPeriod,
}

/// Sector classification used by regime rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorTag {
    It,
    Pharma,
    Auto,
    Bank,
    Fmcg,
    Metal,
}

/// Identifier substrings recognised by the default sector map.
const SUBSTRING_TAGS: [(&str, SectorTag); 3] = [
    ("IT", SectorTag::It),
    ("PHARMA", SectorTag::Pharma),
    ("AUTO", SectorTag::Auto),
];

/// Asset identifier → sector tags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorMap {
    /// Case-sensitive substring match on the identifier.
    #[default]
    Substring,
    /// Exact identifier lookup; unlisted assets carry no tags.
    Explicit(BTreeMap<String, Vec<SectorTag>>),
}

impl SectorMap {
    pub fn explicit(map: BTreeMap<String, Vec<SectorTag>>) -> Self {
        Self::Explicit(map)
    }

    /// Tags for one asset. An identifier may carry several tags.
    pub fn tags_for(&self, asset: &str) -> Vec<SectorTag> {
        match self {
            SectorMap::Substring => SUBSTRING_TAGS
                .iter()
                .filter(|(pattern, _)| asset.contains(pattern))
                .map(|(_, tag)| *tag)
                .collect(),
            SectorMap::Explicit(map) => map.get(asset).cloned().unwrap_or_default(),
        }
    }
}

/// Macro trend condition evaluated per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeCondition {
    /// Currency rate above its moving average (home currency weakening).
    CurrencyWeak,
    /// Commodity price above its moving average.
    CommodityHigh,
}

/// Add `adjustment` to every asset tagged `tag` on days where `condition` holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeRule {
    pub condition: RegimeCondition,
    pub tag: SectorTag,
    pub adjustment: f64,
}

/// Weak currency favours exporters (IT, pharma); expensive crude hurts autos.
pub fn default_rules() -> Vec<RegimeRule> {
    vec![
        RegimeRule {
            condition: RegimeCondition::CurrencyWeak,
            tag: SectorTag::It,
            adjustment: 0.5,
        },
        RegimeRule {
            condition: RegimeCondition::CurrencyWeak,
            tag: SectorTag::Pharma,
            adjustment: 0.5,
        },
        RegimeRule {
            condition: RegimeCondition::CommodityHigh,
            tag: SectorTag::Auto,
            adjustment: -0.5,
        },
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeConfig {
    /// Macro panel column holding the currency rate.
    pub currency: String,
    /// Macro panel column holding the commodity price.
    pub commodity: String,
    pub ma_period: usize,
    pub rules: Vec<RegimeRule>,
    pub sector_map: SectorMap,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            currency: "INR=X".into(),
            commodity: "CL=F".into(),
            ma_period: 50,
            rules: default_rules(),
            sector_map: SectorMap::default(),
        }
    }
}

/// Per-day regime conditions on the price calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeFlags {
    pub dates: Vec<NaiveDate>,
    pub currency_weak: Vec<bool>,
    pub commodity_high: Vec<bool>,
}

impl RegimeFlags {
    pub fn holds(&self, condition: RegimeCondition, row: usize) -> bool {
        match condition {
            RegimeCondition::CurrencyWeak => self.currency_weak[row],
            RegimeCondition::CommodityHigh => self.commodity_high[row],
        }
    }
}

/// Evaluate the regime conditions on `calendar`.
///
/// Macro data is matched to the calendar by exact date and then
/// forward-filled, so macro observations on non-trading days are ignored.
pub fn regime_flags(
    macro_panel: &Panel,
    calendar: &[NaiveDate],
    config: &RegimeConfig,
) -> Result<RegimeFlags, RegimeError> {
    if config.ma_period == 0 {
        return Err(RegimeError::InvalidPeriod);
    }
    let aligned = macro_panel.reindex(calendar).forward_fill();
    let above_ma = |name: &str| -> Result<Vec<bool>, RegimeError> {
        let series = aligned
            .column(name)
            .ok_or_else(|| RegimeError::MissingIndicator(name.to_string()))?;
        let ma = rolling_mean(series, config.ma_period);
        // NaN comparisons are false: no regime before the average exists.
        Ok(series.iter().zip(&ma).map(|(v, m)| v > m).collect())
    };

    Ok(RegimeFlags {
        dates: calendar.to_vec(),
        currency_weak: above_ma(&config.currency)?,
        commodity_high: above_ma(&config.commodity)?,
    })
}

/// Additive score adjustment shaped like `prices`.
pub fn regime_overlay(
    macro_panel: &Panel,
    prices: &Panel,
    config: &RegimeConfig,
) -> Result<Panel, RegimeError> {
    let flags = regime_flags(macro_panel, prices.dates(), config)?;
    Ok(apply_rules(&flags, prices, config))
}

/// Build the adjustment table from precomputed flags.
pub fn apply_rules(flags: &RegimeFlags, prices: &Panel, config: &RegimeConfig) -> Panel {
    let n = prices.n_rows();
    let data = prices
        .columns()
        .iter()
        .map(|asset| {
            let tags = config.sector_map.tags_for(asset);
            let mut adj = vec![0.0; n];
            for rule in config.rules.iter().filter(|r| tags.contains(&r.tag)) {
                for (row, a) in adj.iter_mut().enumerate() {
                    if flags.holds(rule.condition, row) {
                        *a += rule.adjustment;
                    }
                }
            }
            if !tags.is_empty() {
                debug!(asset = %asset, tags = ?tags, "regime tags");
            }
            adj
        })
        .collect();
    prices.with_data(data)
}
