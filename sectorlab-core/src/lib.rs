//! SectorLab Core: signal engine for monthly sector rotation.
//!
//! - Date-indexed panels (prices, factors, scores, weights)
//! - Per-asset factors: momentum, volatility, RSI, value deviation
//! - Macro regime overlay with explicit sector tags
//! - Cross-sectional scoring and monthly top-K allocation
//! - Data collaborators: provider trait, Yahoo client, blob-backed bar cache

pub mod allocator;
pub mod data;
pub mod factors;
pub mod panel;
pub mod regime;
pub mod scorer;
pub mod serde_nan;
pub mod strategy;

pub use allocator::{allocate, Allocation, RebalanceDecision};
pub use panel::{Panel, PanelError, TimeSeries};
pub use strategy::{SectorRotation, Signals, StrategyConfig, StrategyError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: pipeline outputs can move across threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Panel>();
        require_sync::<Panel>();
        require_send::<TimeSeries>();
        require_sync::<TimeSeries>();
        require_send::<Signals>();
        require_sync::<Signals>();
        require_send::<SectorRotation>();
        require_sync::<SectorRotation>();
        require_send::<data::BarCache<'static>>();
        require_sync::<data::BarCache<'static>>();
        require_send::<data::YahooProvider>();
        require_sync::<data::YahooProvider>();
    }
}
