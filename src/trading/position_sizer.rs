//! Sizing for mirrored trades.

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::CopySizing;

use super::EngineConfig;

/// Applies a copy configuration's sizing mode to a source trade, then
/// clamps the result to the engine's copy-size window.
pub struct CopySizer {
    min_size: Decimal,
    max_size: Decimal,
}

impl CopySizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_size: config.min_copy_size,
            max_size: config.max_copy_size,
        }
    }

    /// Dollar size for our mirror of a source trade. Zero means skip.
    pub fn size(
        &self,
        sizing: &CopySizing,
        source_amount: Decimal,
        portfolio_total: Decimal,
    ) -> Decimal {
        let raw = match sizing {
            CopySizing::Fixed { size } => *size,
            CopySizing::Proportional { multiplier } => source_amount * multiplier,
            CopySizing::Percentage { portfolio_pct } => portfolio_total * portfolio_pct,
        };
        if raw < self.min_size {
            debug!(raw = %raw, min = %self.min_size, "Mirror below minimum size, skipping");
            return Decimal::ZERO;
        }
        raw.min(self.max_size)
    }
}
