//! Engine configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Tunables for the simulated account and trade sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Paper balance a fresh (or reset) account starts with
    pub starting_balance: Decimal,

    /// Leverage applied when an open request does not name one
    pub default_leverage: Decimal,

    /// Upper bound on requested leverage
    pub max_leverage: Decimal,

    /// Mirrored trades sized below this are skipped as dust
    pub min_copy_size: Decimal,

    /// Mirrored trades are capped at this size
    pub max_copy_size: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_balance: dec!(10000), // $10k paper account
            default_leverage: dec!(1),
            max_leverage: dec!(100),
            min_copy_size: dec!(1), // Skip sub-$1 mirrors
            max_copy_size: dec!(5000),
        }
    }
}
