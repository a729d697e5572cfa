//! Account balance snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Snapshot of the simulated account's funds.
///
/// `available + in_positions == total` holds after every ledger operation,
/// and `total` moves only when realized P&L is booked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    /// Bankroll including all realized P&L to date
    pub total: Decimal,
    /// Funds free to open new positions
    pub available: Decimal,
    /// Funds locked as margin or stake in open positions
    pub in_positions: Decimal,
    /// Unrealized P&L across open positions at current marks
    pub pnl: Decimal,
}

impl Balance {
    pub fn new(starting: Decimal) -> Self {
        Self {
            total: starting,
            available: starting,
            in_positions: Decimal::ZERO,
            pnl: Decimal::ZERO,
        }
    }

    /// What the account would be worth if every position closed at its mark.
    pub fn equity(&self) -> Decimal {
        self.total + self.pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fresh_balance() {
        let balance = Balance::new(dec!(10000));
        assert_eq!(balance.total, dec!(10000));
        assert_eq!(balance.available, dec!(10000));
        assert_eq!(balance.in_positions, Decimal::ZERO);
        assert_eq!(balance.equity(), dec!(10000));
    }

    #[test]
    fn test_wire_field_names() {
        let balance = Balance::new(dec!(10000));
        let json = serde_json::to_string(&balance).unwrap();
        assert!(json.contains("\"inPositions\""));
        assert!(json.contains("\"available\""));
    }
}
