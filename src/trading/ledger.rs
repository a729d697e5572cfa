//! Paper account ledger: balance, open positions, closed-trade history.
//!
//! Every dollar the simulator moves goes through here. The ledger stores
//! the available balance and derives everything else, so the identity
//! `available + locked == starting + realized P&L` can only break through
//! an arithmetic bug. `check` audits it on demand.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::SimError;
use crate::models::{
    Balance, ClosedTrade, Direction, Outcome, Position, PositionKind, TradeOrigin,
};

/// Result of a successful open.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenReceipt {
    pub order_id: String,
    pub position_id: String,
    pub entry_price: Decimal,
    /// Balance locked into the position: margin or full stake
    pub locked: Decimal,
    /// Outcome tokens bought, for prediction positions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares: Option<Decimal>,
}

/// Result of a successful close.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseReceipt {
    pub order_id: String,
    pub position_id: String,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub return_pct: Decimal,
}

/// The simulated account.
#[derive(Debug)]
pub struct Ledger {
    starting_balance: Decimal,
    available: Decimal,
    positions: Vec<Position>,
    closed: Vec<ClosedTrade>,
}

impl Ledger {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            starting_balance,
            available: starting_balance,
            positions: Vec::new(),
            closed: Vec::new(),
        }
    }

    /// Open a leveraged position. Locks `amount / leverage` as margin.
    pub fn open_leveraged(
        &mut self,
        symbol: &str,
        direction: Direction,
        amount: Decimal,
        leverage: Decimal,
        entry_price: Decimal,
        origin: TradeOrigin,
    ) -> Result<OpenReceipt, SimError> {
        if amount <= Decimal::ZERO {
            return Err(SimError::InvalidValue(format!(
                "position amount must be positive, got {}",
                amount
            )));
        }
        if leverage < Decimal::ONE {
            return Err(SimError::InvalidValue(format!(
                "leverage must be at least 1, got {}",
                leverage
            )));
        }
        if entry_price <= Decimal::ZERO {
            return Err(SimError::InvalidValue(format!(
                "entry price must be positive, got {}",
                entry_price
            )));
        }

        let margin = amount / leverage;
        if margin > self.available {
            return Err(SimError::InsufficientBalance {
                required: margin,
                available: self.available,
            });
        }

        let position = Position::leveraged(
            symbol.to_string(),
            direction.side(),
            amount,
            leverage,
            entry_price,
            origin,
        );
        let receipt = OpenReceipt {
            order_id: Uuid::new_v4().to_string(),
            position_id: position.id.clone(),
            entry_price,
            locked: margin,
            shares: None,
        };

        self.available -= margin;
        info!(
            symbol = %symbol,
            direction = %direction,
            amount = %amount,
            leverage = %leverage,
            margin = %margin,
            "Opened leveraged position"
        );
        self.positions.push(position);
        Ok(receipt)
    }

    /// Open a prediction-market position. Locks the full stake.
    pub fn open_prediction(
        &mut self,
        market_id: &str,
        outcome: Outcome,
        amount: Decimal,
        entry_price: Decimal,
        origin: TradeOrigin,
    ) -> Result<OpenReceipt, SimError> {
        if market_id.trim().is_empty() {
            return Err(SimError::MissingField("marketId"));
        }
        if amount <= Decimal::ZERO {
            return Err(SimError::InvalidValue(format!(
                "position amount must be positive, got {}",
                amount
            )));
        }
        if entry_price <= Decimal::ZERO || entry_price > Decimal::ONE {
            return Err(SimError::InvalidValue(format!(
                "outcome price must be in (0, 1], got {}",
                entry_price
            )));
        }
        if amount > self.available {
            return Err(SimError::InsufficientBalance {
                required: amount,
                available: self.available,
            });
        }

        let position = Position::prediction(
            market_id.to_string(),
            outcome,
            amount,
            entry_price,
            origin,
        );
        let shares = match &position.kind {
            PositionKind::Polymarket { shares, .. } => Some(*shares),
            PositionKind::Crypto { .. } => None,
        };
        let receipt = OpenReceipt {
            order_id: Uuid::new_v4().to_string(),
            position_id: position.id.clone(),
            entry_price,
            locked: amount,
            shares,
        };

        self.available -= amount;
        info!(
            market = %market_id,
            outcome = %outcome,
            amount = %amount,
            price = %entry_price,
            "Opened prediction position"
        );
        self.positions.push(position);
        Ok(receipt)
    }

    /// Close a position at `exit_price`: release its stake and settle the
    /// realized P&L into available balance. A realized loss never exceeds
    /// the stake, matching a margin account where liquidation fires at -100%.
    pub fn close(&mut self, position_id: &str, exit_price: Decimal) -> Result<CloseReceipt, SimError> {
        if exit_price <= Decimal::ZERO {
            return Err(SimError::InvalidValue(format!(
                "exit price must be positive, got {}",
                exit_price
            )));
        }
        let idx = self
            .positions
            .iter()
            .position(|p| p.id == position_id)
            .ok_or_else(|| SimError::NotFound(format!("Position {}", position_id)))?;
        if matches!(self.positions[idx].kind, PositionKind::Polymarket { .. })
            && exit_price > Decimal::ONE
        {
            return Err(SimError::InvalidValue(format!(
                "outcome price must be in (0, 1], got {}",
                exit_price
            )));
        }

        let position = self.positions.remove(idx);
        let stake = position.stake();
        let realized = position.pnl_at(exit_price).max(-stake);
        let return_pct = if stake > Decimal::ZERO {
            realized / stake * dec!(100)
        } else {
            Decimal::ZERO
        };

        self.available += stake + realized;

        let receipt = CloseReceipt {
            order_id: Uuid::new_v4().to_string(),
            position_id: position.id.clone(),
            exit_price,
            realized_pnl: realized,
            return_pct,
        };
        info!(
            instrument = %position.instrument_label(),
            exit = %exit_price,
            realized = %realized.round_dp(2),
            return_pct = %return_pct.round_dp(2),
            "Closed position"
        );
        self.closed.push(ClosedTrade {
            order_id: receipt.order_id.clone(),
            position_id: position.id.clone(),
            platform: position.platform(),
            instrument: position.instrument_label().to_string(),
            amount: position.amount,
            entry_price: position.entry_price,
            exit_price,
            realized_pnl: realized,
            return_pct,
            origin: position.origin.clone(),
            opened_at: position.opened_at,
            closed_at: Utc::now(),
        });
        Ok(receipt)
    }

    pub fn position(&self, id: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    /// Most recently opened crypto position matching symbol and direction.
    pub fn find_crypto(&self, symbol: &str, direction: Direction) -> Option<&Position> {
        let side = direction.side();
        self.positions.iter().rev().find(|p| match &p.kind {
            PositionKind::Crypto {
                symbol: held_symbol,
                side: held_side,
                ..
            } => held_symbol == symbol && *held_side == side,
            PositionKind::Polymarket { .. } => false,
        })
    }

    /// Most recent mirror the given config holds on a market outcome.
    pub fn find_copied(&self, config_id: &str, market_id: &str, outcome: Outcome) -> Option<String> {
        self.positions
            .iter()
            .rev()
            .find(|p| {
                matches!(&p.origin, TradeOrigin::Copy(id) if id == config_id)
                    && matches!(
                        &p.kind,
                        PositionKind::Polymarket { market_id: held, outcome: held_outcome, .. }
                            if held == market_id && *held_outcome == outcome
                    )
            })
            .map(|p| p.id.clone())
    }

    /// Positions a strategy opened, oldest first.
    pub fn positions_for_strategy(&self, strategy_id: &str) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|p| matches!(&p.origin, TradeOrigin::Strategy(id) if id == strategy_id))
            .cloned()
            .collect()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed
    }

    pub fn available(&self) -> Decimal {
        self.available
    }

    fn locked_total(&self) -> Decimal {
        self.positions.iter().map(|p| p.stake()).sum()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.closed.iter().map(|t| t.realized_pnl).sum()
    }

    /// Balance snapshot with the caller's unrealized P&L figure attached.
    pub fn balance(&self, unrealized_pnl: Decimal) -> Balance {
        let in_positions = self.locked_total();
        Balance {
            total: self.available + in_positions,
            available: self.available,
            in_positions,
            pnl: unrealized_pnl,
        }
    }

    /// Wipe positions and history and restore the starting balance.
    pub fn reset(&mut self) {
        self.available = self.starting_balance;
        self.positions.clear();
        self.closed.clear();
        info!(starting = %self.starting_balance, "Account reset");
    }

    /// Audit the accounting identity. Empty means healthy.
    pub fn check(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.available < Decimal::ZERO {
            violations.push(format!("available balance is negative: {}", self.available));
        }
        for position in &self.positions {
            if position.stake() <= Decimal::ZERO {
                violations.push(format!(
                    "position {} holds a non-positive stake: {}",
                    position.id,
                    position.stake()
                ));
            }
        }
        let expected = self.starting_balance + self.realized_pnl();
        let actual = self.available + self.locked_total();
        if actual != expected {
            violations.push(format!(
                "balance identity broken: available {} + locked {} != starting {} + realized {}",
                self.available,
                self.locked_total(),
                self.starting_balance,
                self.realized_pnl()
            ));
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Ledger {
        Ledger::new(dec!(10000))
    }

    #[test]
    fn test_open_locks_margin_only() {
        let mut ledger = ledger();
        let receipt = ledger
            .open_leveraged(
                "BTC/USDT",
                Direction::Long,
                dec!(1000),
                dec!(10),
                dec!(65000),
                TradeOrigin::Manual,
            )
            .unwrap();

        // $1000 at 10x locks $100
        assert_eq!(receipt.locked, dec!(100));
        let balance = ledger.balance(Decimal::ZERO);
        assert_eq!(balance.available, dec!(9900));
        assert_eq!(balance.in_positions, dec!(100));
        assert_eq!(balance.total, dec!(10000));
    }

    #[test]
    fn test_open_prediction_buys_shares() {
        let mut ledger = ledger();
        let receipt = ledger
            .open_prediction("0xmarket", Outcome::Yes, dec!(50), dec!(0.40), TradeOrigin::Manual)
            .unwrap();

        // 50 / 0.40 = 125 shares, full stake locked
        assert_eq!(receipt.shares, Some(dec!(125)));
        assert_eq!(receipt.locked, dec!(50));
        assert_eq!(ledger.available(), dec!(9950));
    }

    #[test]
    fn test_insufficient_balance_leaves_account_untouched() {
        let mut ledger = ledger();
        let err = ledger
            .open_prediction("0xmarket", Outcome::Yes, dec!(20000), dec!(0.50), TradeOrigin::Manual)
            .unwrap_err();

        assert!(matches!(err, SimError::InsufficientBalance { .. }));
        assert_eq!(ledger.available(), dec!(10000));
        assert!(ledger.positions().is_empty());
    }

    #[test]
    fn test_open_rejects_bad_inputs() {
        let mut ledger = ledger();
        assert!(matches!(
            ledger.open_leveraged("BTC/USDT", Direction::Long, dec!(0), dec!(1), dec!(65000), TradeOrigin::Manual),
            Err(SimError::InvalidValue(_))
        ));
        assert!(matches!(
            ledger.open_leveraged("BTC/USDT", Direction::Long, dec!(100), dec!(0.5), dec!(65000), TradeOrigin::Manual),
            Err(SimError::InvalidValue(_))
        ));
        assert!(matches!(
            ledger.open_prediction("", Outcome::Yes, dec!(50), dec!(0.40), TradeOrigin::Manual),
            Err(SimError::MissingField("marketId"))
        ));
        assert!(matches!(
            ledger.open_prediction("0xmarket", Outcome::Yes, dec!(50), dec!(1.20), TradeOrigin::Manual),
            Err(SimError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_close_settles_profit() {
        let mut ledger = ledger();
        let receipt = ledger
            .open_leveraged(
                "BTC/USDT",
                Direction::Long,
                dec!(1000),
                dec!(10),
                dec!(65000),
                TradeOrigin::Manual,
            )
            .unwrap();

        // +2% on $1000 notional = +$20 against $100 margin
        let close = ledger.close(&receipt.position_id, dec!(66300)).unwrap();
        assert_eq!(close.realized_pnl, dec!(20));
        assert_eq!(close.return_pct, dec!(20));

        let balance = ledger.balance(Decimal::ZERO);
        assert_eq!(balance.available, dec!(10020));
        assert_eq!(balance.in_positions, Decimal::ZERO);
        assert_eq!(balance.total, dec!(10020));
        assert_eq!(ledger.realized_pnl(), dec!(20));
        assert_eq!(ledger.closed_trades().len(), 1);
    }

    #[test]
    fn test_loss_clamped_at_stake() {
        let mut ledger = ledger();
        let receipt = ledger
            .open_leveraged(
                "BTC/USDT",
                Direction::Long,
                dec!(1000),
                dec!(10),
                dec!(65000),
                TradeOrigin::Manual,
            )
            .unwrap();

        // price halves: raw P&L -$500, but only $100 margin was at risk
        let close = ledger.close(&receipt.position_id, dec!(32500)).unwrap();
        assert_eq!(close.realized_pnl, dec!(-100));
        assert_eq!(close.return_pct, dec!(-100));
        assert_eq!(ledger.balance(Decimal::ZERO).total, dec!(9900));
    }

    #[test]
    fn test_close_unknown_position() {
        let mut ledger = ledger();
        assert!(matches!(
            ledger.close("nope", dec!(1)),
            Err(SimError::NotFound(_))
        ));
    }

    #[test]
    fn test_close_rejects_impossible_outcome_price() {
        let mut ledger = ledger();
        let receipt = ledger
            .open_prediction("0xmarket", Outcome::Yes, dec!(100), dec!(0.40), TradeOrigin::Manual)
            .unwrap();

        // odds never exceed 1; the reject leaves the position open and funded
        assert!(matches!(
            ledger.close(&receipt.position_id, dec!(1.5)),
            Err(SimError::InvalidValue(_))
        ));
        assert_eq!(ledger.positions().len(), 1);
        assert_eq!(ledger.available(), dec!(9900));

        // a resolution at exactly 1.0 still settles
        let close = ledger.close(&receipt.position_id, dec!(1)).unwrap();
        assert_eq!(close.realized_pnl, dec!(150));
        assert_eq!(ledger.available(), dec!(10150));
    }

    #[test]
    fn test_find_crypto_prefers_most_recent() {
        let mut ledger = ledger();
        let first = ledger
            .open_leveraged("BTC/USDT", Direction::Long, dec!(100), dec!(1), dec!(64000), TradeOrigin::Manual)
            .unwrap();
        let second = ledger
            .open_leveraged("BTC/USDT", Direction::Long, dec!(100), dec!(1), dec!(65000), TradeOrigin::Manual)
            .unwrap();
        ledger
            .open_leveraged("ETH/USDT", Direction::Short, dec!(100), dec!(1), dec!(3200), TradeOrigin::Manual)
            .unwrap();

        let found = ledger.find_crypto("BTC/USDT", Direction::Long).unwrap();
        assert_eq!(found.id, second.position_id);
        assert_ne!(found.id, first.position_id);
        assert!(ledger.find_crypto("BTC/USDT", Direction::Short).is_none());
    }

    #[test]
    fn test_find_copied_matches_config_and_outcome() {
        let mut ledger = ledger();
        ledger
            .open_prediction("0xm", Outcome::Yes, dec!(50), dec!(0.40), TradeOrigin::Copy("cfg-1".into()))
            .unwrap();

        assert!(ledger.find_copied("cfg-1", "0xm", Outcome::Yes).is_some());
        assert!(ledger.find_copied("cfg-1", "0xm", Outcome::No).is_none());
        assert!(ledger.find_copied("cfg-2", "0xm", Outcome::Yes).is_none());
    }

    #[test]
    fn test_positions_for_strategy() {
        let mut ledger = ledger();
        ledger
            .open_prediction("0xm", Outcome::Yes, dec!(50), dec!(0.40), TradeOrigin::Strategy("s-1".into()))
            .unwrap();
        ledger
            .open_prediction("0xm", Outcome::Yes, dec!(50), dec!(0.40), TradeOrigin::Manual)
            .unwrap();

        assert_eq!(ledger.positions_for_strategy("s-1").len(), 1);
        assert!(ledger.positions_for_strategy("s-2").is_empty());
    }

    #[test]
    fn test_reset_restores_everything() {
        let mut ledger = ledger();
        let receipt = ledger
            .open_leveraged("BTC/USDT", Direction::Long, dec!(1000), dec!(10), dec!(65000), TradeOrigin::Manual)
            .unwrap();
        ledger.close(&receipt.position_id, dec!(66300)).unwrap();
        ledger.reset();

        assert_eq!(ledger.balance(Decimal::ZERO), Balance::new(dec!(10000)));
        assert!(ledger.positions().is_empty());
        assert!(ledger.closed_trades().is_empty());
    }

    #[test]
    fn test_audit_passes_through_open_and_close() {
        let mut ledger = ledger();
        assert!(ledger.check().is_empty());

        let receipt = ledger
            .open_leveraged("BTC/USDT", Direction::Short, dec!(500), dec!(5), dec!(65000), TradeOrigin::Manual)
            .unwrap();
        assert!(ledger.check().is_empty());

        ledger.close(&receipt.position_id, dec!(60000)).unwrap();
        assert!(ledger.check().is_empty());
    }

    #[test]
    fn test_audit_catches_corruption() {
        let mut ledger = ledger();
        ledger
            .open_prediction("0xm", Outcome::Yes, dec!(50), dec!(0.40), TradeOrigin::Manual)
            .unwrap();

        ledger.available -= dec!(37);
        let violations = ledger.check();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("identity"));

        ledger.available = dec!(-5);
        assert_eq!(ledger.check().len(), 2);
    }
}
