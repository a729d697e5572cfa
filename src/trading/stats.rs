//! Session performance summary.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::models::{Balance, ClosedTrade};

/// Aggregate performance over one simulator session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub starting_balance: Decimal,
    pub total: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub open_positions: usize,
    pub closed_trades: usize,
    /// Fraction of closed trades with positive realized P&L
    pub win_rate: f64,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    /// Gross profit / gross loss. Infinite when nothing was lost.
    pub profit_factor: f64,
    /// Mean / std dev of per-trade returns. Not annualized.
    pub sharpe_ratio: f64,
}

impl SessionStats {
    pub fn compute(
        starting_balance: Decimal,
        balance: &Balance,
        open_positions: usize,
        trades: &[ClosedTrade],
    ) -> Self {
        let wins: Vec<Decimal> = trades
            .iter()
            .filter(|t| t.realized_pnl > Decimal::ZERO)
            .map(|t| t.realized_pnl)
            .collect();
        let losses: Vec<Decimal> = trades
            .iter()
            .filter(|t| t.realized_pnl < Decimal::ZERO)
            .map(|t| t.realized_pnl)
            .collect();

        let win_rate = if trades.is_empty() {
            0.0
        } else {
            wins.len() as f64 / trades.len() as f64
        };

        let gross_profit: Decimal = wins.iter().copied().sum();
        let gross_loss: Decimal = losses.iter().map(|pnl| -pnl).sum();
        let profit_factor = if gross_loss > Decimal::ZERO {
            (gross_profit / gross_loss).to_f64().unwrap_or(0.0)
        } else if gross_profit > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        };

        Self {
            starting_balance,
            total: balance.total,
            realized_pnl: balance.total - starting_balance,
            unrealized_pnl: balance.pnl,
            open_positions,
            closed_trades: trades.len(),
            win_rate,
            avg_win: average(&wins),
            avg_loss: average(&losses),
            profit_factor,
            sharpe_ratio: sharpe(trades),
        }
    }
}

fn average(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().copied().sum::<Decimal>() / Decimal::from(values.len())
}

/// Sharpe over per-trade return fractions. Needs at least two trades for a
/// meaningful deviation.
fn sharpe(trades: &[ClosedTrade]) -> f64 {
    if trades.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = trades
        .iter()
        .map(|t| (t.return_pct / dec!(100)).to_f64().unwrap_or(0.0))
        .collect();

    let mean = returns.clone().mean();
    let std_dev = returns.std_dev();
    if std_dev == 0.0 || !std_dev.is_finite() {
        return 0.0;
    }
    mean / std_dev
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:=^54}", " Session Summary ")?;
        writeln!(
            f,
            "Balance:         ${} (started ${})",
            self.total.round_dp(2),
            self.starting_balance.round_dp(2)
        )?;
        writeln!(f, "Realized P&L:    ${}", self.realized_pnl.round_dp(2))?;
        writeln!(f, "Unrealized P&L:  ${}", self.unrealized_pnl.round_dp(2))?;
        writeln!(f, "Open positions:  {}", self.open_positions)?;
        writeln!(
            f,
            "Closed trades:   {} ({:.0}% winners)",
            self.closed_trades,
            self.win_rate * 100.0
        )?;
        writeln!(
            f,
            "Avg win / loss:  ${} / ${}",
            self.avg_win.round_dp(2),
            self.avg_loss.round_dp(2)
        )?;
        if self.profit_factor.is_finite() {
            writeln!(f, "Profit factor:   {:.2}", self.profit_factor)?;
        }
        write!(f, "Sharpe (trades): {:.2}", self.sharpe_ratio)
    }
}
