//! Trade records: closed positions, strategy executions, mirrored trades.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SimError;

use super::position::{Outcome, Platform, TradeOrigin};
use super::rule::RuleAction;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    pub fn flipped(&self) -> TradeSide {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeSide {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" | "long" => Ok(TradeSide::Buy),
            "sell" | "short" => Ok(TradeSide::Sell),
            other => Err(SimError::InvalidValue(format!(
                "unknown side '{}', expected buy or sell",
                other
            ))),
        }
    }
}

/// Record of a position that was opened and later closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTrade {
    /// Order id assigned at close time
    pub order_id: String,

    /// Id of the position that was closed
    pub position_id: String,

    pub platform: Platform,

    /// Symbol or market id depending on platform
    pub instrument: String,

    /// Notional dollars the position committed
    pub amount: Decimal,

    pub entry_price: Decimal,

    pub exit_price: Decimal,

    pub realized_pnl: Decimal,

    /// Realized P&L as a percentage of the funds at risk
    pub return_pct: Decimal,

    pub origin: TradeOrigin,

    pub opened_at: DateTime<Utc>,

    pub closed_at: DateTime<Utc>,
}

/// Execution performed on behalf of a strategy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyTrade {
    pub id: String,

    pub strategy_id: String,

    pub action: RuleAction,

    /// Order id of the open or close this execution produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    /// Dollars committed (buys) or stake released (sells)
    pub amount: Decimal,

    /// Mark price the decision was made at
    pub price: Decimal,

    pub executed_at: DateTime<Utc>,
}

/// A trade mirrored from a tracked wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyTrade {
    pub id: String,

    pub config_id: String,

    pub target_wallet: String,

    pub market_id: String,

    pub side: TradeSide,

    /// Dollar size of the source trade we mirrored
    pub source_amount: Decimal,

    /// Dollar size we actually placed after sizing rules
    pub sized_amount: Decimal,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    pub executed_at: DateTime<Utc>,
}

/// A trade observed on a tracked wallet, as reported by the data API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTrade {
    /// Unique id (typically tx hash + timestamp)
    pub id: String,

    pub wallet: String,

    pub market_id: String,

    pub outcome: Outcome,

    pub side: TradeSide,

    /// Total USDC value of the trade
    pub amount: Decimal,

    /// Price per outcome token (0.0 to 1.0)
    pub price: Decimal,

    pub timestamp: DateTime<Utc>,
}
