//! Open position models for both simulated venues.
//!
//! A position is one tagged type regardless of venue. The venue-specific
//! fields live in [`PositionKind`], so accounting code matches on the kind
//! instead of sniffing which optional fields happen to be set.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SimError;

use super::trade::TradeSide;

/// Venue a position, strategy, or copy config belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Crypto,
    Polymarket,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Crypto => "crypto",
            Platform::Polymarket => "polymarket",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crypto" => Ok(Platform::Crypto),
            "polymarket" | "poly" => Ok(Platform::Polymarket),
            other => Err(SimError::InvalidValue(format!(
                "unknown platform '{}', expected crypto or polymarket",
                other
            ))),
        }
    }
}

/// Binary outcome token on a prediction market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "yes",
            Outcome::No => "no",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" | "y" => Ok(Outcome::Yes),
            "no" | "n" => Ok(Outcome::No),
            other => Err(SimError::InvalidValue(format!(
                "unknown outcome '{}', expected yes or no",
                other
            ))),
        }
    }
}

/// Direction vocabulary used when closing crypto positions by symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The trade side this direction corresponds to.
    pub fn side(&self) -> TradeSide {
        match self {
            Direction::Long => TradeSide::Buy,
            Direction::Short => TradeSide::Sell,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => f.write_str("long"),
            Direction::Short => f.write_str("short"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long" | "buy" => Ok(Direction::Long),
            "short" | "sell" => Ok(Direction::Short),
            other => Err(SimError::InvalidValue(format!(
                "unknown direction '{}', expected long or short",
                other
            ))),
        }
    }
}

/// Who opened a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "id", rename_all = "lowercase")]
pub enum TradeOrigin {
    /// Opened directly by the user
    Manual,
    /// Opened by a strategy rule firing
    Strategy(String),
    /// Mirrored from a tracked wallet
    Copy(String),
}

/// Venue-specific fields of an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PositionKind {
    /// Leveraged long or short on a trading pair
    #[serde(rename_all = "camelCase")]
    Crypto {
        /// Pair like "BTC/USDT"
        symbol: String,
        side: TradeSide,
        leverage: Decimal,
        /// Funds locked: amount / leverage
        margin: Decimal,
    },
    /// Outcome tokens on a binary prediction market
    #[serde(rename_all = "camelCase")]
    Polymarket {
        market_id: String,
        outcome: Outcome,
        /// Tokens held: amount / entry price
        shares: Decimal,
    },
}

/// A simulated open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,

    /// Notional dollars committed. For leveraged positions this is
    /// margin * leverage, not the locked margin.
    pub amount: Decimal,

    pub entry_price: Decimal,

    #[serde(flatten)]
    pub kind: PositionKind,

    pub origin: TradeOrigin,

    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Build a leveraged crypto position. Inputs are validated by the ledger.
    pub fn leveraged(
        symbol: String,
        side: TradeSide,
        amount: Decimal,
        leverage: Decimal,
        entry_price: Decimal,
        origin: TradeOrigin,
    ) -> Self {
        let margin = amount / leverage;
        Self {
            id: Uuid::new_v4().to_string(),
            amount,
            entry_price,
            kind: PositionKind::Crypto {
                symbol,
                side,
                leverage,
                margin,
            },
            origin,
            opened_at: Utc::now(),
        }
    }

    /// Build a prediction-market position. Inputs are validated by the ledger.
    pub fn prediction(
        market_id: String,
        outcome: Outcome,
        amount: Decimal,
        entry_price: Decimal,
        origin: TradeOrigin,
    ) -> Self {
        let shares = amount / entry_price;
        Self {
            id: Uuid::new_v4().to_string(),
            amount,
            entry_price,
            kind: PositionKind::Polymarket {
                market_id,
                outcome,
                shares,
            },
            origin,
            opened_at: Utc::now(),
        }
    }

    pub fn platform(&self) -> Platform {
        match self.kind {
            PositionKind::Crypto { .. } => Platform::Crypto,
            PositionKind::Polymarket { .. } => Platform::Polymarket,
        }
    }

    /// Symbol or market id, for display and trade records.
    pub fn instrument_label(&self) -> &str {
        match &self.kind {
            PositionKind::Crypto { symbol, .. } => symbol,
            PositionKind::Polymarket { market_id, .. } => market_id,
        }
    }

    /// Funds the ledger locked behind this position: margin for leveraged
    /// positions, the full stake for predictions.
    pub fn stake(&self) -> Decimal {
        match &self.kind {
            PositionKind::Crypto { margin, .. } => *margin,
            PositionKind::Polymarket { .. } => self.amount,
        }
    }

    /// Unrealized P&L at a given mark price.
    pub fn pnl_at(&self, current_price: Decimal) -> Decimal {
        match &self.kind {
            PositionKind::Crypto { side, .. } => {
                if self.entry_price.is_zero() {
                    return Decimal::ZERO;
                }
                let price_move = (current_price - self.entry_price) / self.entry_price;
                match side {
                    TradeSide::Buy => self.amount * price_move,
                    TradeSide::Sell => -(self.amount * price_move),
                }
            }
            PositionKind::Polymarket { shares, .. } => *shares * (current_price - self.entry_price),
        }
    }

    /// Unrealized P&L as a percentage of the funds at risk.
    pub fn pnl_percent_at(&self, current_price: Decimal) -> Decimal {
        let stake = self.stake();
        if stake.is_zero() {
            return Decimal::ZERO;
        }
        self.pnl_at(current_price) / stake * dec!(100)
    }
}
