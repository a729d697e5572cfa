//! In-memory price board: the simulation's single source of marks.
//!
//! Every open, close, and rule evaluation prices against this board. It is
//! seeded with deterministic defaults so the engine behaves identically with
//! or without network access; the run loop overwrites marks with live data
//! when it has any.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::SimError;
use crate::models::{Outcome, Position, PositionKind};

/// Key identifying a priced instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstrumentKey {
    /// Spot/futures pair, e.g. "BTC/USDT"
    Spot(String),
    /// One outcome token of a prediction market
    Outcome { market_id: String, outcome: Outcome },
}

impl InstrumentKey {
    /// The instrument a position marks against.
    pub fn for_position(position: &Position) -> Self {
        match &position.kind {
            PositionKind::Crypto { symbol, .. } => InstrumentKey::Spot(symbol.clone()),
            PositionKind::Polymarket {
                market_id, outcome, ..
            } => InstrumentKey::Outcome {
                market_id: market_id.clone(),
                outcome: *outcome,
            },
        }
    }
}

impl std::fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentKey::Spot(symbol) => f.write_str(symbol),
            InstrumentKey::Outcome { market_id, outcome } => {
                write!(f, "{}:{}", market_id, outcome)
            }
        }
    }
}

impl std::str::FromStr for InstrumentKey {
    type Err = SimError;

    /// Parses "BTC/USDT" or "<marketId>:<yes|no>".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((market_id, outcome)) = s.rsplit_once(':') {
            return Ok(InstrumentKey::Outcome {
                market_id: market_id.to_string(),
                outcome: outcome.parse()?,
            });
        }
        if s.contains('/') {
            return Ok(InstrumentKey::Spot(s.to_uppercase()));
        }
        Err(SimError::InvalidValue(format!(
            "instrument '{}' must look like BTC/USDT or <marketId>:<yes|no>",
            s
        )))
    }
}

/// Mutable price store seeded with deterministic defaults.
pub struct PriceBoard {
    prices: RwLock<HashMap<InstrumentKey, Decimal>>,
}

impl PriceBoard {
    pub fn new() -> Self {
        let mut prices = HashMap::new();
        prices.insert(InstrumentKey::Spot("BTC/USDT".to_string()), dec!(65000));
        prices.insert(InstrumentKey::Spot("ETH/USDT".to_string()), dec!(3200));
        prices.insert(InstrumentKey::Spot("SOL/USDT".to_string()), dec!(150));
        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Current mark for an instrument, falling back to a deterministic
    /// default for anything never set.
    pub async fn price(&self, key: &InstrumentKey) -> Decimal {
        let prices = self.prices.read().await;
        prices.get(key).copied().unwrap_or_else(|| default_for(key))
    }

    /// Set a mark. Prices must be positive; outcome prices must not exceed 1.
    pub async fn set(&self, key: InstrumentKey, price: Decimal) -> Result<(), SimError> {
        if price <= Decimal::ZERO {
            return Err(SimError::InvalidValue(format!(
                "price must be positive, got {}",
                price
            )));
        }
        if matches!(key, InstrumentKey::Outcome { .. }) && price > Decimal::ONE {
            return Err(SimError::InvalidValue(format!(
                "outcome price must be at most 1, got {}",
                price
            )));
        }
        debug!(instrument = %key, price = %price, "Mark updated");
        let mut prices = self.prices.write().await;
        prices.insert(key, price);
        Ok(())
    }

    /// Every mark currently on the board, sorted for stable display.
    pub async fn snapshot(&self) -> Vec<(InstrumentKey, Decimal)> {
        let prices = self.prices.read().await;
        let mut entries: Vec<_> = prices.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by_key(|(k, _)| k.to_string());
        entries
    }
}

impl Default for PriceBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Default mark for an instrument the board has never seen.
fn default_for(key: &InstrumentKey) -> Decimal {
    match key {
        InstrumentKey::Spot(_) => dec!(100),
        InstrumentKey::Outcome { .. } => dec!(0.50),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_defaults() {
        tokio_test::block_on(async {
            let board = PriceBoard::new();
            let btc = board.price(&InstrumentKey::Spot("BTC/USDT".to_string())).await;
            assert_eq!(btc, dec!(65000));

            // unseen outcome falls back to even odds
            let key = InstrumentKey::Outcome {
                market_id: "0xnew".to_string(),
                outcome: Outcome::Yes,
            };
            assert_eq!(board.price(&key).await, dec!(0.50));
        });
    }

    #[test]
    fn test_set_and_read_back() {
        tokio_test::block_on(async {
            let board = PriceBoard::new();
            let key = InstrumentKey::Spot("BTC/USDT".to_string());
            board.set(key.clone(), dec!(70000)).await.unwrap();
            assert_eq!(board.price(&key).await, dec!(70000));
        });
    }

    #[test]
    fn test_set_rejects_bad_prices() {
        tokio_test::block_on(async {
            let board = PriceBoard::new();
            let spot = InstrumentKey::Spot("BTC/USDT".to_string());
            assert!(board.set(spot, dec!(0)).await.is_err());

            let outcome = InstrumentKey::Outcome {
                market_id: "0xm".to_string(),
                outcome: Outcome::No,
            };
            assert!(board.set(outcome, dec!(1.2)).await.is_err());
        });
    }

    #[test]
    fn test_instrument_parsing() {
        let spot: InstrumentKey = "btc/usdt".parse().unwrap();
        assert_eq!(spot, InstrumentKey::Spot("BTC/USDT".to_string()));

        let outcome: InstrumentKey = "0xabc:yes".parse().unwrap();
        assert_eq!(
            outcome,
            InstrumentKey::Outcome {
                market_id: "0xabc".to_string(),
                outcome: Outcome::Yes,
            }
        );

        assert!("justaword".parse::<InstrumentKey>().is_err());
    }
}
