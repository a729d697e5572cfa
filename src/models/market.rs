//! Prediction-market metadata.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::position::Outcome;

/// Market listing as returned by the data API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    /// Market condition id (0x-prefixed)
    pub id: String,

    /// Human-readable question
    pub question: String,

    /// URL-friendly slug
    #[serde(default)]
    pub slug: String,

    /// Current price of the YES outcome (0.0 to 1.0)
    #[serde(default)]
    pub yes_price: Decimal,

    /// 24h trading volume in USDC
    #[serde(default)]
    pub volume_24h: Decimal,

    /// Total liquidity in USDC
    #[serde(default)]
    pub liquidity: Decimal,

    /// Whether the market is still tradeable
    #[serde(default)]
    pub active: bool,

    /// When the market resolves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl Market {
    /// Price of one outcome token. The two sides of a binary market sum to 1.
    pub fn outcome_price(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Yes => self.yes_price,
            Outcome::No => Decimal::ONE - self.yes_price,
        }
    }
}
