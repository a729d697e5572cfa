//! Wire types for the prediction-market data API.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Market payload from the /markets endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketResponse {
    pub condition_id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub slug: String,
    /// Price of the YES outcome
    #[serde(default)]
    pub yes_price: Decimal,
    #[serde(default)]
    pub volume_24hr: Decimal,
    #[serde(default)]
    pub liquidity: Decimal,
    #[serde(default)]
    pub active: bool,
    /// RFC 3339 resolution date, when the API provides one
    #[serde(default)]
    pub end_date_iso: Option<String>,
}

/// Trade payload from the /trades endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
    pub proxy_wallet: String,
    pub side: String,
    pub condition_id: String,
    /// Number of outcome tokens traded
    pub size: Decimal,
    /// Price per token (0.0 to 1.0)
    pub price: Decimal,
    /// Unix seconds
    pub timestamp: i64,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub transaction_hash: String,
}
