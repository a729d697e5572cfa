//! Prediction-market data client (read-only operations).

use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::models::{Market, Outcome, TradeSide, WalletTrade};

use super::types::*;

const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the prediction-market data API.
///
/// Only used for market metadata and observed wallet trades; order
/// execution never leaves the simulator.
pub struct MarketsClient {
    client: Client,
    base_url: String,
}

impl MarketsClient {
    /// Create a new client with default settings.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DATA_API_BASE.to_string())
    }

    /// Create with custom base URL (for testing or a proxy).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Fetch active markets, most liquid first.
    pub async fn get_markets(&self, limit: Option<u32>) -> Result<Vec<Market>> {
        let mut url = format!("{}/markets?active=true&order=liquidity", self.base_url);
        if let Some(l) = limit {
            url = format!("{}&limit={}", url, l.min(100));
        }

        debug!(url = %url, "Fetching markets");

        let items: Vec<MarketResponse> = self.get_json(&url, "Markets").await?;
        Ok(items.into_iter().map(market_from).collect())
    }

    /// Search markets by free-text query.
    pub async fn search_markets(&self, query: &str) -> Result<Vec<Market>> {
        let url = format!("{}/markets?q={}", self.base_url, query);

        debug!(url = %url, "Searching markets");

        let items: Vec<MarketResponse> = self.get_json(&url, "Search").await?;
        Ok(items.into_iter().map(market_from).collect())
    }

    /// Fetch a single market by condition id.
    pub async fn get_market(&self, market_id: &str) -> Result<Market> {
        let url = format!("{}/markets/{}", self.base_url, market_id);

        debug!(url = %url, "Fetching market");

        let item: MarketResponse = self.get_json(&url, "Market").await?;
        Ok(market_from(item))
    }

    /// Fetch recent trades for a wallet, newest first.
    ///
    /// Trades the API reports with a side or outcome we do not understand
    /// are skipped with a warning rather than failing the whole fetch.
    pub async fn get_user_trades(
        &self,
        wallet: &str,
        limit: Option<u32>,
    ) -> Result<Vec<WalletTrade>> {
        let mut url = format!("{}/trades?user={}&takerOnly=true", self.base_url, wallet);
        if let Some(l) = limit {
            url = format!("{}&limit={}", url, l.min(500));
        }

        debug!(url = %url, "Fetching wallet trades");

        let items: Vec<TradeResponse> = self.get_json(&url, "Trades").await?;
        Ok(items.into_iter().filter_map(wallet_trade_from).collect())
    }

    /// GET a JSON payload, retrying transient failures with backoff.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(20)),
            ..ExponentialBackoff::default()
        };

        let payload = backoff::future::retry(policy, || async {
            let response = self.client.get(url).send().await.map_err(|e| {
                warn!(url = %url, error = %e, "Request failed, will retry");
                backoff::Error::transient(anyhow::Error::new(e))
            })?;

            let status = response.status();
            if status.is_server_error() {
                return Err(backoff::Error::transient(anyhow::anyhow!(
                    "{} request failed: {}",
                    what,
                    status
                )));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(anyhow::anyhow!(
                    "{} request failed: {} - {}",
                    what,
                    status,
                    body
                )));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| backoff::Error::permanent(anyhow::Error::new(e)))
        })
        .await?;

        Ok(payload)
    }
}

fn market_from(raw: MarketResponse) -> Market {
    let end_date = raw
        .end_date_iso
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Market {
        id: raw.condition_id,
        question: raw.question,
        slug: raw.slug,
        yes_price: raw.yes_price,
        volume_24h: raw.volume_24hr,
        liquidity: raw.liquidity,
        active: raw.active,
        end_date,
    }
}

fn wallet_trade_from(raw: TradeResponse) -> Option<WalletTrade> {
    let side = match raw.side.to_uppercase().as_str() {
        "BUY" => TradeSide::Buy,
        "SELL" => TradeSide::Sell,
        other => {
            warn!(side = %other, "Skipping trade with unknown side");
            return None;
        }
    };

    let outcome = match raw.outcome.to_lowercase().as_str() {
        "yes" => Outcome::Yes,
        "no" => Outcome::No,
        other => {
            warn!(outcome = %other, "Skipping trade with unknown outcome");
            return None;
        }
    };

    let timestamp = Utc.timestamp_opt(raw.timestamp, 0).single()?;

    Some(WalletTrade {
        id: format!("{}_{}", raw.transaction_hash, raw.timestamp),
        wallet: raw.proxy_wallet,
        market_id: raw.condition_id,
        outcome,
        side,
        amount: raw.size * raw.price,
        price: raw.price,
        timestamp,
    })
}
