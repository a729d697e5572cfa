//! Long-running simulation loop.
//!
//! Each tick: refresh market prices onto the board, evaluate running
//! strategies, then poll followed wallets and mirror what they did since
//! the last poll. Every phase logs failures and keeps going; the loop only
//! exits on Ctrl-C.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::{InstrumentKey, MarketsClient};
use crate::models::{Outcome, Platform, PositionKind, WalletTrade};
use crate::trading::Engine;

/// How many recent trades to pull per wallet poll.
const WALLET_TRADE_PAGE: u32 = 25;

pub struct Runner {
    engine: Arc<Engine>,
    markets: MarketsClient,
    poll_interval: Duration,
    /// Newest wallet-trade id already seen, per copy config
    last_seen: HashMap<String, String>,
}

impl Runner {
    pub fn new(engine: Arc<Engine>, markets: MarketsClient, poll_interval: Duration) -> Self {
        Self {
            engine,
            markets,
            poll_interval,
            last_seen: HashMap::new(),
        }
    }

    /// Tick until Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.poll_interval.as_secs(), "Simulation loop started, Ctrl-C to stop");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// One pass of the three phases.
    pub async fn tick(&mut self) {
        self.refresh_prices().await;

        let trades = self.engine.evaluate_strategies().await;
        if !trades.is_empty() {
            info!(count = trades.len(), "Strategy rules fired");
        }

        self.poll_wallets().await;
    }

    /// Pull fresh odds for every market a running strategy or an open
    /// position cares about. Fetches run concurrently per market.
    async fn refresh_prices(&self) {
        let mut market_ids = BTreeSet::new();
        for strategy in self.engine.strategies().await {
            if strategy.is_active() {
                if let Some(market_id) = &strategy.market_id {
                    market_ids.insert(market_id.clone());
                }
            }
        }
        for view in self.engine.positions(Some(Platform::Polymarket)).await {
            if let PositionKind::Polymarket { market_id, .. } = &view.position.kind {
                market_ids.insert(market_id.clone());
            }
        }

        let market_ids: Vec<String> = market_ids.into_iter().collect();
        let fetches = market_ids.iter().map(|id| self.markets.get_market(id));
        let results = join_all(fetches).await;

        let board = self.engine.price_board();
        for (market_id, result) in market_ids.iter().zip(results) {
            let market = match result {
                Ok(market) => market,
                Err(err) => {
                    warn!(market = %market_id, error = %err, "Market refresh failed");
                    continue;
                }
            };
            for outcome in [Outcome::Yes, Outcome::No] {
                let key = InstrumentKey::Outcome {
                    market_id: market_id.clone(),
                    outcome,
                };
                if let Err(err) = board.set(key, market.outcome_price(outcome)).await {
                    warn!(market = %market_id, error = %err, "Price update rejected");
                }
            }
        }
    }

    /// Mirror what each followed wallet traded since the previous poll.
    /// The first poll of a wallet only records a baseline so old history
    /// is never replayed.
    async fn poll_wallets(&mut self) {
        let configs: Vec<_> = self
            .engine
            .copy_configs(None)
            .await
            .into_iter()
            .filter(|c| c.enabled)
            .collect();

        for config in configs {
            let trades = match self
                .markets
                .get_user_trades(&config.target_wallet, Some(WALLET_TRADE_PAGE))
                .await
            {
                Ok(trades) => trades,
                Err(err) => {
                    warn!(wallet = %config.target_wallet, error = %err, "Wallet poll failed");
                    continue;
                }
            };
            let Some(newest) = trades.first().map(|t| t.id.clone()) else {
                continue;
            };

            match self.last_seen.get(&config.id) {
                None => {
                    debug!(wallet = %config.target_wallet, "Wallet baseline recorded");
                }
                Some(seen) => {
                    for trade in fresh_trades(&trades, seen) {
                        match self.engine.mirror_trade(&config.id, trade).await {
                            Ok(Some(copy_trade)) => {
                                info!(
                                    wallet = %config.target_wallet,
                                    side = %copy_trade.side,
                                    sized = %copy_trade.sized_amount,
                                    "Trade mirrored"
                                );
                            }
                            Ok(None) => {}
                            Err(err) => {
                                warn!(wallet = %config.target_wallet, error = %err, "Mirror failed");
                            }
                        }
                    }
                }
            }
            self.last_seen.insert(config.id.clone(), newest);
        }
    }
}

/// Trades newer than `seen`, oldest first so buys land before their sells.
/// `trades` arrives newest first from the API.
fn fresh_trades<'a>(trades: &'a [WalletTrade], seen: &str) -> Vec<&'a WalletTrade> {
    let mut fresh: Vec<&WalletTrade> = trades.iter().take_while(|t| t.id != seen).collect();
    fresh.reverse();
    fresh
}
