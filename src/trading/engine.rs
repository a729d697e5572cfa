//! The simulation engine.
//!
//! One shared state block (ledger, strategies, copy configs, trade history)
//! behind a single `RwLock`: every mutating operation takes the write lock
//! for its whole critical section, so concurrent callers can never observe
//! a half-applied trade. Prices live in a separate [`PriceBoard`] with its
//! own lock; board calls return before engine state is touched again, so
//! the two locks never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{InstrumentKey, PriceBoard};
use crate::error::SimError;
use crate::models::{
    Balance, CopyConfig, CopySizing, CopyTrade, Direction, Outcome, Platform, Position,
    RuleAction, Strategy, StrategyTrade, TradeOrigin, TradeSide, WalletTrade,
};
use crate::parser::{ParseContext, StrategyParser};

use super::config::EngineConfig;
use super::evaluator::{self, RuleFiring};
use super::ledger::{CloseReceipt, Ledger, OpenReceipt};
use super::position_sizer::CopySizer;
use super::stats::SessionStats;

/// What to open, as accepted from the CLI or a mirror source.
#[derive(Debug, Clone)]
pub enum OpenRequest {
    Crypto {
        symbol: String,
        direction: Direction,
        amount: Decimal,
        leverage: Decimal,
    },
    Prediction {
        market_id: String,
        outcome: Outcome,
        amount: Decimal,
    },
}

/// How to pick the position to close.
#[derive(Debug, Clone)]
pub enum CloseTarget {
    Id(String),
    /// Most recently opened position matching symbol and direction
    Crypto { symbol: String, direction: Direction },
}

/// Open position with mark-to-market numbers attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    #[serde(flatten)]
    pub position: Position,
    pub current_price: Decimal,
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
}

/// Snapshot returned by health checks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub simulation_mode: bool,
    pub open_positions: usize,
    pub violations: Vec<String>,
    pub last_checked: DateTime<Utc>,
}

struct EngineState {
    ledger: Ledger,
    strategies: Vec<Strategy>,
    strategy_trades: Vec<StrategyTrade>,
    copy_configs: Vec<CopyConfig>,
    copy_trades: Vec<CopyTrade>,
    /// Last fire time of each recurring rule, keyed by strategy id
    fired_at: HashMap<String, HashMap<usize, DateTime<Utc>>>,
    simulation_mode: bool,
}

/// The paper-trading engine. Cheap to share: clone the `Arc`s inside via
/// `price_board`, or wrap the whole engine in an `Arc` for tasks.
pub struct Engine {
    config: EngineConfig,
    parser: StrategyParser,
    sizer: CopySizer,
    board: Arc<PriceBoard>,
    state: Arc<RwLock<EngineState>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let sizer = CopySizer::new(&config);
        let state = EngineState {
            ledger: Ledger::new(config.starting_balance),
            strategies: Vec::new(),
            strategy_trades: Vec::new(),
            copy_configs: Vec::new(),
            copy_trades: Vec::new(),
            fired_at: HashMap::new(),
            simulation_mode: true,
        };
        Self {
            config,
            parser: StrategyParser::rule_based(),
            sizer,
            board: Arc::new(PriceBoard::new()),
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Shared handle to the price board feeding this engine.
    pub fn price_board(&self) -> Arc<PriceBoard> {
        Arc::clone(&self.board)
    }

    pub fn parser(&self) -> &StrategyParser {
        &self.parser
    }

    // ---- manual trading ----

    /// Open a position. Without a price override the entry comes from the
    /// price board.
    pub async fn open_position(
        &self,
        request: OpenRequest,
        price_override: Option<Decimal>,
        origin: TradeOrigin,
    ) -> Result<OpenReceipt, SimError> {
        if let OpenRequest::Crypto { leverage, .. } = &request {
            if *leverage > self.config.max_leverage {
                return Err(SimError::InvalidValue(format!(
                    "leverage {} exceeds maximum {}",
                    leverage, self.config.max_leverage
                )));
            }
        }

        let entry_price = match price_override {
            Some(price) => price,
            None => self.board.price(&request_key(&request)).await,
        };

        let mut state = self.state.write().await;
        match request {
            OpenRequest::Crypto {
                symbol,
                direction,
                amount,
                leverage,
            } => state
                .ledger
                .open_leveraged(&symbol, direction, amount, leverage, entry_price, origin),
            OpenRequest::Prediction {
                market_id,
                outcome,
                amount,
            } => state
                .ledger
                .open_prediction(&market_id, outcome, amount, entry_price, origin),
        }
    }

    /// Close a position. Without a price override the exit comes from the
    /// price board.
    pub async fn close_position(
        &self,
        target: CloseTarget,
        price_override: Option<Decimal>,
    ) -> Result<CloseReceipt, SimError> {
        let mut state = self.state.write().await;
        let position_id = match &target {
            CloseTarget::Id(id) => id.clone(),
            CloseTarget::Crypto { symbol, direction } => state
                .ledger
                .find_crypto(symbol, *direction)
                .map(|p| p.id.clone())
                .ok_or_else(|| {
                    SimError::NotFound(format!("Open {} position on {}", direction, symbol))
                })?,
        };

        let exit_price = match price_override {
            Some(price) => price,
            None => {
                let position = state
                    .ledger
                    .position(&position_id)
                    .ok_or_else(|| SimError::NotFound(format!("Position {}", position_id)))?;
                self.board.price(&InstrumentKey::for_position(position)).await
            }
        };

        state.ledger.close(&position_id, exit_price)
    }

    /// Open positions, marked at current board prices.
    pub async fn positions(&self, platform: Option<Platform>) -> Vec<PositionView> {
        let state = self.state.read().await;
        let mut views = Vec::new();
        for position in state.ledger.positions() {
            if platform.map_or(false, |wanted| wanted != position.platform()) {
                continue;
            }
            let price = self.board.price(&InstrumentKey::for_position(position)).await;
            views.push(PositionView {
                position: position.clone(),
                current_price: price,
                pnl: position.pnl_at(price),
                pnl_percent: position.pnl_percent_at(price),
            });
        }
        views
    }

    pub async fn balance(&self) -> Balance {
        let state = self.state.read().await;
        let unrealized = self.unrealized(&state).await;
        state.ledger.balance(unrealized)
    }

    // ---- strategies ----

    /// Compile a description and register the resulting strategy, paused.
    pub async fn create_strategy(&self, description: &str, ctx: &ParseContext) -> Strategy {
        let strategy = self.parser.parse(description, ctx);
        info!(
            id = %strategy.id,
            name = %strategy.name,
            platform = %strategy.platform,
            rules = strategy.rules.len(),
            "Strategy created"
        );
        let mut state = self.state.write().await;
        state.strategies.push(strategy.clone());
        strategy
    }

    pub async fn start_strategy(&self, id: &str) -> Result<(), SimError> {
        let mut state = self.state.write().await;
        let strategy = state
            .strategies
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SimError::NotFound(format!("Strategy {}", id)))?;
        strategy.start()?;
        info!(id = %id, name = %strategy.name, "Strategy started");
        Ok(())
    }

    /// Stop a running strategy. A no-op when it is not running.
    pub async fn stop_strategy(&self, id: &str) -> Result<(), SimError> {
        let mut state = self.state.write().await;
        let strategy = state
            .strategies
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SimError::NotFound(format!("Strategy {}", id)))?;
        strategy.stop();
        info!(id = %id, name = %strategy.name, "Strategy stopped");
        Ok(())
    }

    /// Remove a strategy, stopping it implicitly. Returns whether anything
    /// was removed; deleting an unknown id is not an error.
    pub async fn delete_strategy(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.strategies.len();
        state.strategies.retain(|s| s.id != id);
        state.fired_at.remove(id);
        let removed = state.strategies.len() < before;
        if removed {
            info!(id = %id, "Strategy deleted");
        }
        removed
    }

    pub async fn strategies(&self) -> Vec<Strategy> {
        self.state.read().await.strategies.clone()
    }

    pub async fn strategy(&self, id: &str) -> Option<Strategy> {
        self.state
            .read()
            .await
            .strategies
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub async fn strategy_trades(&self, strategy_id: Option<&str>) -> Vec<StrategyTrade> {
        let state = self.state.read().await;
        state
            .strategy_trades
            .iter()
            .filter(|t| strategy_id.map_or(true, |id| t.strategy_id == id))
            .cloned()
            .collect()
    }

    /// One evaluation pass over every running strategy. Returns the trades
    /// executed this tick. Execution errors are logged and skipped so one
    /// starved strategy cannot stall the loop.
    pub async fn evaluate_strategies(&self) -> Vec<StrategyTrade> {
        let now = Utc::now();
        let mut executed = Vec::new();
        let mut state = self.state.write().await;

        let running: Vec<Strategy> = state
            .strategies
            .iter()
            .filter(|s| s.is_active())
            .cloned()
            .collect();

        for strategy in running {
            let Some(key) = strategy_key(&strategy) else {
                debug!(strategy = %strategy.name, "No market bound, skipping");
                continue;
            };
            let price = self.board.price(&key).await;
            let held = state.ledger.positions_for_strategy(&strategy.id);

            let firing = {
                let empty = HashMap::new();
                let gates = state.fired_at.get(&strategy.id).unwrap_or(&empty);
                evaluator::first_firing(&strategy.rules, price, &held, gates, now)
            };
            let Some(firing) = firing else {
                continue;
            };

            match self.execute_firing(&mut state, &strategy, &firing, now) {
                Ok(trades) => {
                    state.strategy_trades.extend(trades.iter().cloned());
                    executed.extend(trades);
                }
                Err(err) => {
                    warn!(strategy = %strategy.name, error = %err, "Rule execution skipped");
                }
            }
        }
        executed
    }

    fn execute_firing(
        &self,
        state: &mut EngineState,
        strategy: &Strategy,
        firing: &RuleFiring,
        now: DateTime<Utc>,
    ) -> Result<Vec<StrategyTrade>, SimError> {
        let rule = &firing.rule;
        let mut trades = Vec::new();

        match rule.action {
            RuleAction::Hold => {}
            RuleAction::Buy => {
                let deployed: Decimal = state
                    .ledger
                    .positions_for_strategy(&strategy.id)
                    .iter()
                    .map(|p| p.stake())
                    .sum();
                let headroom = strategy.capital - deployed;
                let desired = rule.amount.resolve(state.ledger.available());
                let amount = desired.min(headroom);
                if amount <= Decimal::ZERO {
                    debug!(strategy = %strategy.name, "Buy skipped, capital fully deployed");
                } else {
                    let origin = TradeOrigin::Strategy(strategy.id.clone());
                    let receipt = match strategy.platform {
                        Platform::Crypto => {
                            let symbol = strategy
                                .symbol
                                .clone()
                                .unwrap_or_else(|| "BTC/USDT".to_string());
                            state.ledger.open_leveraged(
                                &symbol,
                                Direction::Long,
                                amount,
                                self.config.default_leverage,
                                firing.price,
                                origin,
                            )?
                        }
                        Platform::Polymarket => {
                            // strategy_key already guaranteed a bound market
                            let market_id = strategy.market_id.clone().unwrap_or_default();
                            let outcome =
                                rule.side.unwrap_or_else(|| watched_outcome(strategy));
                            state.ledger.open_prediction(
                                &market_id,
                                outcome,
                                amount,
                                firing.price,
                                origin,
                            )?
                        }
                    };
                    info!(
                        strategy = %strategy.name,
                        amount = %amount,
                        price = %firing.price,
                        "Strategy buy executed"
                    );
                    trades.push(StrategyTrade {
                        id: Uuid::new_v4().to_string(),
                        strategy_id: strategy.id.clone(),
                        action: RuleAction::Buy,
                        order_id: Some(receipt.order_id),
                        amount,
                        price: firing.price,
                        executed_at: now,
                    });
                }
            }
            RuleAction::Sell => {
                let held = state.ledger.positions_for_strategy(&strategy.id);
                for position in held {
                    let stake = position.stake();
                    let receipt = state.ledger.close(&position.id, firing.price)?;
                    info!(
                        strategy = %strategy.name,
                        realized = %receipt.realized_pnl.round_dp(2),
                        price = %firing.price,
                        "Strategy sell executed"
                    );
                    trades.push(StrategyTrade {
                        id: Uuid::new_v4().to_string(),
                        strategy_id: strategy.id.clone(),
                        action: RuleAction::Sell,
                        order_id: Some(receipt.order_id),
                        amount: stake,
                        price: firing.price,
                        executed_at: now,
                    });
                }
            }
        }

        // recurring rules gate on their last fire even when nothing executed
        if matches!(rule.condition, Some(crate::models::Condition::TimeInterval(_))) {
            state
                .fired_at
                .entry(strategy.id.clone())
                .or_default()
                .insert(firing.rule_index, now);
        }
        Ok(trades)
    }

    // ---- copy trading ----

    /// Register a wallet to mirror. Configs start disabled.
    pub async fn add_copy_config(
        &self,
        platform: Platform,
        target_wallet: &str,
        sizing: CopySizing,
    ) -> Result<CopyConfig, SimError> {
        if target_wallet.trim().is_empty() {
            return Err(SimError::MissingField("wallet"));
        }
        sizing.validate()?;

        let config = CopyConfig::new(platform, target_wallet.to_string(), sizing);
        info!(id = %config.id, wallet = %config.target_wallet, "Copy config added, disabled until toggled");
        let mut state = self.state.write().await;
        state.copy_configs.push(config.clone());
        Ok(config)
    }

    /// Flip a config's enabled flag. Returns the new state.
    pub async fn toggle_copy_config(&self, id: &str) -> Result<bool, SimError> {
        let mut state = self.state.write().await;
        let config = state
            .copy_configs
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SimError::NotFound(format!("Copy config {}", id)))?;
        config.enabled = !config.enabled;
        info!(id = %id, enabled = config.enabled, "Copy config toggled");
        Ok(config.enabled)
    }

    /// Remove a config. Deleting an unknown id is not an error.
    pub async fn delete_copy_config(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.copy_configs.len();
        state.copy_configs.retain(|c| c.id != id);
        let removed = state.copy_configs.len() < before;
        if removed {
            info!(id = %id, "Copy config deleted");
        }
        removed
    }

    pub async fn copy_configs(&self, platform: Option<Platform>) -> Vec<CopyConfig> {
        let state = self.state.read().await;
        state
            .copy_configs
            .iter()
            .filter(|c| platform.map_or(true, |wanted| c.platform == wanted))
            .cloned()
            .collect()
    }

    pub async fn copy_trades(&self, config_id: Option<&str>) -> Vec<CopyTrade> {
        let state = self.state.read().await;
        state
            .copy_trades
            .iter()
            .filter(|t| config_id.map_or(true, |id| t.config_id == id))
            .cloned()
            .collect()
    }

    /// Mirror one observed trade from a followed wallet. `Ok(None)` means
    /// skipped: config disabled, dust size, or nothing held to sell.
    pub async fn mirror_trade(
        &self,
        config_id: &str,
        trade: &WalletTrade,
    ) -> Result<Option<CopyTrade>, SimError> {
        let mut state = self.state.write().await;
        let config = state
            .copy_configs
            .iter()
            .find(|c| c.id == config_id)
            .cloned()
            .ok_or_else(|| SimError::NotFound(format!("Copy config {}", config_id)))?;
        if !config.enabled {
            return Ok(None);
        }

        let copy_trade = match trade.side {
            TradeSide::Buy => {
                let total = state.ledger.balance(Decimal::ZERO).total;
                let sized = self.sizer.size(&config.sizing, trade.amount, total);
                if sized <= Decimal::ZERO {
                    debug!(wallet = %trade.wallet, amount = %trade.amount, "Mirror skipped as dust");
                    return Ok(None);
                }
                let receipt = state.ledger.open_prediction(
                    &trade.market_id,
                    trade.outcome,
                    sized,
                    trade.price,
                    TradeOrigin::Copy(config.id.clone()),
                )?;
                info!(
                    wallet = %config.target_wallet,
                    market = %trade.market_id,
                    source = %trade.amount,
                    sized = %sized,
                    "Mirrored buy"
                );
                CopyTrade {
                    id: Uuid::new_v4().to_string(),
                    config_id: config.id.clone(),
                    target_wallet: config.target_wallet.clone(),
                    market_id: trade.market_id.clone(),
                    side: TradeSide::Buy,
                    source_amount: trade.amount,
                    sized_amount: sized,
                    order_id: Some(receipt.order_id),
                    executed_at: Utc::now(),
                }
            }
            TradeSide::Sell => {
                let Some(position_id) =
                    state.ledger.find_copied(&config.id, &trade.market_id, trade.outcome)
                else {
                    debug!(market = %trade.market_id, "Mirror sell skipped, nothing held");
                    return Ok(None);
                };
                let stake = state
                    .ledger
                    .position(&position_id)
                    .map(|p| p.stake())
                    .unwrap_or(Decimal::ZERO);
                let receipt = state.ledger.close(&position_id, trade.price)?;
                info!(
                    wallet = %config.target_wallet,
                    market = %trade.market_id,
                    realized = %receipt.realized_pnl.round_dp(2),
                    "Mirrored sell"
                );
                CopyTrade {
                    id: Uuid::new_v4().to_string(),
                    config_id: config.id.clone(),
                    target_wallet: config.target_wallet.clone(),
                    market_id: trade.market_id.clone(),
                    side: TradeSide::Sell,
                    source_amount: trade.amount,
                    sized_amount: stake,
                    order_id: Some(receipt.order_id),
                    executed_at: Utc::now(),
                }
            }
        };

        state.copy_trades.push(copy_trade.clone());
        Ok(Some(copy_trade))
    }

    // ---- account ----

    /// Wipe the whole session: starting balance restored, positions and
    /// trade history gone, strategies and copy configs cleared. One write
    /// lock covers the whole reset, so no caller sees it half done.
    pub async fn reset_account(&self) -> Balance {
        let mut state = self.state.write().await;
        state.ledger.reset();
        state.strategies.clear();
        state.copy_configs.clear();
        state.strategy_trades.clear();
        state.copy_trades.clear();
        state.fired_at.clear();
        state.ledger.balance(Decimal::ZERO)
    }

    pub async fn set_simulation_mode(&self, enabled: bool) -> bool {
        let mut state = self.state.write().await;
        state.simulation_mode = enabled;
        if !enabled {
            warn!("Simulation mode disabled; orders still never leave the sandbox");
        }
        enabled
    }

    pub async fn simulation_status(&self) -> bool {
        self.state.read().await.simulation_mode
    }

    /// Audit the ledger and report.
    pub async fn check_health(&self) -> HealthReport {
        let state = self.state.read().await;
        let violations = state.ledger.check();
        if !violations.is_empty() {
            warn!(count = violations.len(), "Ledger audit found violations");
        }
        HealthReport {
            healthy: violations.is_empty(),
            simulation_mode: state.simulation_mode,
            open_positions: state.ledger.positions().len(),
            violations,
            last_checked: Utc::now(),
        }
    }

    pub async fn is_healthy(&self) -> bool {
        self.check_health().await.healthy
    }

    pub async fn session_stats(&self) -> SessionStats {
        let state = self.state.read().await;
        let unrealized = self.unrealized(&state).await;
        let balance = state.ledger.balance(unrealized);
        SessionStats::compute(
            self.config.starting_balance,
            &balance,
            state.ledger.positions().len(),
            state.ledger.closed_trades(),
        )
    }

    async fn unrealized(&self, state: &EngineState) -> Decimal {
        let mut total = Decimal::ZERO;
        for position in state.ledger.positions() {
            let price = self.board.price(&InstrumentKey::for_position(position)).await;
            total += position.pnl_at(price);
        }
        total
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn request_key(request: &OpenRequest) -> InstrumentKey {
    match request {
        OpenRequest::Crypto { symbol, .. } => InstrumentKey::Spot(symbol.clone()),
        OpenRequest::Prediction {
            market_id, outcome, ..
        } => InstrumentKey::Outcome {
            market_id: market_id.clone(),
            outcome: *outcome,
        },
    }
}

/// Instrument a strategy evaluates against. Polymarket strategies without a
/// bound market have nothing to watch.
fn strategy_key(strategy: &Strategy) -> Option<InstrumentKey> {
    match strategy.platform {
        Platform::Crypto => Some(InstrumentKey::Spot(
            strategy
                .symbol
                .clone()
                .unwrap_or_else(|| "BTC/USDT".to_string()),
        )),
        Platform::Polymarket => strategy.market_id.as_ref().map(|market_id| {
            InstrumentKey::Outcome {
                market_id: market_id.clone(),
                outcome: watched_outcome(strategy),
            }
        }),
    }
}

/// Outcome side a polymarket strategy trades: the first sided rule decides,
/// yes when no rule says otherwise.
fn watched_outcome(strategy: &Strategy) -> Outcome {
    strategy
        .rules
        .iter()
        .find_map(|r| r.side)
        .unwrap_or(Outcome::Yes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn crypto_open(amount: Decimal, leverage: Decimal) -> OpenRequest {
        OpenRequest::Crypto {
            symbol: "BTC/USDT".to_string(),
            direction: Direction::Long,
            amount,
            leverage,
        }
    }

    fn polymarket_ctx(market_id: &str) -> ParseContext {
        ParseContext {
            platform: Some(Platform::Polymarket),
            market_id: Some(market_id.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_manual_round_trip() {
        let engine = Engine::default();
        let receipt = engine
            .open_position(crypto_open(dec!(1000), dec!(10)), Some(dec!(65000)), TradeOrigin::Manual)
            .await
            .unwrap();
        assert_eq!(receipt.locked, dec!(100));

        let views = engine.positions(None).await;
        assert_eq!(views.len(), 1);

        let close = engine
            .close_position(CloseTarget::Id(receipt.position_id), Some(dec!(66300)))
            .await
            .unwrap();
        assert_eq!(close.realized_pnl, dec!(20));

        let balance = engine.balance().await;
        assert_eq!(balance.total, dec!(10020));
        assert_eq!(balance.available, dec!(10020));
        assert!(engine.is_healthy().await);
    }

    #[tokio::test]
    async fn test_board_price_fills_missing_entry() {
        let engine = Engine::default();
        engine
            .open_position(crypto_open(dec!(100), dec!(1)), None, TradeOrigin::Manual)
            .await
            .unwrap();

        let views = engine.positions(None).await;
        // BTC/USDT seeds at 65000
        assert_eq!(views[0].position.entry_price, dec!(65000));
        assert_eq!(views[0].pnl, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_market_defaults_to_even_odds() {
        let engine = Engine::default();
        let receipt = engine
            .open_position(
                OpenRequest::Prediction {
                    market_id: "0xunknown".to_string(),
                    outcome: Outcome::Yes,
                    amount: dec!(50),
                },
                None,
                TradeOrigin::Manual,
            )
            .await
            .unwrap();
        assert_eq!(receipt.entry_price, dec!(0.50));
        assert_eq!(receipt.shares, Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_leverage_cap() {
        let engine = Engine::default();
        let err = engine
            .open_position(crypto_open(dec!(1000), dec!(200)), Some(dec!(65000)), TradeOrigin::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidValue(_)));
    }

    #[tokio::test]
    async fn test_close_by_symbol_and_direction() {
        let engine = Engine::default();
        engine
            .open_position(crypto_open(dec!(100), dec!(1)), Some(dec!(64000)), TradeOrigin::Manual)
            .await
            .unwrap();
        let newer = engine
            .open_position(crypto_open(dec!(100), dec!(1)), Some(dec!(65000)), TradeOrigin::Manual)
            .await
            .unwrap();

        let close = engine
            .close_position(
                CloseTarget::Crypto {
                    symbol: "BTC/USDT".to_string(),
                    direction: Direction::Long,
                },
                Some(dec!(65000)),
            )
            .await
            .unwrap();
        assert_eq!(close.position_id, newer.position_id);

        let missing = engine
            .close_position(
                CloseTarget::Crypto {
                    symbol: "SOL/USDT".to_string(),
                    direction: Direction::Short,
                },
                Some(dec!(150)),
            )
            .await
            .unwrap_err();
        assert!(matches!(missing, SimError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_flat_round_trip_conserves_balance() {
        let engine = Engine::default();
        engine
            .open_position(crypto_open(dec!(500), dec!(10)), Some(dec!(65000)), TradeOrigin::Manual)
            .await
            .unwrap();
        assert_eq!(engine.balance().await.available, dec!(9950));

        // closing at the entry price hands the margin straight back
        let close = engine
            .close_position(
                CloseTarget::Crypto {
                    symbol: "BTC/USDT".to_string(),
                    direction: Direction::Long,
                },
                Some(dec!(65000)),
            )
            .await
            .unwrap();
        assert_eq!(close.realized_pnl, Decimal::ZERO);
        assert_eq!(engine.balance().await.available, dec!(10000));
    }

    #[tokio::test]
    async fn test_strategy_lifecycle() {
        let engine = Engine::default();
        let strategy = engine
            .create_strategy("Buy YES if odds drop below 40 cents", &polymarket_ctx("0xm"))
            .await;

        engine.start_strategy(&strategy.id).await.unwrap();
        let again = engine.start_strategy(&strategy.id).await.unwrap_err();
        assert!(matches!(again, SimError::AlreadyRunning(_)));

        engine.stop_strategy(&strategy.id).await.unwrap();
        // stop is idempotent
        engine.stop_strategy(&strategy.id).await.unwrap();
        // a stopped strategy can restart
        engine.start_strategy(&strategy.id).await.unwrap();

        assert!(matches!(
            engine.start_strategy("nope").await.unwrap_err(),
            SimError::NotFound(_)
        ));

        assert!(engine.delete_strategy(&strategy.id).await);
        assert!(!engine.delete_strategy(&strategy.id).await);
        assert!(engine.strategies().await.is_empty());
    }

    #[tokio::test]
    async fn test_dip_buy_fires_once_then_takes_profit() {
        let engine = Engine::default();
        let board = engine.price_board();
        let key = InstrumentKey::Outcome {
            market_id: "0xm".to_string(),
            outcome: Outcome::Yes,
        };

        let strategy = engine
            .create_strategy(
                "Buy $100 of YES below 40 cents and sell when up 25%",
                &polymarket_ctx("0xm"),
            )
            .await;
        engine.start_strategy(&strategy.id).await.unwrap();

        // paused strategies traded nothing yet; mark under the threshold
        board.set(key.clone(), dec!(0.35)).await.unwrap();
        let trades = engine.evaluate_strategies().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].action, RuleAction::Buy);
        assert_eq!(trades[0].amount, dec!(100));

        // still under the threshold, but holding: no refill
        assert!(engine.evaluate_strategies().await.is_empty());

        // +28% on the 0.35 entry trips the profit rule
        board.set(key, dec!(0.45)).await.unwrap();
        let exits = engine.evaluate_strategies().await;
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].action, RuleAction::Sell);

        assert!(engine.positions(None).await.is_empty());
        let balance = engine.balance().await;
        assert!(balance.total > dec!(10028) && balance.total < dec!(10029));

        let history = engine.strategy_trades(Some(&strategy.id)).await;
        assert_eq!(history.len(), 2);
        assert!(engine.strategy_trades(Some("other")).await.is_empty());
    }

    #[tokio::test]
    async fn test_paused_strategies_do_not_trade() {
        let engine = Engine::default();
        let board = engine.price_board();
        board
            .set(
                InstrumentKey::Outcome {
                    market_id: "0xm".to_string(),
                    outcome: Outcome::Yes,
                },
                dec!(0.30),
            )
            .await
            .unwrap();

        engine
            .create_strategy("Buy YES below 40 cents", &polymarket_ctx("0xm"))
            .await;
        assert!(engine.evaluate_strategies().await.is_empty());
    }

    #[tokio::test]
    async fn test_unbound_polymarket_strategy_is_skipped() {
        let engine = Engine::default();
        let ctx = ParseContext {
            platform: Some(Platform::Polymarket),
            ..Default::default()
        };
        let strategy = engine.create_strategy("Buy YES below 40 cents", &ctx).await;
        engine.start_strategy(&strategy.id).await.unwrap();
        assert!(engine.evaluate_strategies().await.is_empty());
    }

    #[tokio::test]
    async fn test_dca_gates_between_ticks() {
        let engine = Engine::default();
        let strategy = engine
            .create_strategy("DCA $25 every 4 hours", &polymarket_ctx("0xm"))
            .await;
        engine.start_strategy(&strategy.id).await.unwrap();

        let first = engine.evaluate_strategies().await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].amount, dec!(25));

        // within the interval: gated
        assert!(engine.evaluate_strategies().await.is_empty());
    }

    #[tokio::test]
    async fn test_strategy_capital_caps_buys() {
        let engine = Engine::default();
        let ctx = ParseContext {
            platform: Some(Platform::Polymarket),
            market_id: Some("0xm".to_string()),
            capital: Some(dec!(40)),
            ..Default::default()
        };
        let strategy = engine.create_strategy("DCA $100 every hour", &ctx).await;
        engine.start_strategy(&strategy.id).await.unwrap();

        let trades = engine.evaluate_strategies().await;
        // asked for $100, capped at the strategy's $40 capital
        assert_eq!(trades[0].amount, dec!(40));
    }

    #[tokio::test]
    async fn test_copy_flow() {
        let engine = Engine::default();
        let config = engine
            .add_copy_config(
                Platform::Polymarket,
                "0xwhale",
                CopySizing::Fixed { size: dec!(50) },
            )
            .await
            .unwrap();
        assert!(!config.enabled);
        assert_eq!(engine.copy_configs(Some(Platform::Polymarket)).await.len(), 1);
        assert!(engine.copy_configs(Some(Platform::Crypto)).await.is_empty());

        let buy = WalletTrade {
            id: "t1".to_string(),
            wallet: "0xwhale".to_string(),
            market_id: "0xm".to_string(),
            outcome: Outcome::Yes,
            side: TradeSide::Buy,
            amount: dec!(500),
            price: dec!(0.40),
            timestamp: Utc::now(),
        };

        // disabled configs mirror nothing
        assert!(engine.mirror_trade(&config.id, &buy).await.unwrap().is_none());

        assert!(engine.toggle_copy_config(&config.id).await.unwrap());
        let mirrored = engine.mirror_trade(&config.id, &buy).await.unwrap().unwrap();
        assert_eq!(mirrored.sized_amount, dec!(50));
        assert_eq!(mirrored.side, TradeSide::Buy);

        let views = engine.positions(Some(Platform::Polymarket)).await;
        assert_eq!(views.len(), 1);
        assert!(matches!(views[0].position.origin, TradeOrigin::Copy(_)));

        let sell = WalletTrade {
            id: "t2".to_string(),
            side: TradeSide::Sell,
            price: dec!(0.55),
            ..buy.clone()
        };
        let closed = engine.mirror_trade(&config.id, &sell).await.unwrap().unwrap();
        assert_eq!(closed.side, TradeSide::Sell);
        assert!(engine.positions(None).await.is_empty());

        // selling again with nothing held is a skip, not an error
        assert!(engine.mirror_trade(&config.id, &sell).await.unwrap().is_none());

        assert_eq!(engine.copy_trades(None).await.len(), 2);
        assert_eq!(engine.copy_trades(Some(&config.id)).await.len(), 2);
        assert!(engine.copy_trades(Some("other")).await.is_empty());
        assert!(matches!(
            engine.mirror_trade("nope", &buy).await.unwrap_err(),
            SimError::NotFound(_)
        ));

        assert!(engine.delete_copy_config(&config.id).await);
        assert!(!engine.delete_copy_config(&config.id).await);
    }

    #[tokio::test]
    async fn test_copy_validation() {
        let engine = Engine::default();
        assert!(matches!(
            engine
                .add_copy_config(Platform::Polymarket, "  ", CopySizing::Fixed { size: dec!(50) })
                .await
                .unwrap_err(),
            SimError::MissingField("wallet")
        ));
        assert!(matches!(
            engine
                .add_copy_config(Platform::Polymarket, "0xw", CopySizing::Fixed { size: dec!(0) })
                .await
                .unwrap_err(),
            SimError::InvalidValue(_)
        ));
        assert!(matches!(
            engine.toggle_copy_config("nope").await.unwrap_err(),
            SimError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_reset_wipes_the_session() {
        let engine = Engine::default();
        let strategy = engine
            .create_strategy("Buy YES below 40 cents", &polymarket_ctx("0xm"))
            .await;
        engine
            .add_copy_config(Platform::Polymarket, "0xwhale", CopySizing::Fixed { size: dec!(50) })
            .await
            .unwrap();
        engine
            .open_position(crypto_open(dec!(1000), dec!(10)), Some(dec!(65000)), TradeOrigin::Manual)
            .await
            .unwrap();

        let balance = engine.reset_account().await;
        assert_eq!(balance, Balance::new(dec!(10000)));
        assert!(engine.positions(None).await.is_empty());
        assert!(engine.strategy_trades(None).await.is_empty());
        assert!(engine.strategy(&strategy.id).await.is_none());
        assert!(engine.strategies().await.is_empty());
        assert!(engine.copy_configs(None).await.is_empty());
        assert!(engine.is_healthy().await);
    }

    #[tokio::test]
    async fn test_simulation_mode_toggle() {
        let engine = Engine::default();
        assert!(engine.simulation_status().await);
        assert!(!engine.set_simulation_mode(false).await);
        assert!(!engine.simulation_status().await);

        let report = engine.check_health().await;
        assert!(report.healthy);
        assert!(!report.simulation_mode);
        assert_eq!(report.open_positions, 0);
        assert!(report.violations.is_empty());
    }

    #[tokio::test]
    async fn test_session_stats_roll_up() {
        let engine = Engine::default();
        let receipt = engine
            .open_position(crypto_open(dec!(1000), dec!(10)), Some(dec!(65000)), TradeOrigin::Manual)
            .await
            .unwrap();
        engine
            .close_position(CloseTarget::Id(receipt.position_id), Some(dec!(66300)))
            .await
            .unwrap();

        let stats = engine.session_stats().await;
        assert_eq!(stats.closed_trades, 1);
        assert_eq!(stats.realized_pnl, dec!(20));
        assert_eq!(stats.win_rate, 1.0);
    }
}
