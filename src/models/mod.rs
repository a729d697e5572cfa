//! Data models for balances, positions, rules, strategies, and trades.

mod balance;
mod copy_config;
mod market;
mod position;
mod rule;
mod strategy;
mod trade;

pub use balance::Balance;
pub use copy_config::{CopyConfig, CopySizing};
pub use market::Market;
pub use position::{Direction, Outcome, Platform, Position, PositionKind, TradeOrigin};
pub use rule::{AmountKeyword, Condition, Rule, RuleAction, RuleAmount};
pub use strategy::{Strategy, StrategyStatus};
pub use trade::{ClosedTrade, CopyTrade, StrategyTrade, TradeSide, WalletTrade};
