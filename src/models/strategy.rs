//! Strategy model and lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SimError;

use super::position::Platform;
use super::rule::Rule;

/// Lifecycle state of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    /// Created but never started
    Paused,
    /// Eligible for rule evaluation
    Running,
    /// Explicitly stopped; can be restarted
    Stopped,
}

impl std::fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyStatus::Paused => f.write_str("paused"),
            StrategyStatus::Running => f.write_str("running"),
            StrategyStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// A compiled trading strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub id: String,

    pub name: String,

    pub platform: Platform,

    /// Trading pair for crypto strategies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// Market condition id for polymarket strategies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_id: Option<String>,

    /// Bankroll the strategy may deploy across its positions
    pub capital: Decimal,

    /// Evaluated in order; the first rule whose condition holds wins
    pub rules: Vec<Rule>,

    pub status: StrategyStatus,

    pub created_at: DateTime<Utc>,
}

impl Strategy {
    pub fn new(
        name: String,
        platform: Platform,
        symbol: Option<String>,
        market_id: Option<String>,
        capital: Decimal,
        rules: Vec<Rule>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            platform,
            symbol,
            market_id,
            capital,
            rules,
            status: StrategyStatus::Paused,
            created_at: Utc::now(),
        }
    }

    /// Only running strategies are evaluated by the simulation loop.
    pub fn is_active(&self) -> bool {
        self.status == StrategyStatus::Running
    }

    /// Move to running. Starting an already-running strategy is an error;
    /// restarting a stopped one is allowed.
    pub fn start(&mut self) -> Result<(), SimError> {
        if self.status == StrategyStatus::Running {
            return Err(SimError::AlreadyRunning(self.id.clone()));
        }
        self.status = StrategyStatus::Running;
        Ok(())
    }

    /// Move to stopped. Stopping a strategy that is not running is a no-op.
    pub fn stop(&mut self) {
        if self.status == StrategyStatus::Running {
            self.status = StrategyStatus::Stopped;
        }
    }

    /// Instrument label shown in listings.
    pub fn instrument(&self) -> &str {
        match self.platform {
            Platform::Crypto => self.symbol.as_deref().unwrap_or("BTC/USDT"),
            Platform::Polymarket => self.market_id.as_deref().unwrap_or("-"),
        }
    }
}
