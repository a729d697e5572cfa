//! Copy-trading configuration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SimError;

use super::position::Platform;

/// How to size mirrored trades relative to the source trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CopySizing {
    /// Same dollar figure on every mirrored trade
    Fixed { size: Decimal },
    /// Source trade size scaled by a multiplier
    Proportional { multiplier: Decimal },
    /// Fraction of our current bankroll per trade
    #[serde(rename_all = "camelCase")]
    Percentage { portfolio_pct: Decimal },
}

impl CopySizing {
    /// Reject parameters that could never produce a sensible order.
    pub fn validate(&self) -> Result<(), SimError> {
        match self {
            CopySizing::Fixed { size } if *size <= Decimal::ZERO => Err(SimError::InvalidValue(
                format!("fixed size must be positive, got {}", size),
            )),
            CopySizing::Proportional { multiplier } if *multiplier <= Decimal::ZERO => {
                Err(SimError::InvalidValue(format!(
                    "multiplier must be positive, got {}",
                    multiplier
                )))
            }
            CopySizing::Percentage { portfolio_pct }
                if *portfolio_pct <= Decimal::ZERO || *portfolio_pct > Decimal::ONE =>
            {
                Err(SimError::InvalidValue(format!(
                    "portfolio percentage must be in (0, 1], got {}",
                    portfolio_pct
                )))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for CopySizing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopySizing::Fixed { size } => write!(f, "fixed ${}", size),
            CopySizing::Proportional { multiplier } => write!(f, "{}x source", multiplier),
            CopySizing::Percentage { portfolio_pct } => {
                write!(f, "{}% of portfolio", *portfolio_pct * Decimal::ONE_HUNDRED)
            }
        }
    }
}

/// A registered wallet to mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyConfig {
    pub id: String,

    pub platform: Platform,

    /// Address of the wallet being mirrored
    pub target_wallet: String,

    pub sizing: CopySizing,

    /// New configs start disabled and must be toggled on
    pub enabled: bool,

    pub created_at: DateTime<Utc>,
}

impl CopyConfig {
    pub fn new(platform: Platform, target_wallet: String, sizing: CopySizing) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            platform,
            target_wallet,
            sizing,
            enabled: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_configs_start_disabled() {
        let config = CopyConfig::new(
            Platform::Polymarket,
            "0xwallet".to_string(),
            CopySizing::Fixed { size: dec!(50) },
        );
        assert!(!config.enabled);
    }

    #[test]
    fn test_sizing_validation() {
        assert!(CopySizing::Fixed { size: dec!(50) }.validate().is_ok());
        assert!(CopySizing::Fixed { size: dec!(0) }.validate().is_err());
        assert!(CopySizing::Proportional {
            multiplier: dec!(-1)
        }
        .validate()
        .is_err());
        assert!(CopySizing::Percentage {
            portfolio_pct: dec!(0.05)
        }
        .validate()
        .is_ok());
        assert!(CopySizing::Percentage {
            portfolio_pct: dec!(1.5)
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_sizing_wire_format() {
        let sizing = CopySizing::Percentage {
            portfolio_pct: dec!(0.05),
        };
        let json = serde_json::to_value(&sizing).unwrap();
        assert_eq!(json["mode"], "percentage");
        assert_eq!(json["portfolioPct"], "0.05");
    }
}
