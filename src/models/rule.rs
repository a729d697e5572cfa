//! Strategy rules: conditions, actions, and stake amounts.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::position::Outcome;

/// What a rule does when its condition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Buy,
    Sell,
    Hold,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Buy => "buy",
            RuleAction::Sell => "sell",
            RuleAction::Hold => "hold",
        }
    }
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trigger for a rule.
///
/// Serialized adjacently tagged, e.g. `{"type": "price_below", "value": 0.4}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Condition {
    /// Mark price strictly below the threshold
    PriceBelow(Decimal),
    /// Mark price strictly above the threshold
    PriceAbove(Decimal),
    /// Unrealized gain at or past the threshold, as a fraction (0.25 = 25%)
    ProfitPercent(Decimal),
    /// Unrealized loss at or past the threshold, as a fraction (0.10 = -10%)
    LossPercent(Decimal),
    /// Recurring trigger with a period in milliseconds
    TimeInterval(i64),
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::PriceBelow(v) => write!(f, "price < {}", v),
            Condition::PriceAbove(v) => write!(f, "price > {}", v),
            Condition::ProfitPercent(v) => write!(f, "profit >= {}%", *v * dec!(100)),
            Condition::LossPercent(v) => write!(f, "loss >= {}%", *v * dec!(100)),
            Condition::TimeInterval(ms) => {
                if ms % 86_400_000 == 0 {
                    write!(f, "every {}d", ms / 86_400_000)
                } else if ms % 3_600_000 == 0 {
                    write!(f, "every {}h", ms / 3_600_000)
                } else if ms % 60_000 == 0 {
                    write!(f, "every {}m", ms / 60_000)
                } else {
                    write!(f, "every {}ms", ms)
                }
            }
        }
    }
}

/// Balance keyword usable in place of a dollar figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountKeyword {
    All,
    Half,
}

/// Stake for a rule: a concrete dollar figure or a balance keyword.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleAmount {
    Fixed(Decimal),
    Keyword(AmountKeyword),
}

impl RuleAmount {
    /// Resolve to a concrete dollar figure against the available balance.
    pub fn resolve(&self, available: Decimal) -> Decimal {
        match self {
            RuleAmount::Fixed(v) => *v,
            RuleAmount::Keyword(AmountKeyword::All) => available,
            RuleAmount::Keyword(AmountKeyword::Half) => available / dec!(2),
        }
    }
}

impl std::fmt::Display for RuleAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAmount::Fixed(v) => write!(f, "${}", v),
            RuleAmount::Keyword(AmountKeyword::All) => f.write_str("all"),
            RuleAmount::Keyword(AmountKeyword::Half) => f.write_str("half"),
        }
    }
}

/// One entry in a strategy's ordered rule list.
///
/// Rules are evaluated in declaration order and the first one whose
/// condition holds wins the tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,

    /// Outcome side for prediction-market rules; always None on crypto
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Outcome>,

    pub amount: RuleAmount,

    /// None means the rule applies unconditionally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Rule {
    /// The do-nothing fallback rule for descriptions with no actionable text.
    pub fn hold() -> Self {
        Self {
            action: RuleAction::Hold,
            side: None,
            amount: RuleAmount::Fixed(Decimal::ZERO),
            condition: None,
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.action)?;
        if let Some(side) = self.side {
            write!(f, " {}", side)?;
        }
        if self.action != RuleAction::Hold {
            write!(f, " {}", self.amount)?;
        }
        if let Some(condition) = &self.condition {
            match condition {
                Condition::TimeInterval(_) => write!(f, " {}", condition)?,
                _ => write!(f, " when {}", condition)?,
            }
        }
        Ok(())
    }
}
