//! Rule evaluation for running strategies.
//!
//! Pure decision logic: given a rule list, the current mark, the positions
//! the strategy holds, and when each recurring rule last fired, pick the
//! first rule that should act now. Execution lives in the engine.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{Condition, Position, Rule, RuleAction};

/// A rule that fired, with the mark it saw.
#[derive(Debug, Clone)]
pub struct RuleFiring {
    pub rule_index: usize,
    pub rule: Rule,
    pub price: Decimal,
}

/// First rule in order whose condition holds and whose action is currently
/// actionable. Earlier rules shadow later ones.
pub fn first_firing(
    rules: &[Rule],
    price: Decimal,
    positions: &[Position],
    last_fired: &HashMap<usize, DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<RuleFiring> {
    for (index, rule) in rules.iter().enumerate() {
        if !condition_met(rule.condition.as_ref(), price, positions, last_fired.get(&index), now) {
            continue;
        }
        if !action_applies(rule, positions) {
            continue;
        }
        return Some(RuleFiring {
            rule_index: index,
            rule: rule.clone(),
            price,
        });
    }
    None
}

fn condition_met(
    condition: Option<&Condition>,
    price: Decimal,
    positions: &[Position],
    fired_at: Option<&DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let Some(condition) = condition else {
        // unconditional rules always match
        return true;
    };
    match condition {
        Condition::PriceBelow(threshold) => price < *threshold,
        Condition::PriceAbove(threshold) => price > *threshold,
        Condition::ProfitPercent(fraction) => {
            let target = fraction * dec!(100);
            positions.iter().any(|p| p.pnl_percent_at(price) >= target)
        }
        Condition::LossPercent(fraction) => {
            let target = -(fraction * dec!(100));
            positions.iter().any(|p| p.pnl_percent_at(price) <= target)
        }
        Condition::TimeInterval(interval_ms) => match fired_at {
            Some(last) => now.signed_duration_since(*last) >= Duration::milliseconds(*interval_ms),
            None => true,
        },
    }
}

/// Recurring buys repeat on schedule; a price-triggered buy waits until the
/// strategy is flat so a standing dip rule does not refill every tick.
/// Sells need something to sell.
fn action_applies(rule: &Rule, positions: &[Position]) -> bool {
    match rule.action {
        RuleAction::Buy => {
            matches!(rule.condition, Some(Condition::TimeInterval(_))) || positions.is_empty()
        }
        RuleAction::Sell => !positions.is_empty(),
        RuleAction::Hold => true,
    }
}
