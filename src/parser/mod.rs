//! Natural-language strategy compiler.
//!
//! Turns free text like "Buy YES if odds drop below 40 cents" into a
//! structured [`Strategy`] with an ordered rule list. The compiler is a pure
//! function of its inputs: same description + same context = same rules, no
//! I/O anywhere. It never fails; text with nothing actionable compiles to a
//! single unconditional `hold` rule.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{
    AmountKeyword, Condition, Outcome, Platform, Rule, RuleAction, RuleAmount, Strategy,
};

/// Caller-supplied context. Anything set here overrides text inference.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    pub platform: Option<Platform>,
    pub symbol: Option<String>,
    pub market_id: Option<String>,
    pub capital: Option<Decimal>,
}

/// Compiles descriptions into strategies.
///
/// The keyword-based backend is the only one today; an alternative backend
/// can slot in behind the same `parse` contract via another constructor.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyParser;

impl StrategyParser {
    /// The deterministic keyword-based compiler.
    pub fn rule_based() -> Self {
        Self
    }

    /// Compile a description into a strategy.
    pub fn parse(&self, description: &str, ctx: &ParseContext) -> Strategy {
        let text = description.to_lowercase();
        let words = tokenize(&text);

        let platform = ctx.platform.unwrap_or_else(|| infer_platform(&words));
        let side = infer_side(&words, platform);

        let amounts = dollar_amounts(&words);
        let interval = interval_trigger(&words);

        // The DCA rule takes the dollar figure nearest its trigger word;
        // every other rule shares the first remaining figure.
        let dca_amount_idx = interval.and_then(|(anchor, _)| {
            amounts
                .iter()
                .min_by_key(|(i, _)| (i.abs_diff(anchor), *i))
                .map(|(i, _)| *i)
        });
        let shared_amount = amounts
            .iter()
            .find(|(i, _)| Some(*i) != dca_amount_idx)
            .map(|(_, v)| RuleAmount::Fixed(*v))
            .or_else(|| amount_keyword(&words))
            .unwrap_or(RuleAmount::Fixed(dec!(100)));
        let dca_amount = dca_amount_idx
            .and_then(|idx| amounts.iter().find(|(i, _)| *i == idx))
            .map(|(_, v)| RuleAmount::Fixed(*v))
            .unwrap_or(shared_amount);

        let (below, above) = price_conditions(&words, platform);
        let (profit, loss) = percent_conditions(&words);

        let mut rules = Vec::new();
        if let Some(price) = below {
            rules.push(Rule {
                action: RuleAction::Buy,
                side,
                amount: shared_amount,
                condition: Some(Condition::PriceBelow(price)),
            });
        }
        if let Some(price) = above {
            rules.push(Rule {
                action: RuleAction::Sell,
                side,
                amount: shared_amount,
                condition: Some(Condition::PriceAbove(price)),
            });
        }
        if let Some(pct) = profit {
            rules.push(Rule {
                action: RuleAction::Sell,
                side,
                amount: shared_amount,
                condition: Some(Condition::ProfitPercent(pct)),
            });
        }
        if let Some(pct) = loss {
            rules.push(Rule {
                action: RuleAction::Sell,
                side,
                amount: shared_amount,
                condition: Some(Condition::LossPercent(pct)),
            });
        }
        if let Some((_, ms)) = interval {
            rules.push(Rule {
                action: RuleAction::Buy,
                side,
                amount: dca_amount,
                condition: Some(Condition::TimeInterval(ms)),
            });
        }
        if rules.is_empty() {
            rules.push(Rule::hold());
        }

        let symbol = match platform {
            Platform::Crypto => Some(
                ctx.symbol
                    .clone()
                    .unwrap_or_else(|| infer_symbol(&words)),
            ),
            Platform::Polymarket => None,
        };
        let market_id = match platform {
            Platform::Polymarket => ctx.market_id.clone(),
            Platform::Crypto => None,
        };
        let capital = ctx.capital.unwrap_or(dec!(1000));
        let name = strategy_name(platform, &rules);

        Strategy::new(name, platform, symbol, market_id, capital, rules)
    }
}

/// Canned descriptions the compiler is known to handle, for UI hinting.
pub fn examples(platform: Platform) -> Vec<&'static str> {
    match platform {
        Platform::Polymarket => vec![
            "Buy YES if odds drop below 40 cents",
            "Buy $50 of NO if the price drops below 60 cents",
            "Sell everything if I'm up 25%",
            "DCA $25 into YES every 6 hours",
            "Buy YES below 30 cents and sell above 60 cents",
        ],
        Platform::Crypto => vec![
            "Buy $100 of BTC if it drops below 60000",
            "Long ETH below 3000 and take profit at 20%",
            "Buy $50 of SOL below 140 with a stop at 10%",
            "DCA $50 into bitcoin every day",
            "Buy ethereum under 3200 and sell half when up 15%",
        ],
    }
}

/// Lowercased words with surrounding punctuation stripped. `$`, `%`, `.`,
/// and `/` survive inside tokens so prices, pairs, and amounts stay intact.
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| {
            raw.trim_matches(|c: char| {
                !(c.is_alphanumeric() || c == '$' || c == '%' || c == '.' || c == '/')
            })
            .trim_end_matches('.')
            .to_string()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_number(token: &str) -> Option<Decimal> {
    let stripped = token
        .trim_start_matches('$')
        .trim_end_matches('%')
        .replace(',', "");
    if stripped.is_empty() {
        return None;
    }
    stripped.parse::<Decimal>().ok()
}

fn infer_platform(words: &[String]) -> Platform {
    let crypto = words.iter().any(|w| {
        matches!(
            w.as_str(),
            "btc" | "bitcoin"
                | "eth"
                | "ethereum"
                | "sol"
                | "solana"
                | "crypto"
                | "leverage"
                | "long"
                | "short"
        ) || is_leverage_marker(w)
    });
    if crypto {
        Platform::Crypto
    } else {
        Platform::Polymarket
    }
}

/// "5x", "10x" style leverage shorthand.
fn is_leverage_marker(word: &str) -> bool {
    word.len() >= 2
        && word.ends_with('x')
        && word[..word.len() - 1].chars().all(|c| c.is_ascii_digit())
}

fn infer_symbol(words: &[String]) -> String {
    for word in words {
        match word.as_str() {
            "btc" | "bitcoin" => return "BTC/USDT".to_string(),
            "eth" | "ethereum" => return "ETH/USDT".to_string(),
            "sol" | "solana" => return "SOL/USDT".to_string(),
            _ => {}
        }
    }
    "BTC/USDT".to_string()
}

/// Outcome side for polymarket rules. Yes wins when both appear; a bare
/// long/short on a prediction market is corrected to yes/no. Crypto rules
/// never carry a side.
fn infer_side(words: &[String], platform: Platform) -> Option<Outcome> {
    if platform == Platform::Crypto {
        return None;
    }
    if words.iter().any(|w| w == "yes") {
        return Some(Outcome::Yes);
    }
    if words.iter().any(|w| w == "no") {
        return Some(Outcome::No);
    }
    if words.iter().any(|w| w == "long") {
        return Some(Outcome::Yes);
    }
    if words.iter().any(|w| w == "short") {
        return Some(Outcome::No);
    }
    None
}

/// Dollar figures (`$N` tokens) with their word index.
fn dollar_amounts(words: &[String]) -> Vec<(usize, Decimal)> {
    let mut found = Vec::new();
    for (i, word) in words.iter().enumerate() {
        if let Some(body) = word.strip_prefix('$') {
            if let Some(value) = parse_number(body) {
                found.push((i, value));
            }
        }
    }
    found
}

fn amount_keyword(words: &[String]) -> Option<RuleAmount> {
    if words.iter().any(|w| w == "all" || w == "everything") {
        return Some(RuleAmount::Keyword(AmountKeyword::All));
    }
    if words.iter().any(|w| w == "half") {
        return Some(RuleAmount::Keyword(AmountKeyword::Half));
    }
    None
}

enum PriceUnit {
    Cents,
    Dollars,
    Bare,
}

/// First `(below, above)` price thresholds in the text.
fn price_conditions(words: &[String], platform: Platform) -> (Option<Decimal>, Option<Decimal>) {
    let mut below = None;
    let mut above = None;
    for (i, word) in words.iter().enumerate() {
        let is_below = matches!(word.as_str(), "below" | "under");
        let is_above = matches!(word.as_str(), "above" | "over" | "exceeds" | "hits");
        if !is_below && !is_above {
            continue;
        }
        if let Some((value, unit)) = number_after(words, i + 1) {
            let price = normalize_price(value, unit, platform);
            if is_below && below.is_none() {
                below = Some(price);
            } else if is_above && above.is_none() {
                above = Some(price);
            }
        }
    }
    (below, above)
}

/// Scan forward a couple of tokens for a price figure and its unit.
/// A `%` figure after a trigger word is a percent phrase, not a price.
fn number_after(words: &[String], start: usize) -> Option<(Decimal, PriceUnit)> {
    let end = (start + 3).min(words.len());
    for i in start..end {
        let word = &words[i];
        if word.ends_with('%') {
            return None;
        }
        if let Some(value) = parse_number(word) {
            let unit = if word.starts_with('$') {
                PriceUnit::Dollars
            } else {
                match words.get(i + 1).map(|s| s.as_str()) {
                    Some("cents") | Some("cent") => PriceUnit::Cents,
                    Some("dollars") | Some("dollar") => PriceUnit::Dollars,
                    _ => PriceUnit::Bare,
                }
            };
            return Some((value, unit));
        }
    }
    None
}

/// Cents normalize to fractions. Bare figures above 1 on a prediction
/// market read as cents too, since odds live in [0, 1].
fn normalize_price(value: Decimal, unit: PriceUnit, platform: Platform) -> Decimal {
    match unit {
        PriceUnit::Cents => value / dec!(100),
        PriceUnit::Dollars => value,
        PriceUnit::Bare => {
            if platform == Platform::Polymarket && value > Decimal::ONE {
                value / dec!(100)
            } else {
                value
            }
        }
    }
}

/// First `(profit, loss)` percentage thresholds in the text, as fractions.
fn percent_conditions(words: &[String]) -> (Option<Decimal>, Option<Decimal>) {
    let mut profit = None;
    let mut loss = None;
    for i in 0..words.len() {
        let Some(value) = percent_at(words, i) else {
            continue;
        };

        let window_start = i.saturating_sub(3);
        let before = &words[window_start..i];
        let mut after = words.get(i + 1).map(|s| s.as_str());
        if after == Some("percent") {
            after = words.get(i + 2).map(|s| s.as_str());
        }

        let is_profit = before.iter().any(|w| {
            matches!(w.as_str(), "up" | "profit" | "gain" | "gains" | "rises" | "rise")
        }) || matches!(after, Some("profit") | Some("gain"));
        let is_loss = before.iter().any(|w| {
            matches!(
                w.as_str(),
                "down" | "loss" | "lose" | "drops" | "drop" | "falls" | "fall" | "stop"
            )
        }) || after == Some("loss");

        if is_profit && profit.is_none() {
            profit = Some(value / dec!(100));
        } else if is_loss && loss.is_none() {
            loss = Some(value / dec!(100));
        }
    }
    (profit, loss)
}

/// Percent figure at index `i`: either "25%" or "25 percent".
fn percent_at(words: &[String], i: usize) -> Option<Decimal> {
    let word = &words[i];
    if let Some(body) = word.strip_suffix('%') {
        let body = body.strip_prefix('-').unwrap_or(body);
        return body.parse::<Decimal>().ok();
    }
    if words.get(i + 1).map(|s| s.as_str()) == Some("percent") {
        let body = word.strip_prefix('-').unwrap_or(word.as_str());
        return body.parse::<Decimal>().ok();
    }
    None
}

/// Recurring trigger: "every N <unit>", "every <unit>", "hourly", "daily".
/// Returns the anchor word index (for amount proximity) and the period in
/// milliseconds. The unit defaults to hours when omitted after a count.
fn interval_trigger(words: &[String]) -> Option<(usize, i64)> {
    if let Some(every) = words.iter().position(|w| w == "every") {
        let count = words.get(every + 1).and_then(|w| parse_number(w));
        let unit_idx = if count.is_some() { every + 2 } else { every + 1 };
        let unit = words.get(unit_idx).and_then(|w| unit_millis(w));

        let ms = match (count, unit) {
            (Some(n), Some(unit_ms)) => (n * Decimal::from(unit_ms)).to_i64()?,
            (None, Some(unit_ms)) => unit_ms,
            (Some(n), None) => (n * Decimal::from(3_600_000_i64)).to_i64()?,
            // "every dip" and friends are not time triggers
            (None, None) => return None,
        };
        if ms <= 0 {
            return None;
        }
        return Some((every, ms));
    }
    if let Some(i) = words.iter().position(|w| w == "hourly") {
        return Some((i, 3_600_000));
    }
    if let Some(i) = words.iter().position(|w| w == "daily") {
        return Some((i, 86_400_000));
    }
    None
}

fn unit_millis(word: &str) -> Option<i64> {
    match word {
        "minute" | "minutes" | "min" | "mins" => Some(60_000),
        "hour" | "hours" | "hr" | "hrs" => Some(3_600_000),
        "day" | "days" => Some(86_400_000),
        _ => None,
    }
}

/// Deterministic display name: platform prefix plus the dominant rule kind.
fn strategy_name(platform: Platform, rules: &[Rule]) -> String {
    let prefix = match platform {
        Platform::Polymarket => "Poly",
        Platform::Crypto => "Crypto",
    };
    let has_dca = rules
        .iter()
        .any(|r| matches!(r.condition, Some(Condition::TimeInterval(_))));
    let has_dip = rules
        .iter()
        .any(|r| matches!(r.condition, Some(Condition::PriceBelow(_))));
    let has_profit = rules
        .iter()
        .any(|r| matches!(r.condition, Some(Condition::ProfitPercent(_))));

    if has_dca {
        format!("{} DCA Strategy", prefix)
    } else if has_dip {
        format!("{} Dip Buyer", prefix)
    } else if has_profit {
        format!("{} Profit Taker", prefix)
    } else {
        format!("{} Strategy", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(description: &str, ctx: &ParseContext) -> Strategy {
        StrategyParser::rule_based().parse(description, ctx)
    }

    fn polymarket_ctx() -> ParseContext {
        ParseContext {
            platform: Some(Platform::Polymarket),
            ..Default::default()
        }
    }

    #[test]
    fn test_canonical_dip_buy() {
        let strategy = parse("Buy YES if odds drop below 40 cents", &polymarket_ctx());

        assert_eq!(strategy.platform, Platform::Polymarket);
        assert_eq!(strategy.rules.len(), 1);

        let rule = &strategy.rules[0];
        assert_eq!(rule.action, RuleAction::Buy);
        assert_eq!(rule.side, Some(Outcome::Yes));
        assert_eq!(rule.condition, Some(Condition::PriceBelow(dec!(0.40))));
        assert!(strategy.name.contains("Dip"));
        assert!(strategy.name.starts_with("Poly"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let ctx = polymarket_ctx();
        let a = parse("Buy YES if odds drop below 40 cents", &ctx);
        let b = parse("Buy YES if odds drop below 40 cents", &ctx);
        assert_eq!(a.rules, b.rules);
        assert_eq!(a.name, b.name);
        assert_eq!(a.capital, b.capital);
    }

    #[test]
    fn test_dca_unit_conversion() {
        let four_hours = parse("DCA $50 every 4 hours", &polymarket_ctx());
        assert_eq!(
            four_hours.rules[0].condition,
            Some(Condition::TimeInterval(14_400_000))
        );
        assert_eq!(four_hours.rules[0].amount, RuleAmount::Fixed(dec!(50)));
        assert!(four_hours.name.contains("DCA"));

        let half_hour = parse("DCA $50 every 30 minutes", &polymarket_ctx());
        assert_eq!(
            half_hour.rules[0].condition,
            Some(Condition::TimeInterval(1_800_000))
        );

        let bare_hour = parse("buy $10 every hour", &polymarket_ctx());
        assert_eq!(
            bare_hour.rules[0].condition,
            Some(Condition::TimeInterval(3_600_000))
        );

        let daily = parse("DCA $25 into bitcoin daily", &ParseContext::default());
        assert_eq!(daily.platform, Platform::Crypto);
        assert_eq!(
            daily.rules[0].condition,
            Some(Condition::TimeInterval(86_400_000))
        );
    }

    #[test]
    fn test_unit_defaults_to_hours() {
        let strategy = parse("DCA $50 every 4", &polymarket_ctx());
        assert_eq!(
            strategy.rules[0].condition,
            Some(Condition::TimeInterval(14_400_000))
        );
    }

    #[test]
    fn test_symbol_inference() {
        let ctx = ParseContext {
            platform: Some(Platform::Crypto),
            ..Default::default()
        };

        let btc = parse("buy bitcoin when it drops below 60000", &ctx);
        assert_eq!(btc.symbol.as_deref(), Some("BTC/USDT"));
        assert_eq!(
            btc.rules[0].condition,
            Some(Condition::PriceBelow(dec!(60000)))
        );

        let eth = parse("long ethereum", &ctx);
        assert_eq!(eth.symbol.as_deref(), Some("ETH/USDT"));

        let unknown = parse("buy the top coin", &ctx);
        assert_eq!(unknown.symbol.as_deref(), Some("BTC/USDT"));
    }

    #[test]
    fn test_platform_inference() {
        assert_eq!(
            parse("short ETH with 5x leverage", &ParseContext::default()).platform,
            Platform::Crypto
        );
        assert_eq!(
            parse("buy yes on this market", &ParseContext::default()).platform,
            Platform::Polymarket
        );
        // ambiguous text defaults to polymarket
        assert_eq!(
            parse("buy when cheap", &ParseContext::default()).platform,
            Platform::Polymarket
        );
    }

    #[test]
    fn test_cents_normalization() {
        let explicit = parse("buy below 40 cents", &polymarket_ctx());
        assert_eq!(
            explicit.rules[0].condition,
            Some(Condition::PriceBelow(dec!(0.40)))
        );

        // bare numbers above 1 on a prediction market read as cents
        let bare = parse("buy below 40", &polymarket_ctx());
        assert_eq!(
            bare.rules[0].condition,
            Some(Condition::PriceBelow(dec!(0.40)))
        );

        let fraction = parse("buy below 0.35", &polymarket_ctx());
        assert_eq!(
            fraction.rules[0].condition,
            Some(Condition::PriceBelow(dec!(0.35)))
        );
    }

    #[test]
    fn test_multiple_rules_in_priority_order() {
        let strategy = parse(
            "Buy YES below 30 cents and sell above 60 cents",
            &polymarket_ctx(),
        );
        assert_eq!(strategy.rules.len(), 2);
        assert_eq!(strategy.rules[0].action, RuleAction::Buy);
        assert_eq!(
            strategy.rules[0].condition,
            Some(Condition::PriceBelow(dec!(0.30)))
        );
        assert_eq!(strategy.rules[1].action, RuleAction::Sell);
        assert_eq!(
            strategy.rules[1].condition,
            Some(Condition::PriceAbove(dec!(0.60)))
        );
    }

    #[test]
    fn test_profit_and_loss_percent() {
        let strategy = parse(
            "sell when up 25% or if it drops 10%",
            &polymarket_ctx(),
        );
        assert_eq!(strategy.rules.len(), 2);
        assert_eq!(
            strategy.rules[0].condition,
            Some(Condition::ProfitPercent(dec!(0.25)))
        );
        assert_eq!(
            strategy.rules[1].condition,
            Some(Condition::LossPercent(dec!(0.10)))
        );

        let stop = parse("short SOL with a stop loss at 10%", &ParseContext::default());
        assert_eq!(
            stop.rules[0].condition,
            Some(Condition::LossPercent(dec!(0.10)))
        );
    }

    #[test]
    fn test_amount_keywords() {
        let all = parse("Sell everything if I'm up 25%", &polymarket_ctx());
        assert_eq!(all.rules[0].amount, RuleAmount::Keyword(AmountKeyword::All));

        let half = parse("sell half when up 15%", &polymarket_ctx());
        assert_eq!(
            half.rules[0].amount,
            RuleAmount::Keyword(AmountKeyword::Half)
        );
    }

    #[test]
    fn test_dca_owns_its_amount() {
        let strategy = parse(
            "buy $100 below 30 cents and DCA $25 every 6 hours",
            &polymarket_ctx(),
        );
        assert_eq!(strategy.rules.len(), 2);
        assert_eq!(strategy.rules[0].amount, RuleAmount::Fixed(dec!(100)));
        assert_eq!(strategy.rules[1].amount, RuleAmount::Fixed(dec!(25)));
    }

    #[test]
    fn test_default_amount_when_none_given() {
        let strategy = parse("buy below 40 cents", &polymarket_ctx());
        assert_eq!(strategy.rules[0].amount, RuleAmount::Fixed(dec!(100)));
    }

    #[test]
    fn test_yes_wins_over_no() {
        let strategy = parse("buy yes not no below 40 cents", &polymarket_ctx());
        assert_eq!(strategy.rules[0].side, Some(Outcome::Yes));
    }

    #[test]
    fn test_long_short_corrected_on_polymarket() {
        let long = parse("go long below 40 cents", &polymarket_ctx());
        assert_eq!(long.rules[0].side, Some(Outcome::Yes));

        let short = parse("short this below 40 cents", &polymarket_ctx());
        assert_eq!(short.rules[0].side, Some(Outcome::No));

        // crypto rules never carry a side
        let crypto = parse(
            "go long below 60000",
            &ParseContext {
                platform: Some(Platform::Crypto),
                ..Default::default()
            },
        );
        assert_eq!(crypto.rules[0].side, None);
    }

    #[test]
    fn test_fallback_hold_rule() {
        let strategy = parse("do something smart", &polymarket_ctx());
        assert_eq!(strategy.rules.len(), 1);
        assert_eq!(strategy.rules[0].action, RuleAction::Hold);
        assert_eq!(strategy.rules[0].condition, None);
        assert_eq!(strategy.name, "Poly Strategy");
    }

    #[test]
    fn test_context_overrides_inference() {
        let ctx = ParseContext {
            platform: Some(Platform::Crypto),
            symbol: Some("ETH/USDT".to_string()),
            market_id: None,
            capital: Some(dec!(5000)),
        };
        let strategy = parse("buy bitcoin below 60000", &ctx);
        assert_eq!(strategy.symbol.as_deref(), Some("ETH/USDT"));
        assert_eq!(strategy.capital, dec!(5000));
    }

    #[test]
    fn test_default_capital() {
        let strategy = parse("buy below 40 cents", &polymarket_ctx());
        assert_eq!(strategy.capital, dec!(1000));
    }

    #[test]
    fn test_examples_all_compile_to_actionable_rules() {
        for platform in [Platform::Polymarket, Platform::Crypto] {
            let list = examples(platform);
            assert_eq!(list.len(), 5);
            for description in list {
                let ctx = ParseContext {
                    platform: Some(platform),
                    ..Default::default()
                };
                let strategy = parse(description, &ctx);
                assert_ne!(
                    strategy.rules[0].action,
                    RuleAction::Hold,
                    "example should compile to a real rule: {}",
                    description
                );
            }
        }
    }
}
