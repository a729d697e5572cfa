//! Paper-trading simulator for crypto pairs and Polymarket outcomes.
//!
//! Strategies are written in plain English and compiled to rules; the
//! engine executes everything against a simulated ledger. State lives for
//! the life of the process, so `run` is the long-lived mode and the other
//! subcommands are one-shot operations against a fresh session.

mod api;
mod error;
mod models;
mod parser;
mod runner;
mod trading;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::api::{InstrumentKey, MarketsClient};
use crate::error::SimError;
use crate::models::{CopySizing, Direction, Outcome, Platform, Strategy, TradeOrigin};
use crate::parser::{self, ParseContext};
use crate::runner::Runner;
use crate::trading::{CloseTarget, Engine, EngineConfig, OpenRequest};

/// Paper-trading simulator CLI.
#[derive(Parser)]
#[command(name = "papertrader")]
#[command(about = "Paper-trade crypto and Polymarket with plain-English strategies", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the Polymarket data API
    #[arg(long, env = "DATA_API_URL")]
    data_api: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a simulated position
    Open {
        /// Venue: crypto or polymarket
        #[arg(short, long, default_value = "crypto")]
        platform: String,

        /// Trading pair for crypto, e.g. BTC/USDT
        #[arg(short, long)]
        symbol: Option<String>,

        /// Market id for polymarket
        #[arg(short, long)]
        market: Option<String>,

        /// Outcome side for polymarket (yes or no)
        #[arg(short, long)]
        outcome: Option<String>,

        /// long or short
        #[arg(short, long, default_value = "long")]
        direction: String,

        /// Notional dollars to commit
        #[arg(short, long)]
        amount: f64,

        /// Leverage for crypto positions
        #[arg(long, default_value = "1")]
        leverage: f64,

        /// Entry price override; board price when omitted
        #[arg(long)]
        price: Option<f64>,
    },

    /// Close an open position
    Close {
        /// Position id to close
        #[arg(short, long)]
        position: Option<String>,

        /// Or: trading pair plus direction of the position
        #[arg(short, long)]
        symbol: Option<String>,

        #[arg(short, long)]
        direction: Option<String>,

        /// Exit price override; board price when omitted
        #[arg(long)]
        price: Option<f64>,
    },

    /// List open positions with mark-to-market P&L
    Positions {
        /// Filter by venue: crypto or polymarket
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Show the account balance
    Balance,

    /// Compile a strategy description without saving it
    Parse {
        /// Plain-English strategy, e.g. "Buy YES if odds drop below 40 cents"
        description: String,

        #[arg(short, long)]
        platform: Option<String>,

        #[arg(short, long)]
        symbol: Option<String>,

        #[arg(short, long)]
        market: Option<String>,

        /// Capital the strategy may deploy
        #[arg(short, long)]
        capital: Option<f64>,
    },

    /// Show strategy descriptions the compiler understands
    Examples {
        #[arg(short, long, default_value = "polymarket")]
        platform: String,
    },

    /// Compile and register a strategy (created paused)
    Create {
        description: String,

        #[arg(short, long)]
        platform: Option<String>,

        #[arg(short, long)]
        symbol: Option<String>,

        #[arg(short, long)]
        market: Option<String>,

        #[arg(short, long)]
        capital: Option<f64>,

        /// Start the strategy immediately
        #[arg(long)]
        start: bool,
    },

    /// Start a strategy
    Start { id: String },

    /// Stop a running strategy
    Stop { id: String },

    /// Delete a strategy, stopping it first
    Delete { id: String },

    /// List strategies
    Strategies,

    /// List executions performed by strategies
    StrategyTrades {
        /// Filter by strategy id
        #[arg(short, long)]
        strategy: Option<String>,
    },

    /// Follow a wallet for copy trading (added disabled)
    AddCopy {
        /// Wallet address to mirror
        wallet: String,

        #[arg(short, long, default_value = "polymarket")]
        platform: String,

        /// Same dollar size on every mirror
        #[arg(long)]
        fixed: Option<f64>,

        /// Scale the source trade by this multiplier
        #[arg(long)]
        proportional: Option<f64>,

        /// Size as a fraction of the portfolio (0 to 1)
        #[arg(long)]
        percentage: Option<f64>,
    },

    /// Enable or disable a copy config
    ToggleCopy { id: String },

    /// Remove a copy config
    DeleteCopy { id: String },

    /// List copy configs
    Copies {
        /// Filter by venue: crypto or polymarket
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// List mirrored trades
    CopyTrades {
        /// Filter by copy config id
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Set a board price, e.g. "BTC/USDT 64250" or "0xmarket:yes 0.42"
    SetPrice {
        /// "BTC/USDT" or "<market_id>:<outcome>"
        instrument: String,
        price: f64,
    },

    /// Turn simulation mode on or off
    Mode {
        /// on or off
        state: String,
    },

    /// Wipe the session: balance restored, positions, strategies, and copy
    /// configs cleared
    Reset,

    /// Session summary: balance, P&L, win rate
    Status,

    /// Audit the ledger's accounting identity
    Health,

    /// List active Polymarket markets by liquidity
    Markets {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Search Polymarket markets
    Search { query: String },

    /// Run the live simulation loop
    Run {
        /// Polling interval in seconds
        #[arg(short, long, default_value = "30")]
        interval: u64,

        /// Strategy description to compile and start (repeatable)
        #[arg(long = "strategy")]
        strategies: Vec<String>,

        /// Market id the preloaded strategies are bound to
        #[arg(short, long)]
        market: Option<String>,

        /// Wallet to mirror at 10% of its size (repeatable)
        #[arg(long = "copy")]
        copy_wallets: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let json = cli.json;
    if let Err(err) = execute(cli).await {
        if json {
            let kind = err
                .downcast_ref::<SimError>()
                .map(SimError::kind)
                .unwrap_or("error");
            println!(
                "{}",
                serde_json::json!({ "error": kind, "message": err.to_string() })
            );
            std::process::exit(1);
        }
        return Err(err);
    }
    Ok(())
}

async fn execute(cli: Cli) -> Result<()> {
    let json = cli.json;
    let data_api = cli.data_api;
    let engine = Engine::new(EngineConfig::default());

    match cli.command {
        Commands::Open {
            platform,
            symbol,
            market,
            outcome,
            direction,
            amount,
            leverage,
            price,
        } => {
            let platform: Platform = platform.parse()?;
            let amount = Decimal::try_from(amount)?;
            let request = match platform {
                Platform::Crypto => OpenRequest::Crypto {
                    symbol: symbol.unwrap_or_else(|| "BTC/USDT".to_string()),
                    direction: direction.parse()?,
                    amount,
                    leverage: Decimal::try_from(leverage)?,
                },
                Platform::Polymarket => OpenRequest::Prediction {
                    market_id: market.unwrap_or_default(),
                    outcome: required_outcome(outcome.as_deref())?,
                    amount,
                },
            };
            let price_override = price.map(Decimal::try_from).transpose()?;

            let receipt = engine
                .open_position(request, price_override, TradeOrigin::Manual)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            } else {
                println!("Opened position {}", receipt.position_id);
                println!("  Entry:  {}", receipt.entry_price);
                println!("  Locked: ${}", receipt.locked.round_dp(2));
                if let Some(shares) = receipt.shares {
                    println!("  Shares: {}", shares.round_dp(4));
                }
            }
        }

        Commands::Close {
            position,
            symbol,
            direction,
            price,
        } => {
            let target = match position {
                Some(id) => CloseTarget::Id(id),
                None => {
                    let symbol = symbol.ok_or(SimError::MissingField("position or symbol"))?;
                    let direction: Direction =
                        direction.as_deref().unwrap_or("long").parse()?;
                    CloseTarget::Crypto { symbol, direction }
                }
            };
            let price_override = price.map(Decimal::try_from).transpose()?;

            let receipt = engine.close_position(target, price_override).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            } else {
                println!(
                    "Closed {} @ {} | P&L ${} ({}%)",
                    receipt.position_id,
                    receipt.exit_price,
                    receipt.realized_pnl.round_dp(2),
                    receipt.return_pct.round_dp(1)
                );
            }
        }

        Commands::Positions { platform } => {
            let filter = platform.map(|p| p.parse::<Platform>()).transpose()?;
            let views = engine.positions(filter).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else if views.is_empty() {
                println!("No open positions.");
            } else {
                println!(
                    "\n{:<36} {:<10} {:<22} {:>10} {:>10} {:>9}",
                    "ID", "PLATFORM", "INSTRUMENT", "ENTRY", "MARK", "P&L%"
                );
                println!("{}", "-".repeat(102));
                for view in views {
                    println!(
                        "{:<36} {:<10} {:<22} {:>10} {:>10} {:>8}%",
                        view.position.id,
                        view.position.platform(),
                        truncate(view.position.instrument_label(), 20),
                        view.position.entry_price.round_dp(4),
                        view.current_price.round_dp(4),
                        view.pnl_percent.round_dp(1)
                    );
                }
            }
        }

        Commands::Balance => {
            let balance = engine.balance().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&balance)?);
            } else {
                println!("Total:        ${}", balance.total.round_dp(2));
                println!("Available:    ${}", balance.available.round_dp(2));
                println!("In positions: ${}", balance.in_positions.round_dp(2));
                println!("Unrealized:   ${}", balance.pnl.round_dp(2));
                println!("Equity:       ${}", balance.equity().round_dp(2));
            }
        }

        Commands::Parse {
            description,
            platform,
            symbol,
            market,
            capital,
        } => {
            let ctx = parse_ctx(platform, symbol, market, capital)?;
            let strategy = engine.parser().parse(&description, &ctx);
            if json {
                println!("{}", serde_json::to_string_pretty(&strategy)?);
            } else {
                print_strategy(&strategy);
            }
        }

        Commands::Examples { platform } => {
            let platform: Platform = platform.parse()?;
            let list = parser::examples(platform);
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                println!("Try one of these with `papertrader create`:");
                for example in list {
                    println!("  - {}", example);
                }
            }
        }

        Commands::Create {
            description,
            platform,
            symbol,
            market,
            capital,
            start,
        } => {
            let ctx = parse_ctx(platform, symbol, market, capital)?;
            let strategy = engine.create_strategy(&description, &ctx).await;
            if start {
                engine.start_strategy(&strategy.id).await?;
            }
            if json {
                // re-read so the status reflects an immediate start
                let current = engine.strategy(&strategy.id).await.unwrap_or(strategy);
                println!("{}", serde_json::to_string_pretty(&current)?);
            } else {
                print_strategy(&strategy);
                if start {
                    println!("\nStrategy started.");
                } else {
                    println!("\nStart it with: papertrader start {}", strategy.id);
                }
            }
        }

        Commands::Start { id } => {
            engine.start_strategy(&id).await?;
            println!("Strategy {} is running", id);
        }

        Commands::Stop { id } => {
            engine.stop_strategy(&id).await?;
            println!("Strategy {} stopped", id);
        }

        Commands::Delete { id } => {
            if engine.delete_strategy(&id).await {
                println!("Strategy {} deleted", id);
            } else {
                println!("No strategy {} to delete", id);
            }
        }

        Commands::Strategies => {
            let strategies = engine.strategies().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&strategies)?);
            } else if strategies.is_empty() {
                println!("No strategies. Create one with `papertrader create \"...\"`.");
            } else {
                println!(
                    "\n{:<36} {:<24} {:<10} {:<22} {:>8} {:>7}",
                    "ID", "NAME", "PLATFORM", "INSTRUMENT", "CAPITAL", "STATUS"
                );
                println!("{}", "-".repeat(112));
                for strategy in strategies {
                    println!(
                        "{:<36} {:<24} {:<10} {:<22} {:>8} {:>7}",
                        strategy.id,
                        truncate(&strategy.name, 22),
                        strategy.platform,
                        truncate(strategy.instrument(), 20),
                        strategy.capital,
                        strategy.status
                    );
                }
            }
        }

        Commands::StrategyTrades { strategy } => {
            let trades = engine.strategy_trades(strategy.as_deref()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&trades)?);
            } else if trades.is_empty() {
                println!("No strategy trades yet.");
            } else {
                for trade in trades {
                    println!(
                        "{} {} ${} @ {} (strategy {})",
                        trade.executed_at.format("%Y-%m-%d %H:%M:%S"),
                        trade.action,
                        trade.amount.round_dp(2),
                        trade.price,
                        truncate(&trade.strategy_id, 8)
                    );
                }
            }
        }

        Commands::AddCopy {
            wallet,
            platform,
            fixed,
            proportional,
            percentage,
        } => {
            let sizing = match (fixed, proportional, percentage) {
                (Some(size), None, None) => CopySizing::Fixed {
                    size: Decimal::try_from(size)?,
                },
                (None, Some(multiplier), None) => CopySizing::Proportional {
                    multiplier: Decimal::try_from(multiplier)?,
                },
                (None, None, Some(pct)) => CopySizing::Percentage {
                    portfolio_pct: Decimal::try_from(pct)?,
                },
                _ => {
                    return Err(SimError::InvalidValue(
                        "specify exactly one of --fixed, --proportional, --percentage".to_string(),
                    )
                    .into())
                }
            };
            let config = engine
                .add_copy_config(platform.parse()?, &wallet, sizing)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Following {} with {}", truncate(&wallet, 12), config.sizing);
                println!("Enable it with: papertrader toggle-copy {}", config.id);
            }
        }

        Commands::ToggleCopy { id } => {
            let enabled = engine.toggle_copy_config(&id).await?;
            println!(
                "Copy config {} is now {}",
                id,
                if enabled { "enabled" } else { "disabled" }
            );
        }

        Commands::DeleteCopy { id } => {
            if engine.delete_copy_config(&id).await {
                println!("Copy config {} deleted", id);
            } else {
                println!("No copy config {} to delete", id);
            }
        }

        Commands::Copies { platform } => {
            let filter = platform.map(|p| p.parse::<Platform>()).transpose()?;
            let configs = engine.copy_configs(filter).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&configs)?);
            } else if configs.is_empty() {
                println!("No wallets followed. Add one with `papertrader add-copy`.");
            } else {
                for config in configs {
                    println!(
                        "{} {} {} [{}]",
                        config.id,
                        truncate(&config.target_wallet, 12),
                        config.sizing,
                        if config.enabled { "enabled" } else { "disabled" }
                    );
                }
            }
        }

        Commands::CopyTrades { config } => {
            let trades = engine.copy_trades(config.as_deref()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&trades)?);
            } else if trades.is_empty() {
                println!("No mirrored trades yet.");
            } else {
                for trade in trades {
                    println!(
                        "{} {} ${} (source ${}) on {} from {}",
                        trade.executed_at.format("%Y-%m-%d %H:%M:%S"),
                        trade.side,
                        trade.sized_amount.round_dp(2),
                        trade.source_amount.round_dp(2),
                        truncate(&trade.market_id, 16),
                        truncate(&trade.target_wallet, 12)
                    );
                }
            }
        }

        Commands::SetPrice { instrument, price } => {
            let key: InstrumentKey = instrument.parse()?;
            let price = Decimal::try_from(price)?;
            engine.price_board().set(key.clone(), price).await?;
            println!("{} -> {}", key, price);
        }

        Commands::Mode { state } => {
            let enabled = match state.to_lowercase().as_str() {
                "on" | "true" => true,
                "off" | "false" => false,
                other => {
                    return Err(SimError::InvalidValue(format!(
                        "mode must be on or off, got {}",
                        other
                    ))
                    .into())
                }
            };
            let now = engine.set_simulation_mode(enabled).await;
            println!("Simulation mode: {}", if now { "on" } else { "off" });
        }

        Commands::Reset => {
            let balance = engine.reset_account().await;
            println!("Account reset. Balance ${}", balance.total.round_dp(2));
        }

        Commands::Status => {
            let stats = engine.session_stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                let sim = engine.simulation_status().await;
                println!(
                    "Mode: {}",
                    if sim {
                        "simulation"
                    } else {
                        "live flag set (orders remain simulated)"
                    }
                );
                println!("{}", stats);
            }
        }

        Commands::Health => {
            let report = engine.check_health().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Healthy:        {}", report.healthy);
                println!("Simulation:     {}", report.simulation_mode);
                println!("Open positions: {}", report.open_positions);
                for violation in &report.violations {
                    println!("  !! {}", violation);
                }
            }
            if !report.healthy {
                std::process::exit(1);
            }
        }

        Commands::Markets { limit } => {
            let client = markets_client(data_api)?;
            let markets = client.get_markets(Some(limit)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&markets)?);
            } else {
                print_markets(&markets);
            }
        }

        Commands::Search { query } => {
            let client = markets_client(data_api)?;
            let markets = client.search_markets(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&markets)?);
            } else if markets.is_empty() {
                println!("No markets matched \"{}\".", query);
            } else {
                print_markets(&markets);
            }
        }

        Commands::Run {
            interval,
            strategies,
            market,
            copy_wallets,
        } => {
            let engine = Arc::new(engine);
            let ctx = ParseContext {
                market_id: market,
                ..Default::default()
            };
            for description in &strategies {
                let strategy = engine.create_strategy(description, &ctx).await;
                engine.start_strategy(&strategy.id).await?;
                println!("Started: {} [{}]", strategy.name, strategy.id);
            }
            for wallet in &copy_wallets {
                let config = engine
                    .add_copy_config(
                        Platform::Polymarket,
                        wallet,
                        CopySizing::Proportional { multiplier: dec!(0.1) },
                    )
                    .await?;
                engine.toggle_copy_config(&config.id).await?;
                println!("Mirroring {} at 10% of its size", truncate(wallet, 12));
            }

            let client = markets_client(data_api)?;
            let mut runner = Runner::new(
                Arc::clone(&engine),
                client,
                Duration::from_secs(interval),
            );
            runner.run().await?;

            println!("\n{}", engine.session_stats().await);
        }
    }

    Ok(())
}

fn parse_ctx(
    platform: Option<String>,
    symbol: Option<String>,
    market: Option<String>,
    capital: Option<f64>,
) -> Result<ParseContext> {
    Ok(ParseContext {
        platform: platform.map(|p| p.parse::<Platform>()).transpose()?,
        symbol,
        market_id: market,
        capital: capital.map(Decimal::try_from).transpose()?,
    })
}

fn markets_client(base_url: Option<String>) -> Result<MarketsClient> {
    match base_url {
        Some(url) => MarketsClient::with_base_url(url),
        None => MarketsClient::new(),
    }
}

fn print_strategy(strategy: &Strategy) {
    println!("\n{} [{}]", strategy.name, strategy.id);
    println!(
        "Platform: {} | Instrument: {} | Capital: ${} | Status: {}",
        strategy.platform,
        strategy.instrument(),
        strategy.capital,
        strategy.status
    );
    println!("Rules:");
    for (i, rule) in strategy.rules.iter().enumerate() {
        println!("  {}. {}", i + 1, rule);
    }
}

fn print_markets(markets: &[crate::models::Market]) {
    println!(
        "\n{:<44} {:>6} {:>6} {:>12}",
        "QUESTION", "YES", "NO", "LIQUIDITY"
    );
    println!("{}", "-".repeat(72));
    for market in markets {
        println!(
            "{:<44} {:>6} {:>6} {:>12}",
            truncate(&market.question, 42),
            market.outcome_price(Outcome::Yes).round_dp(2),
            market.outcome_price(Outcome::No).round_dp(2),
            market.liquidity.round_dp(0)
        );
    }
}

/// Outcome side is mandatory on polymarket opens.
fn required_outcome(outcome: Option<&str>) -> Result<Outcome, SimError> {
    outcome.ok_or(SimError::MissingField("outcome"))?.parse()
}

/// Truncate a string with ellipsis if too long. Cuts whole characters so
/// multi-byte text never splits mid-char.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let keep: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", keep)
    }
}
