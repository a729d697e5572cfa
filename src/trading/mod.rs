//! Simulation core: the account ledger, rule evaluation, copy sizing, and
//! the engine that ties them together.

mod config;
mod engine;
mod evaluator;
mod ledger;
mod position_sizer;
mod stats;

pub use config::EngineConfig;
pub use engine::{CloseTarget, Engine, HealthReport, OpenRequest, PositionView};
pub use evaluator::{first_firing, RuleFiring};
pub use ledger::{CloseReceipt, Ledger, OpenReceipt};
pub use position_sizer::CopySizer;
pub use stats::SessionStats;
