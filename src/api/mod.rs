//! Market data client and the in-memory price board.

mod markets;
mod prices;
mod types;

pub use markets::MarketsClient;
pub use prices::{InstrumentKey, PriceBoard};
pub use types::*;
