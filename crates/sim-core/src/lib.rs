//! Sim Core
//!
//! Shared vocabulary for the equisim backtesting engine: asset classes,
//! trading signals, daily price bars, the trading calendar, and the
//! market-data providers the simulation reads prices from.

pub mod calendar;
pub mod data_store;
pub mod error;
pub mod types;

// Re-exports
pub use calendar::{TradingCalendar, UsEquityCalendar};
pub use data_store::{open_with_fallback, BarProvider, InMemoryBarStore, PgBarStore};
pub use error::{Error, Result};
pub use types::{AssetClass, PositionSide, PriceBar, Signal, StrategyId};
