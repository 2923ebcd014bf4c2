//! Backtester
//!
//! Day-stepped historical simulation of multi-strategy equity portfolios.
//!
//! # Features
//!
//! - **Model Trait**: Pluggable signal-producer interface for custom strategies
//! - **Capital Allocator**: Account-wide cash pool with per-strategy portfolios
//! - **Trade Manager**: Close-before-open staging of the day's instructions
//! - **Simulator**: The full session loop over a US equity trading calendar
//!
//! # Example
//!
//! ```ignore
//! use backtester::{FlipFlopModel, Simulator, SimulatorConfig};
//! use sim_core::{AssetClass, InMemoryBarStore};
//!
//! let mut simulator = Simulator::new(SimulatorConfig::default(), provider);
//! simulator.add_model(
//!     "dummy",
//!     Box::new(FlipFlopModel::new()),
//!     AssetClass::Equity,
//!     vec!["SPY".to_string()],
//!     Decimal::ONE,
//! )?;
//!
//! let report = simulator.run().await?;
//! println!("Final PnL: {}", report.final_pnl());
//! ```

pub mod allocator;
pub mod model;
pub mod portfolio;
pub mod position;
pub mod simulator;
pub mod trade_manager;

// Re-exports
pub use allocator::{CapitalAllocator, StrategyEntry};
pub use model::{ConstantModel, FlipFlopModel, Model};
pub use portfolio::{StrategyPortfolio, TradeAction, TradeRecord};
pub use position::Position;
pub use simulator::{SimulationReport, Simulator, SimulatorConfig, StrategyReport};
pub use trade_manager::TradeManager;
