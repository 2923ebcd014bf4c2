//! EquiSim: Multi-Strategy Equity Backtesting Engine
//!
//! This is the root crate that provides benchmark access to the internal modules.
//! For actual functionality, use the individual crates directly:
//!
//! - `sim-core`: Core types, trading calendar, daily bar stores
//! - `backtester`: Capital allocation, portfolios, the simulation loop

// Re-export for benchmarks
pub use backtester;
pub use sim_core as core;
