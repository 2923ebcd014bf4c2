//! The day-stepping simulation loop.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::allocator::CapitalAllocator;
use crate::model::Model;
use crate::portfolio::TradeRecord;
use crate::trade_manager::TradeManager;
use sim_core::{
    AssetClass, BarProvider, Error, Result, StrategyId, TradingCalendar, UsEquityCalendar,
};

/// Configuration for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Starting account capital.
    pub starting_capital: Decimal,
    /// First calendar date of the run.
    pub start_date: NaiveDate,
    /// Last calendar date of the run.
    pub end_date: NaiveDate,
    /// Fraction of cash never distributed to strategies.
    pub minimum_cash_percentage: Decimal,
    /// Maximum fraction of total capital permitted in a single position.
    pub max_single_security_pct: Decimal,
    /// Minimum notional below which a position will not open.
    pub lot_floor_notional: Decimal,
    /// Broker label, feeds the commission schedule.
    pub broker: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            starting_capital: Decimal::new(1_000_000, 0),
            start_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            end_date: chrono::Utc::now().date_naive(),
            minimum_cash_percentage: Decimal::ZERO,
            max_single_security_pct: Decimal::new(5, 2),
            lot_floor_notional: Decimal::new(200, 0),
            broker: String::new(),
        }
    }
}

/// Everything a finished run exposes to result consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Number of sessions simulated.
    pub sessions: usize,
    /// Account-level PnL history, one sample per session.
    pub pnl_history: Vec<Decimal>,
    /// Undistributed reserve cash at the end of the run.
    pub final_cash: Decimal,
    /// Capital in strategy hands at the end of the run.
    pub final_allocated: Decimal,
    /// Per-strategy results, in registry order.
    pub strategies: Vec<StrategyReport>,
}

/// One strategy's slice of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyReport {
    pub id: StrategyId,
    /// Summed per-position PnL deltas, one sample per session.
    pub pnl_history: Vec<Decimal>,
    /// Per-session exposure fraction of each held position.
    pub position_distribution: BTreeMap<NaiveDate, Vec<Decimal>>,
    /// Opens rejected by the lot-floor check.
    pub openings_failed: u64,
    /// Journal of every open and close.
    pub trades: Vec<TradeRecord>,
}

impl SimulationReport {
    /// Latest account-level PnL sample.
    pub fn final_pnl(&self) -> Decimal {
        self.pnl_history.last().copied().unwrap_or_default()
    }

    /// Drop the first PnL sample at every level.
    ///
    /// The first sample is taken before any position exists and carries
    /// only the starting balances, which skews charts built on the series.
    pub fn discard_warmup_sample(&mut self) {
        if !self.pnl_history.is_empty() {
            self.pnl_history.remove(0);
        }
        for strategy in &mut self.strategies {
            if !strategy.pnl_history.is_empty() {
                strategy.pnl_history.remove(0);
            }
        }
    }
}

/// Drives the full life cycle of a backtest over a trading calendar.
///
/// Per session the loop runs a fixed protocol: propagate the date, refresh
/// prices, accrue PnL, flush staged closes, flush staged opens, record the
/// position distribution, poll every model, and reconcile the fresh signals
/// into the next session's staged instructions. The first error aborts the
/// remaining schedule.
pub struct Simulator {
    config: SimulatorConfig,
    allocator: CapitalAllocator,
    trade_manager: TradeManager,
    provider: Arc<dyn BarProvider>,
    calendar: Box<dyn TradingCalendar>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig, provider: Arc<dyn BarProvider>) -> Self {
        let mut allocator = CapitalAllocator::new(
            config.starting_capital,
            config.minimum_cash_percentage,
            config.start_date,
        );
        allocator.set_broker(&config.broker);

        Self {
            config,
            allocator,
            trade_manager: TradeManager::new(),
            provider,
            calendar: Box::new(UsEquityCalendar),
        }
    }

    /// Swap the default US equity calendar for another session source.
    pub fn with_calendar(mut self, calendar: Box<dyn TradingCalendar>) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn allocator(&self) -> &CapitalAllocator {
        &self.allocator
    }

    /// Register a strategy. Must happen before [`run`](Simulator::run).
    pub fn add_model(
        &mut self,
        name: &str,
        model: Box<dyn Model>,
        asset_class: AssetClass,
        universe: Vec<String>,
        allocation_percentage: Decimal,
    ) -> Result<()> {
        self.allocator.add_model(
            name,
            model,
            asset_class,
            universe,
            allocation_percentage,
            self.config.lot_floor_notional,
        )
    }

    /// Run the simulation over the full trading calendar.
    pub async fn run(&mut self) -> Result<SimulationReport> {
        if self.allocator.is_empty() {
            return Err(Error::NoStrategyRegistered);
        }
        for (id, portfolio) in self.allocator.strategies() {
            if portfolio.security_universe().is_empty() {
                return Err(Error::UniverseNotSet(id.name));
            }
        }

        let sessions = self
            .calendar
            .sessions(self.config.start_date, self.config.end_date);

        self.allocator.set_model_start_dates(self.config.start_date);
        self.trade_manager.shape_for(&self.allocator.strategy_ids());
        self.allocator
            .allocate_all_cash(self.config.max_single_security_pct);

        info!(
            sessions = sessions.len(),
            start = %self.config.start_date,
            end = %self.config.end_date,
            strategies = self.allocator.strategy_count(),
            "starting simulation"
        );

        for date in &sessions {
            self.step(*date).await?;
        }

        let report = self.report(sessions.len());
        info!(
            sessions = report.sessions,
            final_pnl = %report.final_pnl(),
            "simulation completed"
        );
        Ok(report)
    }

    /// Process one session end to end.
    async fn step(&mut self, date: NaiveDate) -> Result<()> {
        debug!(%date, "processing session");

        self.allocator.update_all_dates(date);
        self.allocator
            .update_relevant(self.provider.as_ref())
            .await?;
        self.allocator.update_pnl();

        self.trade_manager.flush_closes(&mut self.allocator)?;
        self.trade_manager
            .flush_opens(&mut self.allocator, self.provider.as_ref())
            .await?;

        self.allocator.compute_position_distribution();

        let all_signals = self.allocator.poll_models().await?;
        for (id, signals) in all_signals {
            for (ticker, signal) in signals {
                let (should_close, should_open) =
                    self.allocator.compare_security(&id, &ticker, signal)?;
                if should_close {
                    self.trade_manager.add_close(&id, &ticker)?;
                }
                if should_open {
                    if let Some(side) = signal.direction() {
                        self.trade_manager.add_open(&id, &ticker, side)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn report(&self, sessions: usize) -> SimulationReport {
        let strategies = self
            .allocator
            .strategies()
            .map(|(id, portfolio)| StrategyReport {
                id,
                pnl_history: portfolio.pnl_history().to_vec(),
                position_distribution: portfolio.position_distribution().clone(),
                openings_failed: portfolio.openings_failed(),
                trades: portfolio.trades().to_vec(),
            })
            .collect();

        SimulationReport {
            sessions,
            pnl_history: self.allocator.pnl_history().to_vec(),
            final_cash: self.allocator.cash_balance(),
            final_allocated: self.allocator.allocated_balance(),
            strategies,
        }
    }
}
