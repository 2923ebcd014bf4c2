//! Per-strategy portfolio: cash, open positions, open/close decisions.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

use crate::position::Position;
use sim_core::{BarProvider, Error, PositionSide, Result, Signal};

/// What a journal entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Open,
    Close,
}

/// One entry in a strategy's trade journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Record ID.
    pub id: Uuid,
    /// Instrument traded.
    pub ticker: String,
    /// Open or close.
    pub action: TradeAction,
    /// Direction of the position.
    pub side: PositionSide,
    /// Session the action happened on.
    pub date: NaiveDate,
    /// Price the action was booked at.
    pub price: Decimal,
    /// Shares involved.
    pub shares: u64,
    /// Realized PnL, present on closes.
    pub pnl: Option<Decimal>,
}

/// Owns one strategy's slice of capital and its open positions.
///
/// The allocator funds the portfolio once before the loop starts; after
/// that, money only moves between `cash_balance`, `allocated_balance` and
/// the held [`Position`]s through `open_position` and `close_position`.
#[derive(Debug)]
pub struct StrategyPortfolio {
    cash_balance: Decimal,
    allocated_balance: Decimal,
    allocation_percentage: Decimal,
    max_single_security_pct: Decimal,
    lot_floor_notional: Decimal,
    securities: BTreeMap<String, Position>,
    security_universe: BTreeSet<String>,
    position_distribution: BTreeMap<NaiveDate, Vec<Decimal>>,
    pnl_history: Vec<Decimal>,
    trades: Vec<TradeRecord>,
    openings_failed: u64,
    current_date: NaiveDate,
    broker: String,
}

impl StrategyPortfolio {
    pub fn new(
        allocation_percentage: Decimal,
        universe: Vec<String>,
        lot_floor_notional: Decimal,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            cash_balance: Decimal::ZERO,
            allocated_balance: Decimal::ZERO,
            allocation_percentage,
            max_single_security_pct: Decimal::ZERO,
            lot_floor_notional,
            securities: BTreeMap::new(),
            security_universe: universe.into_iter().collect(),
            position_distribution: BTreeMap::new(),
            pnl_history: Vec::new(),
            trades: Vec::new(),
            openings_failed: 0,
            current_date: start_date,
            broker: String::new(),
        }
    }

    pub fn cash_balance(&self) -> Decimal {
        self.cash_balance
    }

    pub fn allocated_balance(&self) -> Decimal {
        self.allocated_balance
    }

    /// Cash plus allocated; the capital this strategy controls.
    pub fn total_balance(&self) -> Decimal {
        self.cash_balance + self.allocated_balance
    }

    pub fn allocation_percentage(&self) -> Decimal {
        self.allocation_percentage
    }

    pub fn max_single_security_pct(&self) -> Decimal {
        self.max_single_security_pct
    }

    pub fn security_universe(&self) -> &BTreeSet<String> {
        &self.security_universe
    }

    pub fn pnl_history(&self) -> &[Decimal] {
        &self.pnl_history
    }

    pub fn position_distribution(&self) -> &BTreeMap<NaiveDate, Vec<Decimal>> {
        &self.position_distribution
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn openings_failed(&self) -> u64 {
        self.openings_failed
    }

    /// Tickers currently held.
    pub fn held_tickers(&self) -> impl Iterator<Item = &str> {
        self.securities.keys().map(String::as_str)
    }

    pub fn holds(&self, ticker: &str) -> bool {
        self.securities.contains_key(ticker)
    }

    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.securities.get(ticker)
    }

    pub fn open_position_count(&self) -> usize {
        self.securities.len()
    }

    /// One-time funding from the allocator.
    pub fn set_cash_balance(&mut self, cash: Decimal) {
        self.cash_balance = cash;
    }

    pub fn set_max_single_security_pct(&mut self, pct: Decimal) {
        self.max_single_security_pct = pct;
    }

    pub fn set_broker(&mut self, broker: &str) {
        self.broker = broker.to_string();
    }

    /// Advance the portfolio and every held position to a new session.
    pub fn set_date(&mut self, date: NaiveDate) {
        self.current_date = date;
        for position in self.securities.values_mut() {
            position.set_date(date);
        }
    }

    /// Re-fetch the current price of every held position for the active
    /// date. Must run after `set_date` and before `update_pnl`.
    pub async fn refresh_prices(&mut self, provider: &dyn BarProvider) -> Result<()> {
        for position in self.securities.values_mut() {
            position.mark_to_market(provider).await?;
        }
        Ok(())
    }

    /// Accrue PnL on every held position and append the summed per-position
    /// deltas as this portfolio's sample for the session.
    pub fn update_pnl(&mut self) {
        let mut total = Decimal::ZERO;
        for position in self.securities.values_mut() {
            position.accrue_pnl();
            total += position.latest_pnl();
        }
        self.pnl_history.push(total);
    }

    /// Try to open a position, enforcing the lot floor and the
    /// single-security exposure cap.
    ///
    /// A candidate whose minimum viable lot `ceil(floor_notional / open)`
    /// exceeds the affordable share count `floor(cap_cash / open)` is
    /// rejected without mutating anything but the failed-opening counter.
    pub async fn open_position(
        &mut self,
        ticker: &str,
        side: PositionSide,
        allocation_percentage: Decimal,
        provider: &dyn BarProvider,
    ) -> Result<()> {
        let mut position = Position::new(
            ticker,
            side,
            allocation_percentage,
            self.current_date,
            &self.broker,
        );
        position.mark_to_market(provider).await?;
        position.set_entry_from_current();

        let open_price = position.open_price();
        let min_lot = (self.lot_floor_notional / open_price).ceil();
        let max_exposure_cash = self.max_single_security_pct * self.total_balance();
        let max_shares = (max_exposure_cash / open_price).floor();

        if min_lot > max_shares {
            self.openings_failed += 1;
            debug!(
                ticker,
                %open_price,
                %min_lot,
                %max_shares,
                "open rejected: lot floor exceeds affordable shares"
            );
            return Ok(());
        }

        let expected_investment = allocation_percentage * self.cash_balance;
        let amount = max_exposure_cash.min(expected_investment).trunc();

        self.cash_balance -= amount;
        self.allocated_balance += amount;
        position.deposit(amount);
        position.enter_position();

        self.trades.push(TradeRecord {
            id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            action: TradeAction::Open,
            side,
            date: self.current_date,
            price: open_price,
            shares: position.shares(),
            pnl: None,
        });

        self.securities.insert(ticker.to_string(), position);
        Ok(())
    }

    /// Close a held position: charge the final commission, fold its realized
    /// PnL and remaining balances back into portfolio cash, and drop it.
    ///
    /// Returns the realized PnL so the allocator can roll it up. Closing a
    /// ticker that is not held is a reconciliation bug upstream.
    pub fn close_position(&mut self, ticker: &str) -> Result<Decimal> {
        let mut position = self
            .securities
            .remove(ticker)
            .ok_or_else(|| Error::CloseTargetNotHeld(ticker.to_string()))?;

        position.charge_commission();
        let pnl = position.latest_pnl();
        let freed = position.allocated_balance() + position.cash_balance();

        self.cash_balance += pnl + freed;
        self.allocated_balance -= freed;

        self.trades.push(TradeRecord {
            id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            action: TradeAction::Close,
            side: position.side(),
            date: self.current_date,
            price: position.current_price(),
            shares: position.shares(),
            pnl: Some(pnl),
        });

        Ok(pnl)
    }

    /// Reconcile a desired signal against current holdings.
    ///
    /// Returns `(should_close, should_open)`:
    ///
    /// | held | signal                  | close | open  |
    /// |------|-------------------------|-------|-------|
    /// | yes  | same side, or no data   | no    | no    |
    /// | yes  | flat                    | yes   | no    |
    /// | yes  | opposite side           | yes   | yes   |
    /// | no   | flat or no data         | no    | no    |
    /// | no   | long or short           | no    | yes   |
    pub fn compare_security(&self, ticker: &str, signal: Signal) -> (bool, bool) {
        match self.securities.get(ticker) {
            Some(position) => {
                if signal.matches(position.side()) || signal == Signal::NoData {
                    (false, false)
                } else if signal == Signal::Flat {
                    (true, false)
                } else {
                    (true, true)
                }
            }
            None => (false, signal.direction().is_some()),
        }
    }

    /// Record each held position's share of the portfolio's total capital
    /// for the active date. Audit output only; decisions never read it.
    pub fn compute_position_distribution(&mut self) {
        let total = self.total_balance();
        let distribution = self
            .securities
            .values()
            .map(|p| {
                if total.is_zero() {
                    Decimal::ZERO
                } else {
                    p.total_balance() / total
                }
            })
            .collect();
        self.position_distribution
            .insert(self.current_date, distribution);
    }
}
