//! Per-day staging area for close and open instructions.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

use crate::allocator::CapitalAllocator;
use sim_core::{BarProvider, Error, PositionSide, Result, StrategyId};

/// Batches the day's close and open instructions and flushes them against
/// the allocator in a fixed order: closes first, then opens, so capital
/// freed by a close can fund the same day's opens.
///
/// The key sets of both staging maps mirror the allocator's registry for
/// the whole run; instructions for an unknown strategy are rejected.
#[derive(Debug, Default)]
pub struct TradeManager {
    to_close: BTreeMap<StrategyId, Vec<String>>,
    to_open: BTreeMap<StrategyId, BTreeMap<String, PositionSide>>,
}

impl TradeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset both staging maps to the registry's key shape. Runs once,
    /// before the first session.
    pub fn shape_for(&mut self, ids: &[StrategyId]) {
        self.to_close = ids.iter().cloned().map(|id| (id, Vec::new())).collect();
        self.to_open = ids
            .iter()
            .cloned()
            .map(|id| (id, BTreeMap::new()))
            .collect();
    }

    /// Stage a close for the addressed strategy.
    pub fn add_close(&mut self, id: &StrategyId, ticker: &str) -> Result<()> {
        self.to_close
            .get_mut(id)
            .ok_or_else(|| unknown(id))?
            .push(ticker.to_string());
        Ok(())
    }

    /// Stage an open for the addressed strategy.
    pub fn add_open(&mut self, id: &StrategyId, ticker: &str, side: PositionSide) -> Result<()> {
        self.to_open
            .get_mut(id)
            .ok_or_else(|| unknown(id))?
            .insert(ticker.to_string(), side);
        Ok(())
    }

    pub fn pending_closes(&self, id: &StrategyId) -> usize {
        self.to_close.get(id).map_or(0, Vec::len)
    }

    pub fn pending_opens(&self, id: &StrategyId) -> usize {
        self.to_open.get(id).map_or(0, BTreeMap::len)
    }

    /// Close every staged position, then clear the staging lists.
    pub fn flush_closes(&mut self, allocator: &mut CapitalAllocator) -> Result<()> {
        for (id, tickers) in self.to_close.iter_mut() {
            if tickers.is_empty() {
                continue;
            }
            debug!(strategy = %id, count = tickers.len(), "flushing staged closes");
            for ticker in tickers.drain(..) {
                allocator.close_position(id, &ticker)?;
            }
        }
        Ok(())
    }

    /// Open every staged position with an even allocation weight of
    /// `floor(100 / N) / 100` per strategy, then clear the staging maps.
    pub async fn flush_opens(
        &mut self,
        allocator: &mut CapitalAllocator,
        provider: &dyn BarProvider,
    ) -> Result<()> {
        for (id, opens) in self.to_open.iter_mut() {
            if opens.is_empty() {
                continue;
            }

            let count = Decimal::from(opens.len() as u64);
            let allocation_percentage =
                (Decimal::ONE_HUNDRED / count).floor() / Decimal::ONE_HUNDRED;

            debug!(
                strategy = %id,
                count = opens.len(),
                %allocation_percentage,
                "flushing staged opens"
            );
            for (ticker, side) in std::mem::take(opens) {
                allocator
                    .open_position(id, &ticker, side, allocation_percentage, provider)
                    .await?;
            }
        }
        Ok(())
    }
}

fn unknown(id: &StrategyId) -> Error {
    Error::UnknownStrategy {
        asset_class: id.asset_class,
        name: id.name.clone(),
    }
}
