//! Top-level capital allocator: the account-wide cash pool and the registry
//! of strategies it funds.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::model::Model;
use crate::portfolio::StrategyPortfolio;
use sim_core::{AssetClass, BarProvider, Error, PositionSide, Result, Signal, StrategyId};

/// A registered strategy: its signal-producing model paired with the
/// portfolio holding its slice of capital.
pub struct StrategyEntry {
    pub model: Box<dyn Model>,
    pub portfolio: StrategyPortfolio,
}

/// Owns total account cash and routes capital and trade instructions to the
/// per-strategy portfolios.
///
/// The registry is a two-level map keyed by asset class then strategy name.
/// Its key set is fixed once the run starts; the trade manager mirrors the
/// same keys for its staging maps.
pub struct CapitalAllocator {
    cash_balance: Decimal,
    allocated_balance: Decimal,
    minimum_cash_percentage: Decimal,
    pnl_history: Vec<Decimal>,
    current_date: NaiveDate,
    registry: BTreeMap<AssetClass, BTreeMap<String, StrategyEntry>>,
    broker: String,
}

impl CapitalAllocator {
    pub fn new(
        starting_capital: Decimal,
        minimum_cash_percentage: Decimal,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            cash_balance: starting_capital,
            allocated_balance: Decimal::ZERO,
            minimum_cash_percentage,
            pnl_history: Vec::new(),
            current_date: start_date,
            registry: BTreeMap::new(),
            broker: String::new(),
        }
    }

    pub fn cash_balance(&self) -> Decimal {
        self.cash_balance
    }

    pub fn allocated_balance(&self) -> Decimal {
        self.allocated_balance
    }

    pub fn pnl_history(&self) -> &[Decimal] {
        &self.pnl_history
    }

    pub fn strategy_count(&self) -> usize {
        self.registry.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.strategy_count() == 0
    }

    /// Registry keys in deterministic order.
    pub fn strategy_ids(&self) -> Vec<StrategyId> {
        self.registry
            .iter()
            .flat_map(|(class, strategies)| {
                strategies
                    .keys()
                    .map(|name| StrategyId::new(*class, name.clone()))
            })
            .collect()
    }

    pub fn portfolio(&self, id: &StrategyId) -> Option<&StrategyPortfolio> {
        self.registry
            .get(&id.asset_class)
            .and_then(|m| m.get(&id.name))
            .map(|entry| &entry.portfolio)
    }

    /// Strategies with their portfolios, in registry order.
    pub fn strategies(&self) -> impl Iterator<Item = (StrategyId, &StrategyPortfolio)> {
        self.registry.iter().flat_map(|(class, strategies)| {
            strategies.iter().map(|(name, entry)| {
                (StrategyId::new(*class, name.clone()), &entry.portfolio)
            })
        })
    }

    /// Propagate the broker label to every portfolio.
    pub fn set_broker(&mut self, broker: &str) {
        self.broker = broker.to_string();
        for entry in self.entries_mut() {
            entry.portfolio.set_broker(broker);
        }
    }

    /// Register a strategy before the run starts.
    ///
    /// Rejects duplicate names within an asset class and non-tradable
    /// asset classes; both are configuration defects.
    pub fn add_model(
        &mut self,
        name: &str,
        mut model: Box<dyn Model>,
        asset_class: AssetClass,
        universe: Vec<String>,
        allocation_percentage: Decimal,
        lot_floor_notional: Decimal,
    ) -> Result<()> {
        if !asset_class.is_tradable() {
            return Err(Error::UnsupportedAssetClass(asset_class));
        }

        let strategies = self.registry.entry(asset_class).or_default();
        if strategies.contains_key(name) {
            return Err(Error::DuplicateStrategyName(name.to_string()));
        }

        let mut portfolio = StrategyPortfolio::new(
            allocation_percentage,
            universe.clone(),
            lot_floor_notional,
            self.current_date,
        );
        portfolio.set_broker(&self.broker);
        model.set_universe(universe);

        info!(strategy = name, %asset_class, %allocation_percentage, "registered strategy");
        strategies.insert(name.to_string(), StrategyEntry { model, portfolio });
        Ok(())
    }

    /// Fan the simulation start date out to every model.
    pub fn set_model_start_dates(&mut self, start: NaiveDate) {
        for entry in self.entries_mut() {
            entry.model.set_start_date(start);
        }
    }

    /// Distribute cash to strategies by weight, keeping the reserve
    /// fraction untouched. Runs exactly once, before the loop starts.
    ///
    /// Each strategy's single-security cap is rescaled by its allocation
    /// weight (`floor(100 · max / weight) / 100`) so the cap stays relative
    /// to total account capital rather than the strategy's slice.
    pub fn allocate_all_cash(&mut self, max_single_security_pct: Decimal) {
        let to_distribute =
            (self.cash_balance * (Decimal::ONE - self.minimum_cash_percentage)).trunc();

        let mut distributed = Decimal::ZERO;
        for (_, strategies) in self.registry.iter_mut() {
            for (name, entry) in strategies.iter_mut() {
                let weight = entry.portfolio.allocation_percentage();
                if weight.is_zero() {
                    debug!(strategy = %name, "zero allocation weight, strategy gets no cash");
                    continue;
                }

                let amount = (to_distribute * weight).trunc();
                let cap = (max_single_security_pct / weight * Decimal::ONE_HUNDRED).floor()
                    / Decimal::ONE_HUNDRED;

                entry.portfolio.set_cash_balance(amount);
                entry.portfolio.set_max_single_security_pct(cap);
                distributed += amount;

                info!(strategy = %name, %amount, single_security_cap = %cap, "allocated cash");
            }
        }

        self.cash_balance -= distributed;
        self.allocated_balance += distributed;
    }

    /// Advance every model and portfolio to a new session date. Must run
    /// before prices are refreshed for the session.
    pub fn update_all_dates(&mut self, date: NaiveDate) {
        self.current_date = date;
        for entry in self.entries_mut() {
            entry.model.set_current_date(date);
            entry.portfolio.set_date(date);
        }
    }

    /// Refresh every held position's price for the active date. Must run
    /// after `update_all_dates` and before `update_pnl`.
    pub async fn update_relevant(&mut self, provider: &dyn BarProvider) -> Result<()> {
        for entry in self.entries_mut() {
            entry.portfolio.refresh_prices(provider).await?;
        }
        Ok(())
    }

    /// Post-order PnL roll-up: every portfolio accrues first, then the
    /// summed per-strategy deltas plus this allocator's own balances become
    /// the account-level sample.
    pub fn update_pnl(&mut self) {
        let mut strategies_pnl = Decimal::ZERO;
        for entry in self.entries_mut() {
            entry.portfolio.update_pnl();
            strategies_pnl += entry
                .portfolio
                .pnl_history()
                .last()
                .copied()
                .unwrap_or_default();
        }
        self.pnl_history
            .push(strategies_pnl + self.cash_balance + self.allocated_balance);
    }

    /// Route an open request to the addressed strategy portfolio.
    pub async fn open_position(
        &mut self,
        id: &StrategyId,
        ticker: &str,
        side: PositionSide,
        allocation_percentage: Decimal,
        provider: &dyn BarProvider,
    ) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry
            .portfolio
            .open_position(ticker, side, allocation_percentage, provider)
            .await
    }

    /// Route a close request, verifying the ticker is actually held, and
    /// fold the realized PnL into the allocator's allocated balance.
    pub fn close_position(&mut self, id: &StrategyId, ticker: &str) -> Result<()> {
        let entry = self.entry_mut(id)?;
        if !entry.portfolio.holds(ticker) {
            return Err(Error::CloseTargetNotHeld(ticker.to_string()));
        }

        let pnl = entry.portfolio.close_position(ticker)?;
        self.allocated_balance += pnl;
        Ok(())
    }

    /// Reconcile one signal against the addressed portfolio's holdings.
    pub fn compare_security(
        &self,
        id: &StrategyId,
        ticker: &str,
        signal: Signal,
    ) -> Result<(bool, bool)> {
        let portfolio = self.portfolio(id).ok_or_else(|| Error::UnknownStrategy {
            asset_class: id.asset_class,
            name: id.name.clone(),
        })?;
        Ok(portfolio.compare_security(ticker, signal))
    }

    /// Record every portfolio's position distribution for the active date.
    pub fn compute_position_distribution(&mut self) {
        for entry in self.entries_mut() {
            entry.portfolio.compute_position_distribution();
        }
    }

    /// Run every model for the active session and collect its signal map.
    pub async fn poll_models(&mut self) -> Result<Vec<(StrategyId, HashMap<String, Signal>)>> {
        let mut all_signals = Vec::new();
        for (class, strategies) in self.registry.iter_mut() {
            for (name, entry) in strategies.iter_mut() {
                let signals = entry.model.run().await?;
                all_signals.push((StrategyId::new(*class, name.clone()), signals));
            }
        }
        Ok(all_signals)
    }

    fn entries_mut(&mut self) -> impl Iterator<Item = &mut StrategyEntry> {
        self.registry.values_mut().flat_map(BTreeMap::values_mut)
    }

    fn entry_mut(&mut self, id: &StrategyId) -> Result<&mut StrategyEntry> {
        self.registry
            .get_mut(&id.asset_class)
            .and_then(|m| m.get_mut(&id.name))
            .ok_or_else(|| Error::UnknownStrategy {
                asset_class: id.asset_class,
                name: id.name.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConstantModel;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn allocator_with(names: &[(&str, Decimal)]) -> CapitalAllocator {
        let mut allocator =
            CapitalAllocator::new(dec(1_000_000), Decimal::new(3, 2), date(2022, 1, 3));
        for (name, weight) in names {
            allocator
                .add_model(
                    name,
                    Box::new(ConstantModel::new(Signal::Long)),
                    AssetClass::Equity,
                    vec!["SPY".to_string()],
                    *weight,
                    dec(200),
                )
                .unwrap();
        }
        allocator
    }

    #[test]
    fn test_duplicate_name_rejected_registry_unchanged() {
        let mut allocator = allocator_with(&[("dummy", Decimal::ONE)]);

        let err = allocator
            .add_model(
                "dummy",
                Box::new(ConstantModel::new(Signal::Short)),
                AssetClass::Equity,
                vec!["GLD".to_string()],
                Decimal::ONE,
                dec(200),
            )
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateStrategyName(n) if n == "dummy"));
        assert_eq!(allocator.strategy_count(), 1);
        // The surviving entry still trades its original universe.
        let id = StrategyId::new(AssetClass::Equity, "dummy");
        assert!(allocator
            .portfolio(&id)
            .unwrap()
            .security_universe()
            .contains("SPY"));
    }

    #[test]
    fn test_same_name_under_other_class_would_be_distinct() {
        let mut allocator = allocator_with(&[("dummy", Decimal::ONE)]);
        // Options is a stub class, so this fails for a different reason.
        let err = allocator
            .add_model(
                "dummy",
                Box::new(ConstantModel::new(Signal::Long)),
                AssetClass::Options,
                vec![],
                Decimal::ONE,
                dec(200),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAssetClass(AssetClass::Options)));
    }

    #[test]
    fn test_allocate_all_cash_keeps_reserve() {
        let mut allocator = allocator_with(&[("dummy", Decimal::ONE)]);
        allocator.allocate_all_cash(Decimal::new(5, 2));

        // 3% reserve: 970000 distributed, 30000 kept as cash.
        assert_eq!(allocator.cash_balance(), dec(30_000));
        assert_eq!(allocator.allocated_balance(), dec(970_000));

        let id = StrategyId::new(AssetClass::Equity, "dummy");
        assert_eq!(allocator.portfolio(&id).unwrap().cash_balance(), dec(970_000));
    }

    #[test]
    fn test_allocation_split_by_weight() {
        let mut allocator = allocator_with(&[
            ("a", Decimal::new(5, 1)),
            ("b", Decimal::new(5, 1)),
        ]);
        allocator.allocate_all_cash(Decimal::new(5, 2));

        let a = StrategyId::new(AssetClass::Equity, "a");
        let b = StrategyId::new(AssetClass::Equity, "b");
        assert_eq!(allocator.portfolio(&a).unwrap().cash_balance(), dec(485_000));
        assert_eq!(allocator.portfolio(&b).unwrap().cash_balance(), dec(485_000));
    }

    #[test]
    fn test_single_security_cap_rescaled_by_weight() {
        let mut allocator = allocator_with(&[("half", Decimal::new(5, 1))]);
        allocator.allocate_all_cash(Decimal::new(5, 2));

        // floor(100 * 0.05 / 0.5) / 100 = 0.10
        let id = StrategyId::new(AssetClass::Equity, "half");
        assert_eq!(
            allocator.portfolio(&id).unwrap().max_single_security_pct(),
            Decimal::new(10, 2)
        );
    }

    #[test]
    fn test_pnl_rollup_includes_own_balances() {
        let mut allocator = allocator_with(&[("dummy", Decimal::ONE)]);
        allocator.allocate_all_cash(Decimal::new(5, 2));
        allocator.update_pnl();

        // No positions: strategy pnl 0, sample = cash + allocated = 1e6.
        assert_eq!(allocator.pnl_history(), &[dec(1_000_000)]);
    }

    #[test]
    fn test_close_unknown_ticker_routed_check() {
        let mut allocator = allocator_with(&[("dummy", Decimal::ONE)]);
        let id = StrategyId::new(AssetClass::Equity, "dummy");
        let err = allocator.close_position(&id, "TSLA").unwrap_err();
        assert!(matches!(err, Error::CloseTargetNotHeld(_)));
    }

    #[test]
    fn test_unknown_strategy_routing_error() {
        let mut allocator = allocator_with(&[("dummy", Decimal::ONE)]);
        let id = StrategyId::new(AssetClass::Equity, "ghost");
        let err = allocator.close_position(&id, "SPY").unwrap_err();
        assert!(matches!(err, Error::UnknownStrategy { .. }));
    }
}
