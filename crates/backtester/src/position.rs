//! Bookkeeping for one open holding of one instrument.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sim_core::{open_with_fallback, BarProvider, PositionSide, Result};

/// One open position held by a strategy portfolio.
///
/// A position owns two sub-balances: `allocated_balance` carries the value
/// put into shares at entry, `cash_balance` the unspent residue of its
/// funding. PnL accrual only appends to `pnl_history`; the balances move
/// exclusively through explicit capital operations (funding, share entry,
/// commission).
#[derive(Debug, Clone)]
pub struct Position {
    ticker: String,
    cash_balance: Decimal,
    allocated_balance: Decimal,
    allocation_percentage: Decimal,
    side: PositionSide,
    shares: u64,
    open_price: Decimal,
    current_price: Decimal,
    commission: Decimal,
    pnl_history: Vec<Decimal>,
    current_date: NaiveDate,
    opened_at: NaiveDate,
}

impl Position {
    /// Create an unfunded position shell for `ticker`.
    pub fn new(
        ticker: &str,
        side: PositionSide,
        allocation_percentage: Decimal,
        date: NaiveDate,
        broker: &str,
    ) -> Self {
        Self {
            ticker: ticker.to_string(),
            cash_balance: Decimal::ZERO,
            allocated_balance: Decimal::ZERO,
            allocation_percentage,
            side,
            shares: 0,
            open_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            commission: commission_for_broker(broker),
            pnl_history: Vec::new(),
            current_date: date,
            opened_at: date,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn side(&self) -> PositionSide {
        self.side
    }

    pub fn shares(&self) -> u64 {
        self.shares
    }

    pub fn open_price(&self) -> Decimal {
        self.open_price
    }

    pub fn current_price(&self) -> Decimal {
        self.current_price
    }

    pub fn cash_balance(&self) -> Decimal {
        self.cash_balance
    }

    pub fn allocated_balance(&self) -> Decimal {
        self.allocated_balance
    }

    pub fn allocation_percentage(&self) -> Decimal {
        self.allocation_percentage
    }

    pub fn commission(&self) -> Decimal {
        self.commission
    }

    pub fn opened_at(&self) -> NaiveDate {
        self.opened_at
    }

    /// Cash plus allocated value; the capital this position ties up.
    pub fn total_balance(&self) -> Decimal {
        self.cash_balance + self.allocated_balance
    }

    pub fn pnl_history(&self) -> &[Decimal] {
        &self.pnl_history
    }

    /// Most recent accrued PnL, zero before the first accrual.
    pub fn latest_pnl(&self) -> Decimal {
        self.pnl_history.last().copied().unwrap_or_default()
    }

    /// Advance the position to a new session date.
    pub fn set_date(&mut self, date: NaiveDate) {
        self.current_date = date;
    }

    /// Re-fetch the current price for the active date, with the provider's
    /// backward fallback for uncovered holidays.
    pub async fn mark_to_market(&mut self, provider: &dyn BarProvider) -> Result<()> {
        self.current_price = open_with_fallback(provider, &self.ticker, self.current_date).await?;
        Ok(())
    }

    /// Pin the entry price at the freshly marked current price.
    pub fn set_entry_from_current(&mut self) {
        self.open_price = self.current_price;
    }

    /// Receive funding from the owning portfolio.
    pub fn deposit(&mut self, amount: Decimal) {
        self.cash_balance += amount;
    }

    /// Convert funded cash into shares at the entry price and charge the
    /// entry commission.
    ///
    /// `shares = floor(cash / open_price)`; the share notional moves from
    /// cash to allocated, the fractional remainder stays in cash.
    pub fn enter_position(&mut self) {
        self.shares = (self.cash_balance / self.open_price)
            .floor()
            .to_u64()
            .unwrap_or(0);

        let notional = Decimal::from(self.shares) * self.current_price;
        self.cash_balance -= notional;
        self.allocated_balance += notional;

        self.charge_commission();
    }

    /// Append today's realized-to-date PnL sample.
    ///
    /// `(current − open) × side × shares`; balances are untouched.
    pub fn accrue_pnl(&mut self) {
        let delta = (self.current_price - self.open_price)
            * self.side.multiplier()
            * Decimal::from(self.shares);
        self.pnl_history.push(delta);
    }

    /// Debit the commission from the cash sub-balance.
    pub fn charge_commission(&mut self) {
        self.cash_balance -= self.commission;
    }
}

// TODO: pull the per-broker commission schedule from the data store once
// one exists; every supported broker currently trades commission-free.
fn commission_for_broker(broker: &str) -> Decimal {
    let _ = broker;
    Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{InMemoryBarStore, PriceBar};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    async fn opened_position(funding: i64, price: i64) -> Position {
        let mut store = InMemoryBarStore::new();
        store.insert("SPY", PriceBar::flat(date(2022, 1, 3), dec(price)));

        let mut pos = Position::new(
            "SPY",
            PositionSide::Long,
            Decimal::ONE,
            date(2022, 1, 3),
            "IB",
        );
        pos.mark_to_market(&store).await.unwrap();
        pos.set_entry_from_current();
        pos.deposit(dec(funding));
        pos.enter_position();
        pos
    }

    #[tokio::test]
    async fn test_share_count_floors() {
        let pos = opened_position(1000, 300).await;
        // floor(1000 / 300) = 3 shares, 900 allocated, 100 residue.
        assert_eq!(pos.shares(), 3);
        assert_eq!(pos.allocated_balance(), dec(900));
        assert_eq!(pos.cash_balance(), dec(100));
    }

    #[tokio::test]
    async fn test_entry_conserves_funding() {
        let pos = opened_position(1000, 300).await;
        // Commission is zero today, so cash + allocated == funding.
        assert_eq!(pos.total_balance(), dec(1000));
    }

    #[tokio::test]
    async fn test_accrual_never_touches_balances() {
        let mut store = InMemoryBarStore::new();
        store.insert("SPY", PriceBar::flat(date(2022, 1, 3), dec(300)));
        store.insert("SPY", PriceBar::flat(date(2022, 1, 4), dec(310)));

        let mut pos = opened_position(1000, 300).await;
        pos.set_date(date(2022, 1, 4));
        pos.mark_to_market(&store).await.unwrap();
        pos.accrue_pnl();

        // 3 shares * +10 move.
        assert_eq!(pos.latest_pnl(), dec(30));
        assert_eq!(pos.cash_balance(), dec(100));
        assert_eq!(pos.allocated_balance(), dec(900));
    }

    #[tokio::test]
    async fn test_short_side_inverts_pnl() {
        let mut store = InMemoryBarStore::new();
        store.insert("SPY", PriceBar::flat(date(2022, 1, 3), dec(300)));

        let mut pos = Position::new(
            "SPY",
            PositionSide::Short,
            Decimal::ONE,
            date(2022, 1, 3),
            "IB",
        );
        pos.mark_to_market(&store).await.unwrap();
        pos.set_entry_from_current();
        pos.deposit(dec(900));
        pos.enter_position();

        store.insert("SPY", PriceBar::flat(date(2022, 1, 4), dec(310)));
        pos.set_date(date(2022, 1, 4));
        pos.mark_to_market(&store).await.unwrap();
        pos.accrue_pnl();

        // Short 3 shares, price up 10 -> -30.
        assert_eq!(pos.latest_pnl(), dec(-30));
    }

    #[test]
    fn test_latest_pnl_defaults_to_zero() {
        let pos = Position::new(
            "SPY",
            PositionSide::Long,
            Decimal::ONE,
            date(2022, 1, 3),
            "IB",
        );
        assert_eq!(pos.latest_pnl(), Decimal::ZERO);
    }
}
