//! Integration tests for cross-component accounting properties.
//!
//! Full simulator runs over in-memory bar data, checking capital
//! conservation under flat prices, same-day close-funds-open ordering on
//! reversals, the per-strategy capital split, and PnL monotonicity on a
//! rising tape.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use backtester::{ConstantModel, FlipFlopModel, Simulator, SimulatorConfig, TradeAction};
use sim_core::{AssetClass, InMemoryBarStore, PriceBar, Signal, StrategyId};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

/// Flat bars for every day in a date range.
fn flat_store(tickers: &[&str], start: NaiveDate, end: NaiveDate, price: i64) -> InMemoryBarStore {
    let mut store = InMemoryBarStore::new();
    let mut day = start;
    while day <= end {
        for ticker in tickers {
            store.insert(ticker, PriceBar::flat(day, dec(price)));
        }
        day = day.succ_opt().unwrap();
    }
    store
}

fn month_config() -> SimulatorConfig {
    SimulatorConfig {
        starting_capital: dec(1_000_000),
        start_date: date(2022, 1, 3),
        end_date: date(2022, 1, 31),
        minimum_cash_percentage: Decimal::new(3, 2),
        max_single_security_pct: Decimal::new(5, 2),
        broker: "IB".to_string(),
        ..SimulatorConfig::default()
    }
}

/// With flat prices every PnL sample must equal starting capital: no price
/// movement means no gains, and no capital may leak through open/close
/// churn or allocation residues.
#[tokio::test]
async fn test_flat_prices_conserve_capital() {
    let store = flat_store(&["SPY", "GLD"], date(2022, 1, 1), date(2022, 1, 31), 150);
    let mut sim = Simulator::new(month_config(), Arc::new(store));
    sim.add_model(
        "flip",
        Box::new(FlipFlopModel::new()),
        AssetClass::Equity,
        vec!["SPY".to_string(), "GLD".to_string()],
        Decimal::ONE,
    )
    .unwrap();

    let report = sim.run().await.unwrap();
    for sample in &report.pnl_history {
        assert_eq!(*sample, dec(1_000_000));
    }
}

/// A reversal day books the close before the open, so the reopened side
/// is funded by the capital the close just freed.
#[tokio::test]
async fn test_close_funds_same_day_open() {
    let store = flat_store(&["SPY"], date(2022, 1, 1), date(2022, 1, 31), 100);
    let mut sim = Simulator::new(month_config(), Arc::new(store));
    sim.add_model(
        "flip",
        Box::new(FlipFlopModel::new()),
        AssetClass::Equity,
        vec!["SPY".to_string()],
        Decimal::ONE,
    )
    .unwrap();

    let report = sim.run().await.unwrap();
    let trades = &report.strategies[0].trades;
    assert!(trades.len() > 3);

    // After the initial open the journal strictly alternates close/open,
    // and every reversal lands both legs on the same session date.
    for pair in trades[1..].chunks(2) {
        if pair.len() == 2 {
            assert_eq!(pair[0].action, TradeAction::Close);
            assert_eq!(pair[1].action, TradeAction::Open);
            assert_eq!(pair[0].date, pair[1].date);
            assert_ne!(pair[0].side, pair[1].side);
        }
    }
}

/// Two strategies with split weights each get their slice and trade
/// independently within it.
#[tokio::test]
async fn test_two_strategies_split_capital() {
    let store = flat_store(&["SPY", "GLD"], date(2022, 1, 1), date(2022, 1, 31), 200);
    let mut sim = Simulator::new(month_config(), Arc::new(store));
    sim.add_model(
        "long_spy",
        Box::new(ConstantModel::new(Signal::Long)),
        AssetClass::Equity,
        vec!["SPY".to_string()],
        Decimal::new(5, 1),
    )
    .unwrap();
    sim.add_model(
        "short_gld",
        Box::new(ConstantModel::new(Signal::Short)),
        AssetClass::Equity,
        vec!["GLD".to_string()],
        Decimal::new(5, 1),
    )
    .unwrap();

    let report = sim.run().await.unwrap();
    assert_eq!(report.strategies.len(), 2);
    for strategy in &report.strategies {
        assert_eq!(strategy.trades.len(), 1);
        assert_eq!(strategy.trades[0].action, TradeAction::Open);
    }

    let spy = StrategyId::new(AssetClass::Equity, "long_spy");
    let gld = StrategyId::new(AssetClass::Equity, "short_gld");
    // 3% reserve on 1e6, then an even split: 485000 per strategy.
    assert_eq!(
        sim.allocator().portfolio(&spy).unwrap().total_balance(),
        dec(485_000)
    );
    assert_eq!(
        sim.allocator().portfolio(&gld).unwrap().total_balance(),
        dec(485_000)
    );
}

/// A rising tape must produce a rising account PnL series for a long-only
/// strategy, and the final sample must exceed starting capital.
#[tokio::test]
async fn test_long_strategy_gains_on_rising_prices() {
    let mut store = InMemoryBarStore::new();
    let mut day = date(2022, 1, 1);
    let mut price = 100;
    while day <= date(2022, 1, 31) {
        store.insert("SPY", PriceBar::flat(day, dec(price)));
        day = day.succ_opt().unwrap();
        price += 1;
    }

    let mut sim = Simulator::new(month_config(), Arc::new(store));
    sim.add_model(
        "hold",
        Box::new(ConstantModel::new(Signal::Long)),
        AssetClass::Equity,
        vec!["SPY".to_string()],
        Decimal::ONE,
    )
    .unwrap();

    let report = sim.run().await.unwrap();
    assert!(report.final_pnl() > dec(1_000_000));

    let samples = &report.pnl_history;
    for window in samples.windows(2) {
        assert!(window[1] >= window[0]);
    }
}
