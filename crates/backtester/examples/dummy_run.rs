//! Run a flip-flop dummy strategy over synthetic SPY data and print the
//! resulting report.
//!
//! ```bash
//! cargo run -p backtester --example dummy_run
//! ```

use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use backtester::{FlipFlopModel, Simulator, SimulatorConfig};
use sim_core::{AssetClass, InMemoryBarStore, PriceBar};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let start = NaiveDate::from_ymd_opt(2022, 1, 1).context("valid date")?;
    let end = NaiveDate::from_ymd_opt(2022, 8, 20).context("valid date")?;

    // Synthetic tape: SPY drifts up a dime a day from 400.
    let mut store = InMemoryBarStore::new();
    let mut day = start;
    let mut price = Decimal::new(400, 0);
    while day <= end {
        store.insert("SPY", PriceBar::flat(day, price));
        price += Decimal::new(1, 1);
        day = day.succ_opt().unwrap_or(end);
    }

    let config = SimulatorConfig {
        starting_capital: Decimal::new(1_000_000, 0),
        start_date: start,
        end_date: end,
        minimum_cash_percentage: Decimal::new(3, 2),
        max_single_security_pct: Decimal::new(5, 1),
        broker: "IB".to_string(),
        ..SimulatorConfig::default()
    };

    let mut simulator = Simulator::new(config, Arc::new(store));
    simulator.add_model(
        "dummy",
        Box::new(FlipFlopModel::new()),
        AssetClass::Equity,
        vec!["SPY".to_string()],
        Decimal::ONE,
    )?;

    let mut report = simulator.run().await?;
    report.discard_warmup_sample();

    println!("sessions:  {}", report.sessions);
    println!("final pnl: {}", report.final_pnl());
    for strategy in &report.strategies {
        println!(
            "{}: {} trades, {} rejected opens",
            strategy.id,
            strategy.trades.len(),
            strategy.openings_failed
        );
    }

    Ok(())
}
