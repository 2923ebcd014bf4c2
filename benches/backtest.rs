//! Benchmarks for the simulation loop.

use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::runtime::Runtime;

use equisim::backtester::{FlipFlopModel, Simulator, SimulatorConfig};
use equisim::core::{AssetClass, InMemoryBarStore, PriceBar};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn synthetic_store(tickers: &[String], start: NaiveDate, end: NaiveDate) -> Arc<InMemoryBarStore> {
    let mut store = InMemoryBarStore::new();
    let mut day = start;
    let mut price = Decimal::new(100, 0);
    while day <= end {
        for ticker in tickers {
            store.insert(ticker, PriceBar::flat(day, price));
        }
        price += Decimal::new(5, 2);
        day = day.succ_opt().unwrap();
    }
    Arc::new(store)
}

fn build_simulator(universe: &[String], store: Arc<InMemoryBarStore>) -> Simulator {
    let config = SimulatorConfig {
        starting_capital: Decimal::new(1_000_000, 0),
        start_date: date(2022, 1, 3),
        end_date: date(2022, 12, 30),
        minimum_cash_percentage: Decimal::new(3, 2),
        max_single_security_pct: Decimal::new(5, 2),
        ..SimulatorConfig::default()
    };

    let mut simulator = Simulator::new(config, store);
    simulator
        .add_model(
            "flip",
            Box::new(FlipFlopModel::new()),
            AssetClass::Equity,
            universe.to_vec(),
            Decimal::ONE,
        )
        .unwrap();
    simulator
}

fn bench_full_year_run(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("full_year_run");

    for universe_size in [1usize, 5, 20] {
        let universe: Vec<String> = (0..universe_size).map(|i| format!("TKR{i}")).collect();
        let store = synthetic_store(&universe, date(2022, 1, 1), date(2022, 12, 31));

        group.bench_with_input(
            BenchmarkId::from_parameter(universe_size),
            &universe,
            |b, universe| {
                b.iter(|| {
                    let mut simulator = build_simulator(universe, Arc::clone(&store));
                    rt.block_on(simulator.run()).unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_full_year_run);
criterion_main!(benches);
