//! The pluggable signal-producer interface and two reference models.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use sim_core::{Result, Signal};

/// A strategy's signal producer.
///
/// The simulation loop sets the universe and dates, then calls [`run`]
/// once per session; the returned map carries one desired signal per
/// ticker the model has an opinion on. Models are plugged in by the
/// caller at registration time.
///
/// [`run`]: Model::run
#[async_trait]
pub trait Model: Send {
    /// Human-readable model name, used in logs.
    fn name(&self) -> &str;

    /// Restrict the model to a set of eligible tickers.
    fn set_universe(&mut self, universe: Vec<String>);

    /// Tell the model the first session of the run.
    fn set_start_date(&mut self, start: NaiveDate);

    /// Tell the model the active session.
    fn set_current_date(&mut self, date: NaiveDate);

    /// Produce this session's desired signal per ticker.
    async fn run(&mut self) -> Result<HashMap<String, Signal>>;
}

/// Flips every ticker between long and short on alternating sessions.
///
/// Exists to exercise the full open/close/reverse machinery; it starts
/// every ticker long on its first session.
#[derive(Debug, Default)]
pub struct FlipFlopModel {
    universe: Vec<String>,
    last: HashMap<String, Signal>,
}

impl FlipFlopModel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Model for FlipFlopModel {
    fn name(&self) -> &str {
        "flip_flop"
    }

    fn set_universe(&mut self, universe: Vec<String>) {
        self.universe = universe;
    }

    fn set_start_date(&mut self, _start: NaiveDate) {}

    fn set_current_date(&mut self, _date: NaiveDate) {}

    async fn run(&mut self) -> Result<HashMap<String, Signal>> {
        let mut signals = HashMap::new();
        for ticker in &self.universe {
            let next = match self.last.get(ticker) {
                Some(Signal::Long) => Signal::Short,
                _ => Signal::Long,
            };
            self.last.insert(ticker.clone(), next);
            signals.insert(ticker.clone(), next);
        }
        Ok(signals)
    }
}

/// Emits one fixed signal for the whole universe every session.
#[derive(Debug)]
pub struct ConstantModel {
    universe: Vec<String>,
    signal: Signal,
}

impl ConstantModel {
    pub fn new(signal: Signal) -> Self {
        Self {
            universe: Vec::new(),
            signal,
        }
    }
}

#[async_trait]
impl Model for ConstantModel {
    fn name(&self) -> &str {
        "constant"
    }

    fn set_universe(&mut self, universe: Vec<String>) {
        self.universe = universe;
    }

    fn set_start_date(&mut self, _start: NaiveDate) {}

    fn set_current_date(&mut self, _date: NaiveDate) {}

    async fn run(&mut self) -> Result<HashMap<String, Signal>> {
        Ok(self
            .universe
            .iter()
            .map(|ticker| (ticker.clone(), self.signal))
            .collect())
    }
}
