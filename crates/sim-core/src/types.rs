//! Core types shared by the allocator, portfolios and the trade manager.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level trading category a strategy is registered under.
///
/// Only `Equity` is tradable today; the other classes exist so the registry
/// key shape matches the account structure, and registering a model under
/// them fails loudly instead of silently doing nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Options,
    Futures,
    OptionsOnFutures,
}

impl AssetClass {
    /// Whether positions can actually be opened for this class.
    pub fn is_tradable(&self) -> bool {
        matches!(self, AssetClass::Equity)
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetClass::Equity => "equity",
            AssetClass::Options => "options",
            AssetClass::Futures => "futures",
            AssetClass::OptionsOnFutures => "options_on_futures",
        };
        f.write_str(s)
    }
}

/// Direction of an open holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Signed multiplier applied to price moves: +1 for long, -1 for short.
    pub fn multiplier(&self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Desired exposure a model emits for one ticker on one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Want to be long.
    Long,
    /// Want to be short.
    Short,
    /// Want no exposure.
    Flat,
    /// Model had no usable data; leave holdings untouched.
    NoData,
}

impl Signal {
    /// The side a directional signal asks for, `None` for `Flat`/`NoData`.
    pub fn direction(&self) -> Option<PositionSide> {
        match self {
            Signal::Long => Some(PositionSide::Long),
            Signal::Short => Some(PositionSide::Short),
            Signal::Flat | Signal::NoData => None,
        }
    }

    /// Whether the signal agrees with an already-held side.
    pub fn matches(&self, side: PositionSide) -> bool {
        self.direction() == Some(side)
    }
}

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Session date of the bar.
    pub date: NaiveDate,
    /// Opening price.
    pub open: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Shares traded.
    pub volume: Decimal,
}

impl PriceBar {
    /// Build a flat bar where open == high == low == close.
    ///
    /// Convenient for tests and synthetic data where only the open matters.
    pub fn flat(date: NaiveDate, price: Decimal) -> Self {
        Self {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
        }
    }
}

/// Registry key addressing one strategy: asset class plus strategy name.
///
/// The capital allocator and the trade manager key their maps with the same
/// type, so their key shapes cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StrategyId {
    pub asset_class: AssetClass,
    pub name: String,
}

impl StrategyId {
    pub fn new(asset_class: AssetClass, name: impl Into<String>) -> Self {
        Self {
            asset_class,
            name: name.into(),
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset_class, self.name)
    }
}
