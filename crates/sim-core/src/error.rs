//! Error types for the equisim engine.
//!
//! Every variant here marks a configuration or programming defect, not a
//! transient condition: errors are raised at the point of detection and
//! abort the run. There is no retry path.

use crate::types::AssetClass;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no strategy model was registered; add at least one before running")]
    NoStrategyRegistered,

    #[error("duplicate strategy name '{0}'; strategy names must be unique per asset class")]
    DuplicateStrategyName(String),

    #[error("security universe for strategy '{0}' is empty; set it before running")]
    UniverseNotSet(String),

    #[error("tried to close {0}, but no open position was found")]
    CloseTargetNotHeld(String),

    #[error("no usable price bar for {ticker} on or up to {lookback} days before {date}")]
    PriceUnavailable {
        ticker: String,
        date: NaiveDate,
        lookback: i64,
    },

    #[error("asset class '{0}' is not tradable yet")]
    UnsupportedAssetClass(AssetClass),

    #[error("no strategy '{name}' registered under asset class '{asset_class}'")]
    UnknownStrategy {
        asset_class: AssetClass,
        name: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
