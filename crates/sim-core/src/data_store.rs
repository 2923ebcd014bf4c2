//! Market-data providers.
//!
//! The engine reads prices through the [`BarProvider`] trait: one daily bar
//! per (ticker, date). [`PgBarStore`] is the Postgres-backed production
//! implementation; [`InMemoryBarStore`] serves tests, examples and
//! benchmarks. Missing bars are handled by [`open_with_fallback`], which
//! walks backwards a bounded number of calendar days before giving up.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use dashmap::DashMap;
use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::PriceBar;

/// How many calendar days a price lookup may walk back when the requested
/// date has no bar (holiday gaps the calendar provider did not cover).
pub const MAX_LOOKBACK_DAYS: i64 = 5;

/// Source of daily price bars.
#[async_trait]
pub trait BarProvider: Send + Sync {
    /// The bar for `ticker` on `date`, or `None` if the day has no bar.
    async fn daily_bar(&self, ticker: &str, date: NaiveDate) -> Result<Option<PriceBar>>;
}

/// Opening price for `ticker` on `date`, falling back to the newest bar up
/// to [`MAX_LOOKBACK_DAYS`] calendar days earlier.
///
/// Exhausting the fallback window is fatal: the engine never substitutes a
/// made-up price.
pub async fn open_with_fallback(
    provider: &dyn BarProvider,
    ticker: &str,
    date: NaiveDate,
) -> Result<Decimal> {
    for back in 0..=MAX_LOOKBACK_DAYS {
        let probe = date - Duration::days(back);
        if let Some(bar) = provider.daily_bar(ticker, probe).await? {
            // A non-positive open is bad data; keep walking.
            if bar.open <= Decimal::ZERO {
                debug!(ticker, %probe, open = %bar.open, "ignoring bar with non-positive open");
                continue;
            }
            if back > 0 {
                debug!(ticker, %date, %probe, "no bar on session date, used prior bar");
            }
            return Ok(bar.open);
        }
    }

    Err(Error::PriceUnavailable {
        ticker: ticker.to_string(),
        date,
        lookback: MAX_LOOKBACK_DAYS,
    })
}

/// In-memory bar store keyed by (ticker, date).
#[derive(Debug, Default)]
pub struct InMemoryBarStore {
    bars: HashMap<(String, NaiveDate), PriceBar>,
}

impl InMemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one bar, replacing any existing bar for the same day.
    pub fn insert(&mut self, ticker: &str, bar: PriceBar) {
        self.bars.insert((ticker.to_string(), bar.date), bar);
    }

    /// Insert a flat bar per (date, price) pair for one ticker.
    pub fn insert_flat_series(&mut self, ticker: &str, series: &[(NaiveDate, Decimal)]) {
        for (date, price) in series {
            self.insert(ticker, PriceBar::flat(*date, *price));
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[async_trait]
impl BarProvider for InMemoryBarStore {
    async fn daily_bar(&self, ticker: &str, date: NaiveDate) -> Result<Option<PriceBar>> {
        Ok(self.bars.get(&(ticker.to_string(), date)).cloned())
    }
}

/// Daily-bar store backed by Postgres.
///
/// Fetched bars (and confirmed misses) are cached, so the repeated lookups
/// a backtest makes for the same (ticker, date) hit the database once.
pub struct PgBarStore {
    pool: PgPool,
    cache: DashMap<(String, NaiveDate), Option<PriceBar>>,
}

impl PgBarStore {
    /// Create a new store on an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: DashMap::new(),
        }
    }

    /// Insert a single daily bar.
    pub async fn insert_bar(&self, ticker: &str, bar: &PriceBar) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_bars (ticker, session_date, open, high, low, close, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (ticker, session_date) DO UPDATE SET
                open = EXCLUDED.open,
                high = EXCLUDED.high,
                low = EXCLUDED.low,
                close = EXCLUDED.close,
                volume = EXCLUDED.volume
            "#,
        )
        .bind(ticker)
        .bind(bar.date)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.volume)
        .execute(&self.pool)
        .await?;

        self.cache
            .insert((ticker.to_string(), bar.date), Some(bar.clone()));
        Ok(())
    }

    /// Insert multiple bars for one ticker. The first failed insert aborts
    /// the batch; a partial load must never be reported as success.
    pub async fn insert_bars_batch(&self, ticker: &str, bars: &[PriceBar]) -> Result<usize> {
        for bar in bars {
            self.insert_bar(ticker, bar).await?;
        }

        info!(ticker, count = bars.len(), "inserted daily bars");
        Ok(bars.len())
    }

    /// All bars for `ticker` in `[start, end]`, ascending by date.
    pub async fn query_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let rows = sqlx::query(
            r#"
            SELECT session_date, open, high, low, close, volume
            FROM daily_bars
            WHERE ticker = $1 AND session_date >= $2 AND session_date <= $3
            ORDER BY session_date
            "#,
        )
        .bind(ticker)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(bar_from_row).collect()
    }

    /// Warm the cache for every (ticker, session) pair a run will touch.
    pub async fn preload(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<usize> {
        let fetches = tickers
            .iter()
            .map(|ticker| self.query_range(ticker, start, end));
        let series = try_join_all(fetches).await?;

        let mut loaded = 0;
        for (ticker, bars) in tickers.iter().zip(series) {
            loaded += bars.len();
            for bar in bars {
                self.cache.insert((ticker.clone(), bar.date), Some(bar));
            }
        }

        info!(tickers = tickers.len(), bars = loaded, "preloaded bar cache");
        Ok(loaded)
    }
}

fn bar_from_row(row: &sqlx::postgres::PgRow) -> Result<PriceBar> {
    Ok(PriceBar {
        date: row.try_get("session_date")?,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
    })
}

#[async_trait]
impl BarProvider for PgBarStore {
    async fn daily_bar(&self, ticker: &str, date: NaiveDate) -> Result<Option<PriceBar>> {
        let key = (ticker.to_string(), date);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let row = sqlx::query(
            r#"
            SELECT session_date, open, high, low, close, volume
            FROM daily_bars
            WHERE ticker = $1 AND session_date = $2
            "#,
        )
        .bind(ticker)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        let bar = row.as_ref().map(bar_from_row).transpose()?;
        self.cache.insert(key, bar.clone());
        Ok(bar)
    }
}
