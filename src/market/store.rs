//! In-memory historical store backed by CSV files
//!
//! One file per symbol, `{data_dir}/{symbol}.csv` with the header
//! `datetime,open,high,low,close,volume`. A leading `^` in index symbols
//! (e.g. `^VIX`) is dropped from the file name.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::MarketDataStore;
use crate::error::{EngineError, EngineResult};
use crate::{Candle, Symbol};

#[derive(Debug, Clone, Default)]
pub struct HistoricalStore {
    series: HashMap<Symbol, Vec<Candle>>,
}

impl HistoricalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the daily series of a symbol, sorted oldest first
    pub fn with_series(mut self, symbol: Symbol, candles: Vec<Candle>) -> Self {
        self.insert(symbol, candles);
        self
    }

    pub fn insert(&mut self, symbol: Symbol, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.datetime);
        self.series.insert(symbol, candles);
    }

    /// Load every requested symbol from `data_dir`
    pub fn from_dir(data_dir: impl AsRef<Path>, symbols: &[Symbol]) -> Result<Self> {
        let mut store = Self::new();
        for symbol in symbols {
            let path = csv_path(data_dir.as_ref(), symbol);
            let candles = load_csv(&path)
                .with_context(|| format!("Failed to load {} from {}", symbol, path.display()))?;
            info!("Loaded {} daily bars for {}", candles.len(), symbol);
            store.insert(symbol.clone(), candles);
        }
        Ok(store)
    }

    /// Full series of a symbol, oldest first
    pub fn series(&self, symbol: &Symbol) -> Option<&[Candle]> {
        self.series.get(symbol).map(Vec::as_slice)
    }
}

#[async_trait]
impl MarketDataStore for HistoricalStore {
    async fn daily_bars(&self, symbol: &Symbol, days: usize) -> EngineResult<Vec<Candle>> {
        let candles = self
            .series
            .get(symbol)
            .ok_or_else(|| EngineError::Store(format!("no history for {}", symbol)))?;
        let start = candles.len().saturating_sub(days);
        Ok(candles[start..].to_vec())
    }
}

pub fn csv_path(data_dir: &Path, symbol: &Symbol) -> PathBuf {
    data_dir.join(format!("{}.csv", symbol.as_str().trim_start_matches('^')))
}

/// Load OHLCV candles from a CSV file, skipping invalid rows
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).context("Failed to open CSV file")?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = parse_datetime(dt_str)
            .with_context(|| format!("Failed to parse datetime: {}", dt_str))?;

        let mut fields = [0.0f64; 5];
        for (offset, (field, name)) in fields
            .iter_mut()
            .zip(["open", "high", "low", "close", "volume"])
            .enumerate()
        {
            *field = record
                .get(offset + 1)
                .with_context(|| format!("Missing {} column", name))?
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse {}", name))?;
        }
        let [open, high, low, close, volume] = fields;

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => warn!(
                "Skipping invalid candle at row {} in {:?}: {}",
                row_idx + 2,
                path.file_name().unwrap_or_default(),
                e
            ),
        }
    }

    Ok(candles)
}

/// RFC 3339, `%Y-%m-%d %H:%M:%S` or a bare date (all UTC)
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    s.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|ndt| ndt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::io::Write;

    fn bars(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                datetime: start + Duration::days(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1000.0,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_daily_bars_returns_trailing_window() {
        let store = HistoricalStore::new().with_series(Symbol::new("SPY"), bars(&[1.0, 2.0, 3.0, 4.0]));
        let tail = store.daily_bars(&Symbol::new("SPY"), 2).await.unwrap();
        assert_eq!(tail.iter().map(|c| c.close).collect::<Vec<_>>(), vec![3.0, 4.0]);
        let all = store.daily_bars(&Symbol::new("SPY"), 100).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_store_error() {
        let store = HistoricalStore::new();
        let err = store.daily_bars(&Symbol::new("SPY"), 10).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }

    #[tokio::test]
    async fn test_volatility_stats_default_impl() {
        let store = HistoricalStore::new().with_series(Symbol::new("^VIX"), bars(&[10.0, 20.0, 30.0]));
        let stats = store.volatility_stats(&Symbol::new("^VIX"), 126).await.unwrap();
        assert!((stats.mean - 20.0).abs() < 1e-9);
        assert!((stats.std - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_csv_skips_invalid_rows() {
        let dir = std::env::temp_dir().join(format!("regime_trader_store_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = csv_path(&dir, &Symbol::new("^VIX"));
        assert!(path.ends_with("VIX.csv"));

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "datetime,open,high,low,close,volume").unwrap();
        writeln!(file, "2024-01-02,13.0,14.0,12.5,13.5,0").unwrap();
        writeln!(file, "2024-01-03 00:00:00,13.5,13.0,14.0,13.6,0").unwrap();
        writeln!(file, "2024-01-04T00:00:00Z,13.6,15.0,13.0,14.8,0").unwrap();
        drop(file);

        let candles = load_csv(&path).unwrap();
        assert_eq!(candles.len(), 2);
        assert!((candles[1].close - 14.8).abs() < 1e-9);

        let store = HistoricalStore::from_dir(&dir, &[Symbol::new("^VIX")]).unwrap();
        assert_eq!(store.series(&Symbol::new("^VIX")).map(|s| s.len()), Some(2));
        std::fs::remove_dir_all(&dir).ok();
    }
}
