//! Volatility baseline cache and hybrid Z-score
//!
//! The mean / standard deviation of the volatility index moves slowly, so it
//! is recomputed at most once per calendar date from the trailing daily
//! closes. Intraday Z-scores combine that cached baseline with the live
//! reading instead of refetching history every tick.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::VolatilityConfig;
use crate::error::EngineResult;
use crate::indicators::{self, round_to};
use crate::market::MarketDataStore;
use crate::Symbol;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityBaseline {
    pub mean: f64,
    pub std_dev: f64,
    pub cached_on: NaiveDate,
}

impl VolatilityBaseline {
    /// Z-score of a reading against this baseline, 0 when `std_dev` is 0
    pub fn z_score(&self, value: f64) -> f64 {
        z_score(value, self.mean, self.std_dev)
    }
}

fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 || !std_dev.is_finite() || !value.is_finite() {
        return 0.0;
    }
    round_to((value - mean) / std_dev, 2)
}

pub struct VolatilityCache {
    store: Arc<dyn MarketDataStore>,
    symbol: Symbol,
    config: VolatilityConfig,
    baseline: Option<VolatilityBaseline>,
    last_observed: f64,
}

impl VolatilityCache {
    pub fn new(store: Arc<dyn MarketDataStore>, symbol: Symbol, config: VolatilityConfig) -> Self {
        Self {
            store,
            symbol,
            config,
            baseline: None,
            last_observed: 0.0,
        }
    }

    pub fn baseline(&self) -> Option<&VolatilityBaseline> {
        self.baseline.as_ref()
    }

    /// Recompute the baseline unless one already exists for `today`.
    ///
    /// Returns `Ok(true)` only when a new baseline was stored. A stale
    /// baseline is dropped first, so with too few observations the cache
    /// stays empty and callers fall back to the uncached Z-score.
    pub async fn refresh_baseline_if_stale(&mut self, today: NaiveDate) -> EngineResult<bool> {
        if matches!(self.baseline, Some(b) if b.cached_on == today) {
            return Ok(false);
        }
        self.baseline = None;

        let closes = self.closes().await?;
        if closes.len() < self.config.min_observations {
            warn!(
                observations = closes.len(),
                required = self.config.min_observations,
                "Not enough volatility history for a baseline"
            );
            return Ok(false);
        }

        let Some((mean, std_dev)) = indicators::mean_std(&closes) else {
            warn!("Volatility history contains invalid values, baseline not cached");
            return Ok(false);
        };

        info!(
            mean = round_to(mean, 2),
            std_dev = round_to(std_dev, 2),
            observations = closes.len(),
            "Volatility baseline cached for {}",
            today
        );
        self.baseline = Some(VolatilityBaseline {
            mean,
            std_dev,
            cached_on: today,
        });
        Ok(true)
    }

    /// Z-score of the live reading against the cached baseline
    pub async fn hybrid_z_score(&self, live_volatility: f64) -> EngineResult<f64> {
        match &self.baseline {
            Some(baseline) => Ok(baseline.z_score(live_volatility)),
            None => {
                debug!("No volatility baseline cached, using uncached Z-score");
                self.uncached_z_score().await
            }
        }
    }

    /// Z-score of the latest stored close against the full trailing history
    pub async fn uncached_z_score(&self) -> EngineResult<f64> {
        let closes = self.closes().await?;
        if closes.len() < self.config.min_observations {
            return Ok(0.0);
        }

        let Some((mean, std_dev)) = indicators::mean_std(&closes) else {
            return Ok(0.0);
        };
        Ok(z_score(closes[closes.len() - 1], mean, std_dev))
    }

    /// Edge detector on the volatility level.
    ///
    /// True when the reading moved by more than `threshold` since the last
    /// reading that fired; that reading then becomes the new reference.
    pub fn significant_change(&mut self, current: f64, threshold: f64) -> bool {
        if !current.is_finite() {
            return false;
        }
        if (current - self.last_observed).abs() > threshold {
            self.last_observed = current;
            return true;
        }
        false
    }

    /// [`Self::significant_change`] with the configured threshold
    pub fn significant_change_default(&mut self, current: f64) -> bool {
        self.significant_change(current, self.config.change_threshold)
    }

    pub fn recommended_interval_ms(&self, z_score: f64) -> u64 {
        if z_score.abs() >= self.config.fast_z_threshold {
            self.config.fast_interval_ms
        } else {
            self.config.base_interval_ms
        }
    }

    async fn closes(&self) -> EngineResult<Vec<f64>> {
        Ok(self
            .store
            .daily_bars(&self.symbol, self.config.lookback_days)
            .await?
            .iter()
            .map(|c| c.close)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::HistoricalStore;
    use crate::Candle;
    use chrono::{Duration, TimeZone, Utc};

    fn cache_with(closes: &[f64]) -> VolatilityCache {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                datetime: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 0.0,
            })
            .collect();
        let store = HistoricalStore::new().with_series(Symbol::new("^VIX"), candles);
        VolatilityCache::new(Arc::new(store), Symbol::new("^VIX"), VolatilityConfig::default())
    }

    fn alternating(n: usize) -> Vec<f64> {
        (0..n).map(|i| if i % 2 == 0 { 18.0 } else { 22.0 }).collect()
    }

    #[tokio::test]
    async fn test_refresh_once_per_day() {
        let mut cache = cache_with(&alternating(40));
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(cache.refresh_baseline_if_stale(today).await.unwrap());
        assert!(!cache.refresh_baseline_if_stale(today).await.unwrap());

        let tomorrow = today.succ_opt().unwrap();
        assert!(cache.refresh_baseline_if_stale(tomorrow).await.unwrap());
        assert_eq!(cache.baseline().unwrap().cached_on, tomorrow);
    }

    #[tokio::test]
    async fn test_refresh_refuses_short_history() {
        let mut cache = cache_with(&alternating(19));
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(!cache.refresh_baseline_if_stale(today).await.unwrap());
        assert!(cache.baseline().is_none());
        assert_eq!(cache.uncached_z_score().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_hybrid_z_score_uses_baseline() {
        let mut cache = cache_with(&alternating(40));
        cache
            .refresh_baseline_if_stale(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .await
            .unwrap();
        let baseline = *cache.baseline().unwrap();
        assert!((baseline.mean - 20.0).abs() < 1e-9);

        let z = cache.hybrid_z_score(30.0).await.unwrap();
        let expected = round_to((30.0 - baseline.mean) / baseline.std_dev, 2);
        assert_eq!(z, expected);
        assert!(z > 2.0);
    }

    #[tokio::test]
    async fn test_hybrid_falls_back_to_uncached() {
        let mut closes = alternating(39);
        closes.push(30.0);
        let cache = cache_with(&closes);
        let uncached = cache.uncached_z_score().await.unwrap();
        assert!(uncached > 0.0);
        assert_eq!(cache.hybrid_z_score(99.0).await.unwrap(), uncached);
    }

    #[tokio::test]
    async fn test_flat_history_gives_zero_z() {
        let mut cache = cache_with(&[20.0; 30]);
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(cache.refresh_baseline_if_stale(today).await.unwrap());
        assert_eq!(cache.baseline().unwrap().std_dev, 0.0);
        assert_eq!(cache.hybrid_z_score(35.0).await.unwrap(), 0.0);
    }

    #[test]
    fn test_significant_change_edge_detector() {
        let mut cache = cache_with(&[]);
        assert!(cache.significant_change(20.0, 0.5));
        assert!(!cache.significant_change(20.4, 0.5));
        assert!(!cache.significant_change(20.5, 0.5));
        assert!(cache.significant_change(20.6, 0.5));
        assert!(!cache.significant_change(20.9, 0.5));
        assert!(cache.significant_change_default(19.0));
    }

    #[test]
    fn test_recommended_interval() {
        let cache = cache_with(&[]);
        assert_eq!(cache.recommended_interval_ms(1.5), 1000);
        assert_eq!(cache.recommended_interval_ms(-1.0), 1000);
        assert_eq!(cache.recommended_interval_ms(0.4), 5000);
    }
}
