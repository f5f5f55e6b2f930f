//! Technical indicators for regime classification and strategy signals
//!
//! Plain functions over price slices. Every function degrades to a neutral
//! value (0.0 or `None`) on insufficient or malformed input instead of
//! returning an error, so callers can run them inside a tick without
//! guarding each call.
//!
//! Available indicators:
//! - Averages: SMA tail, sample mean / standard deviation
//! - Volatility: True Range, ATR (Wilder)
//! - Trend: Kaufman efficiency ratio, DMI / ADX (Wilder)
//! - Volume: VWAP with volume-weighted deviation bands

use itertools::Itertools;
use statrs::statistics::Statistics;
use ta::indicators::SimpleMovingAverage;
use ta::Next;

// =============================================================================
// Helpers
// =============================================================================

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// =============================================================================
// Averages and Dispersion
// =============================================================================

/// Simple moving average of the trailing `period` values.
///
/// Returns `None` when fewer than `period` values are available.
pub fn sma_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let mut indicator = SimpleMovingAverage::new(period).ok()?;
    let mut last = 0.0;
    for &value in &values[values.len() - period..] {
        last = indicator.next(value);
    }
    Some(last)
}

/// Sample mean and sample standard deviation (n - 1 denominator)
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mean = values.mean();
    let std = values.std_dev();
    Some((mean, std))
}

// =============================================================================
// Volatility Indicators
// =============================================================================

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Wilder smoothing seeded with the SMA of the first `period` values
fn wilders_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = Vec::with_capacity(values.len());
    let mut smoothed: Option<f64> = None;

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else if i + 1 == period {
            let sum: f64 = values[0..period].iter().sum();
            smoothed = Some(sum / period as f64);
            result.push(smoothed);
        } else if let Some(prev) = smoothed {
            let new_val = (prev * (period - 1) as f64 + values[i]) / period as f64;
            smoothed = Some(new_val);
            result.push(smoothed);
        } else {
            result.push(None);
        }
    }

    result
}

/// Average True Range with Wilder's smoothing:
/// ATR = (prev_ATR * (period - 1) + current_TR) / period
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![];
    }

    wilders_smooth(&true_range(high, low, close), period)
}

/// Most recent ATR value, if the warmup period has elapsed
pub fn atr_last(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Option<f64> {
    atr(high, low, close, period).last().copied().flatten()
}

// =============================================================================
// Trend Indicators
// =============================================================================

/// Kaufman efficiency ratio of a close series.
///
/// `|last - first| / Σ|close[i] - close[i-1]|`. Zero when fewer than two
/// points are given or the path length is zero.
pub fn efficiency_ratio(closes: &[f64]) -> f64 {
    if closes.len() < 2 {
        return 0.0;
    }

    let path: f64 = closes
        .iter()
        .tuple_windows()
        .map(|(prev, next)| (next - prev).abs())
        .sum();
    if path <= 0.0 || !path.is_finite() {
        return 0.0;
    }

    let displacement = (closes[closes.len() - 1] - closes[0]).abs();
    displacement / path
}

/// Directional Movement Index components (+DI, -DI) using Wilder's smoothing
pub fn dmi(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    if high.is_empty() || period == 0 {
        return (vec![], vec![]);
    }

    let mut plus_dm = vec![0.0; high.len()];
    let mut minus_dm = vec![0.0; high.len()];

    for i in 1..high.len() {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];

        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let smoothed_plus_dm = wilders_smooth(&plus_dm, period);
    let smoothed_minus_dm = wilders_smooth(&minus_dm, period);
    let atr_values = atr(high, low, close, period);

    let mut plus_di = Vec::with_capacity(high.len());
    let mut minus_di = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        match (
            smoothed_plus_dm.get(i),
            smoothed_minus_dm.get(i),
            atr_values.get(i),
        ) {
            (Some(Some(pdm)), Some(Some(mdm)), Some(Some(atr_val))) if *atr_val > 0.0 => {
                plus_di.push(Some(pdm / atr_val * 100.0));
                minus_di.push(Some(mdm / atr_val * 100.0));
            }
            _ => {
                plus_di.push(None);
                minus_di.push(None);
            }
        }
    }

    (plus_di, minus_di)
}

/// Directional index series, one value per bar where both DIs are valid
fn dx_series(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let (plus_di, minus_di) = dmi(high, low, close, period);

    plus_di
        .into_iter()
        .zip(minus_di)
        .filter_map(|pair| match pair {
            (Some(pdi), Some(mdi)) => {
                let sum = pdi + mdi;
                Some(if sum > 0.0 {
                    (pdi - mdi).abs() / sum * 100.0
                } else {
                    0.0
                })
            }
            _ => None,
        })
        .collect()
}

/// Latest Average Directional Index value.
///
/// A fully smoothed ADX needs `2 * period - 1` bars. With shorter history
/// the mean of the available DX values is returned, and `None` only when
/// no DX value exists at all.
pub fn adx_last(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Option<f64> {
    if period == 0 || high.len() != low.len() || high.len() != close.len() {
        return None;
    }

    let dx = dx_series(high, low, close, period);
    if dx.is_empty() {
        return None;
    }

    if dx.len() < period {
        return Some(dx.iter().sum::<f64>() / dx.len() as f64);
    }

    wilders_smooth(&dx, period).last().copied().flatten()
}

// =============================================================================
// Volume Indicators
// =============================================================================

/// VWAP with symmetric volume-weighted standard deviation bands
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VwapBands {
    pub vwap: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Session VWAP and bands at `multiplier` volume-weighted deviations.
///
/// All-zero bands for empty or mismatched inputs, or zero total volume.
/// Values are rounded to cents.
pub fn vwap_bands(prices: &[f64], volumes: &[f64], multiplier: f64) -> VwapBands {
    if prices.is_empty() || prices.len() != volumes.len() {
        return VwapBands::default();
    }

    let total_volume: f64 = volumes.iter().sum();
    if total_volume <= 0.0 || !total_volume.is_finite() {
        return VwapBands::default();
    }

    let vwap = prices
        .iter()
        .zip(volumes)
        .map(|(p, v)| p * v)
        .sum::<f64>()
        / total_volume;

    let variance = prices
        .iter()
        .zip(volumes)
        .map(|(p, v)| v * (p - vwap).powi(2))
        .sum::<f64>()
        / total_volume;
    let deviation = variance.sqrt();

    VwapBands {
        vwap: round_to(vwap, 2),
        upper: round_to(vwap + multiplier * deviation, 2),
        lower: round_to(vwap - multiplier * deviation, 2),
    }
}

/// Intraday range as a fraction of the session low
pub fn session_range_pct(prices: &[f64]) -> f64 {
    let Some((low, high)) = prices.iter().copied().minmax().into_option() else {
        return 0.0;
    };
    if low <= 0.0 {
        return 0.0;
    }
    (high - low) / low
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_last() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((sma_last(&values, 3).unwrap() - 4.0).abs() < 0.001);
        assert!((sma_last(&values, 5).unwrap() - 3.0).abs() < 0.001);
        assert_eq!(sma_last(&values, 6), None);
        assert_eq!(sma_last(&values, 0), None);
    }

    #[test]
    fn test_mean_std_sample() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((mean - 5.0).abs() < 0.001);
        // Sample std (n - 1) of this classic set is ~2.138
        assert!((std - 2.138).abs() < 0.001);
        assert!(mean_std(&[1.0]).is_none());
    }

    #[test]
    fn test_atr_warmup() {
        let high = vec![10.0, 11.0, 12.0, 11.5, 12.5];
        let low = vec![9.0, 10.0, 11.0, 10.5, 11.5];
        let close = vec![9.5, 10.5, 11.5, 11.0, 12.0];
        let result = atr(&high, &low, &close, 3);
        assert_eq!(result[1], None);
        assert!(result[2].is_some());
        assert!(atr_last(&high, &low, &close, 3).unwrap() > 0.0);
    }

    #[test]
    fn test_efficiency_ratio_straight_line() {
        let closes: Vec<f64> = (0..10).map(|x| 100.0 + x as f64).collect();
        assert!((efficiency_ratio(&closes) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_efficiency_ratio_choppy() {
        let closes = vec![100.0, 101.0, 99.0, 102.0, 98.0, 100.0, 101.0, 99.0];
        // |99 - 100| / (1 + 2 + 3 + 4 + 2 + 1 + 2) = 1 / 15
        assert!((efficiency_ratio(&closes) - 1.0 / 15.0).abs() < 0.001);
    }

    #[test]
    fn test_efficiency_ratio_degenerate() {
        assert_eq!(efficiency_ratio(&[]), 0.0);
        assert_eq!(efficiency_ratio(&[100.0]), 0.0);
        assert_eq!(efficiency_ratio(&[100.0, 100.0, 100.0]), 0.0);
    }

    #[test]
    fn test_adx_strong_trend() {
        let high: Vec<f64> = (0..40).map(|x| 101.0 + x as f64).collect();
        let low: Vec<f64> = (0..40).map(|x| 99.0 + x as f64).collect();
        let close: Vec<f64> = (0..40).map(|x| 100.0 + x as f64).collect();
        let value = adx_last(&high, &low, &close, 14).unwrap();
        assert!(value > 25.0, "ADX of a one-way trend should be high, got {}", value);
    }

    #[test]
    fn test_adx_short_history_uses_partial_dx() {
        let high: Vec<f64> = (0..16).map(|x| 101.0 + x as f64).collect();
        let low: Vec<f64> = (0..16).map(|x| 99.0 + x as f64).collect();
        let close: Vec<f64> = (0..16).map(|x| 100.0 + x as f64).collect();
        assert!(adx_last(&high, &low, &close, 14).is_some());
        assert!(adx_last(&high[..10], &low[..10], &close[..10], 14).is_none());
    }

    #[test]
    fn test_vwap_bands() {
        let prices = vec![100.0, 101.0, 99.0, 102.0, 98.0, 100.0, 101.0, 99.0];
        let volumes = vec![1000.0, 1200.0, 800.0, 1500.0, 900.0, 1100.0, 1300.0, 950.0];
        let bands = vwap_bands(&prices, &volumes, 2.0);
        assert!(bands.vwap > 98.0 && bands.vwap < 102.0);
        assert!(bands.lower < bands.vwap && bands.vwap < bands.upper);
        assert!(((bands.upper - bands.vwap) - (bands.vwap - bands.lower)).abs() < 0.02);
    }

    #[test]
    fn test_vwap_bands_degenerate() {
        assert_eq!(vwap_bands(&[], &[], 2.0), VwapBands::default());
        assert_eq!(vwap_bands(&[100.0], &[1.0, 2.0], 2.0), VwapBands::default());
        assert_eq!(vwap_bands(&[100.0, 101.0], &[0.0, 0.0], 2.0), VwapBands::default());
    }

    #[test]
    fn test_session_range_pct() {
        assert!((session_range_pct(&[100.0, 105.0, 102.0]) - 0.05).abs() < 1e-9);
        assert_eq!(session_range_pct(&[]), 0.0);
    }
}
