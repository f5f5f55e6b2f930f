//! Indicator benchmarks for regime-trader
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use regime_trader::indicators::{adx_last, atr_last, efficiency_ratio, vwap_bands};

/// Deterministic zig-zag series with drift
fn series(count: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let closes: Vec<f64> = (0..count)
        .map(|i| 100.0 + i as f64 * 0.1 + ((i % 7) as f64 - 3.0) * 0.8)
        .collect();
    let highs = closes.iter().map(|c| c + 1.2).collect();
    let lows = closes.iter().map(|c| c - 1.1).collect();
    (highs, lows, closes)
}

fn benchmark_regime_indicators(c: &mut Criterion) {
    let (highs, lows, closes) = series(252);

    c.bench_function("efficiency_ratio_21", |b| {
        b.iter(|| efficiency_ratio(black_box(&closes[closes.len() - 21..])))
    });
    c.bench_function("adx_last_14", |b| {
        b.iter(|| adx_last(black_box(&highs), black_box(&lows), black_box(&closes), 14))
    });
    c.bench_function("atr_last_20", |b| {
        b.iter(|| atr_last(black_box(&highs), black_box(&lows), black_box(&closes), 20))
    });
}

fn benchmark_session_bands(c: &mut Criterion) {
    // One regular session of one-minute prints
    let (_, _, prices) = series(390);
    let volumes: Vec<f64> = (0..390).map(|i| 1000.0 + (i % 11) as f64 * 50.0).collect();

    c.bench_function("vwap_bands_390", |b| {
        b.iter(|| vwap_bands(black_box(&prices), black_box(&volumes), 2.0))
    });
}

criterion_group!(benches, benchmark_regime_indicators, benchmark_session_bands);
criterion_main!(benches);
