//! Look-ahead contamination tests for every indicator column and for the
//! feature builder.
//!
//! Method: compute on a truncated series (bars 0..100) and the full series
//! (bars 0..200). Values for bars 0..100 must match exactly in definedness
//! and numerically. Any difference means a value depends on future bars.

use chrono::{Duration, TimeZone, Utc};
use signalab_core::domain::Bar;
use signalab_core::indicators::{Indicator, IndicatorParams, IndicatorSet};
use signalab_core::{FeatureBuilder, LabelRule};

/// Deterministic pseudo-random walk (LCG) with realistic OHLCV variation.
fn make_test_bars(n: usize) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let mut price = 100.0;
    (0..n)
        .map(|i| {
            let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
            let change = ((seed % 200) as f64 - 100.0) * 0.05;
            price = (price + change).max(10.0);
            let open = price - 0.5;
            let close = price + 0.3;
            Bar {
                timestamp: base + Duration::hours(i as i64),
                open,
                high: open.max(close) + 2.0,
                low: open.min(close) - 2.0,
                close,
                volume: 1000 + (seed % 5000),
            }
        })
        .collect()
}

fn assert_no_lookahead(indicator: &dyn Indicator, full_bars: &[Bar], truncated_len: usize) {
    let truncated = indicator.compute(&full_bars[..truncated_len]);
    let full = indicator.compute(full_bars);
    assert_eq!(truncated.len(), truncated_len, "{}: truncated length", indicator.name());
    assert_eq!(full.len(), full_bars.len(), "{}: full length", indicator.name());

    for i in 0..truncated_len {
        match (truncated[i], full[i]) {
            (None, None) => {}
            (Some(t), Some(f)) => assert!(
                (t - f).abs() < 1e-10,
                "{}: look-ahead contamination at bar {i}: truncated={t}, full={f}",
                indicator.name()
            ),
            (t, f) => panic!(
                "{}: definedness mismatch at bar {i} (truncated={t:?}, full={f:?})",
                indicator.name()
            ),
        }
    }
}

#[test]
fn lookahead_reference_set() {
    let bars = make_test_bars(200);
    for (_, indicator) in IndicatorParams::default().indicators() {
        assert_no_lookahead(indicator.as_ref(), &bars, 100);
    }
}

#[test]
fn lookahead_short_periods() {
    let bars = make_test_bars(200);
    let params = IndicatorParams {
        rsi_period: 5,
        macd_fast: 3,
        macd_slow: 7,
        macd_signal: 4,
        bollinger_period: 6,
        bollinger_multiplier: 1.5,
        sma_short: 4,
        sma_long: 9,
        volatility_period: 5,
        volume_period: 3,
    };
    for (_, indicator) in params.indicators() {
        assert_no_lookahead(indicator.as_ref(), &bars, 100);
    }
}

#[test]
fn lookahead_truncation_at_every_length() {
    let bars = make_test_bars(120);
    let full = IndicatorSet::compute(&bars, &IndicatorParams::default());
    for cut in [1, 13, 14, 26, 34, 49, 50, 51, 119] {
        let truncated = IndicatorSet::compute(&bars[..cut], &IndicatorParams::default());
        for idx in 0..cut {
            assert_eq!(
                truncated.is_complete(idx),
                full.is_complete(idx),
                "completeness differs at bar {idx} with cut {cut}"
            );
        }
    }
}

/// Feature rows only see bars up to their own index. Labels look forward by
/// construction, so only rows whose horizon fits inside the truncated series
/// are compared.
#[test]
fn feature_rows_do_not_depend_on_future_bars() {
    let bars = make_test_bars(200);
    let params = IndicatorParams::default();
    let builder = FeatureBuilder::default();

    let full_set = IndicatorSet::compute(&bars, &params);
    let cut_set = IndicatorSet::compute(&bars[..100], &params);
    for idx in params.warmup()..100 {
        assert_eq!(
            builder.row(&bars[..100], &cut_set, idx),
            builder.row(&bars, &full_set, idx),
            "feature row {idx} changed when future bars were added"
        );
    }

    let rule = LabelRule::default();
    let cut_labels = rule.labels(&bars[..100]);
    let full_labels = rule.labels(&bars);
    for idx in 0..100 - rule.horizon {
        assert_eq!(cut_labels[idx], full_labels[idx]);
    }
}
