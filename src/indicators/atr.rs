// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
//   ATR_0   = SMA of first `period` TR values
//   ATR_t   = (ATR_{t-1} * (period - 1) + TR_t) / period
// =============================================================================

use crate::types::Bar;

/// True range per bar. Bar 0 has no previous close and uses `high - low`.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| match i {
            0 => bar.range(),
            _ => {
                let prev_close = bars[i - 1].close;
                bar.range()
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs())
            }
        })
        .collect()
}

/// Bar-aligned ATR. The seed lands on bar `period` (TR values from bars
/// `1..=period`); earlier bars are `NaN`.
///
/// # Edge cases
/// - `period == 0` or fewer than `period + 1` bars => all `NaN`
/// - a non-finite intermediate stops the series
pub fn atr_series(bars: &[Bar], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; bars.len()];
    if period == 0 || bars.len() < period + 1 {
        return out;
    }

    let tr = true_range(bars);
    let period_f = period as f64;

    let seed = tr[1..=period].iter().sum::<f64>() / period_f;
    if !seed.is_finite() {
        return out;
    }
    out[period] = seed;

    let mut atr = seed;
    for i in (period + 1)..bars.len() {
        atr = (atr * (period_f - 1.0) + tr[i]) / period_f;
        if !atr.is_finite() {
            break;
        }
        out[i] = atr;
    }

    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::candle;

    #[test]
    fn atr_period_zero() {
        let bars = vec![candle(10.0, 12.0, 8.0, 11.0); 20];
        assert!(atr_series(&bars, 0).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn atr_insufficient_data() {
        let bars = vec![candle(10.0, 12.0, 8.0, 11.0); 14];
        assert!(atr_series(&bars, 14).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn atr_constant_range() {
        // Identical bars: TR = H - L = 4 on every bar.
        let bars = vec![candle(10.0, 12.0, 8.0, 10.0); 30];
        let atr = atr_series(&bars, 14);
        assert!(atr[13].is_nan());
        for &v in &atr[14..] {
            assert!((v - 4.0).abs() < 1e-10, "expected 4.0, got {v}");
        }
    }

    #[test]
    fn true_range_uses_gap() {
        let bars = vec![candle(10.0, 11.0, 9.0, 10.0), candle(15.0, 16.0, 14.0, 15.0)];
        let tr = true_range(&bars);
        assert!((tr[0] - 2.0).abs() < 1e-10);
        // |16 - 10| dominates the 2-point bar range.
        assert!((tr[1] - 6.0).abs() < 1e-10);
    }
}
