// =============================================================================
// Volume indicators: OBV, Accumulation/Distribution line, Force Index
// =============================================================================
//
// OBV and the A/D line are cumulative from bar 0 and have no warm-up.
//
//   OBV_t = OBV_{t-1} + sign(close_t - close_{t-1}) * volume_t
//   MFM_t = ((close - low) - (high - close)) / (high - low)     (0 when high == low)
//   AD_t  = AD_{t-1} + MFM_t * volume_t
//   FI_t  = EMA_window((close_t - close_{t-1}) * volume_t)
// =============================================================================

use crate::types::Bar;

use super::ema::ema_series;

/// On-balance volume. Bar 0 starts at 0.
pub fn obv_series(bars: &[Bar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    let mut total = 0.0;
    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev = bars[i - 1].close;
            let vol = bar.volume as f64;
            if bar.close > prev {
                total += vol;
            } else if bar.close < prev {
                total -= vol;
            }
        }
        out.push(total);
    }
    out
}

/// Accumulation / distribution line.
pub fn ad_line_series(bars: &[Bar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    let mut total = 0.0;
    for bar in bars {
        let range = bar.range();
        let mfm = if range == 0.0 {
            0.0
        } else {
            ((bar.close - bar.low) - (bar.high - bar.close)) / range
        };
        total += mfm * bar.volume as f64;
        out.push(total);
    }
    out
}

/// Force index smoothed by an EMA of `window`. Bar 0 has no previous close and
/// is `NaN`, so the first value lands on bar `window`.
pub fn force_index_series(bars: &[Bar], window: usize) -> Vec<f64> {
    let raw: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| match i {
            0 => f64::NAN,
            _ => (bar.close - bars[i - 1].close) * bar.volume as f64,
        })
        .collect();
    ema_series(&raw, window.max(1))
}
