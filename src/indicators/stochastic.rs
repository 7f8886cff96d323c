// =============================================================================
// Slow Stochastic Oscillator
// =============================================================================
//
//   raw %K = 100 * (close - lowest_low(period)) / (highest_high(period) - lowest_low(period))
//   %K     = SMA(raw %K, smooth)
//   %D     = SMA(%K, smooth)
//
// A zero-width window (highest high == lowest low) reads as 50.
// =============================================================================

use crate::types::Bar;

use super::ema::sma_series;

#[derive(Debug, Clone, Default)]
pub struct Stochastic {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// Bar-aligned slow stochastic. `%K` starts on bar `period + smooth - 2`,
/// `%D` on bar `period + 2 * smooth - 3`.
pub fn stochastic_series(bars: &[Bar], period: usize, smooth: usize) -> Stochastic {
    let n = bars.len();
    let mut raw = vec![f64::NAN; n];

    if period > 0 && n >= period {
        for i in (period - 1)..n {
            let window = &bars[i + 1 - period..=i];
            let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let width = highest - lowest;

            raw[i] = if width == 0.0 {
                50.0
            } else {
                100.0 * (bars[i].close - lowest) / width
            };
        }
    }

    let smooth = smooth.max(1);
    let k = sma_series(&raw, smooth);
    let d = sma_series(&k, smooth);
    Stochastic { k, d }
}
