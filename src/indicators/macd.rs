// =============================================================================
// Moving Average Convergence / Divergence (MACD)
// =============================================================================
//
//   line      = EMA_fast(close) - EMA_slow(close)
//   signal    = EMA_signal(line)
//   histogram = line - signal
//
// Bar alignment: the line starts on bar `slow - 1`, signal and histogram on bar
// `slow + signal - 2`.
// =============================================================================

use super::ema::ema_series;

#[derive(Debug, Clone, Default)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

/// Bar-aligned MACD. Positions inside the warm-up are `NaN`.
///
/// # Edge cases
/// - any period of zero => all `NaN`
/// - `fast >= slow` is accepted; the line is then simply the negated spread
pub fn macd_series(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let n = closes.len();
    if fast == 0 || slow == 0 || signal == 0 {
        return Macd {
            line: vec![f64::NAN; n],
            signal: vec![f64::NAN; n],
            hist: vec![f64::NAN; n],
        };
    }

    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);

    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&line, signal);
    let hist = line.iter().zip(&signal_line).map(|(l, s)| l - s).collect();

    Macd {
        line,
        signal: signal_line,
        hist,
    }
}
