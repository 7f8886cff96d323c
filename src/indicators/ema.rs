// =============================================================================
// Exponential & Simple Moving Averages
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = value_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The first EMA value is seeded with the SMA of the first `period` values.
//
// All series in this module are bar-aligned: the output has the same length as
// the input, and positions inside the warm-up window hold `NaN`. Leading `NaN`s
// in the input are skipped, which lets an EMA run on top of another series
// that has its own warm-up (MACD signal line, smoothed Force Index).
// =============================================================================

/// Bar-aligned EMA of `values`.
///
/// # Edge cases
/// - `period == 0` => all `NaN`
/// - fewer than `period` finite values after the leading `NaN`s => all `NaN`
/// - a non-finite value after the seed stops the series; later bars stay `NaN`
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }

    let Some(start) = values.iter().position(|v| v.is_finite()) else {
        return out;
    };
    let seed_end = start + period;
    if seed_end > values.len() {
        return out;
    }

    let seed_window = &values[start..seed_end];
    if seed_window.iter().any(|v| !v.is_finite()) {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut prev = seed_window.iter().sum::<f64>() / period as f64;
    out[seed_end - 1] = prev;

    for i in seed_end..values.len() {
        let ema = values[i] * multiplier + prev * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        out[i] = ema;
        prev = ema;
    }

    out
}

/// Bar-aligned simple moving average. `NaN` until `period` finite values are
/// available in the trailing window.
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().all(|v| v.is_finite()) {
            out[i] = window.iter().sum::<f64>() / period as f64;
        }
    }

    out
}
