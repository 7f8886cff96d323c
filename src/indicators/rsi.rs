// =============================================================================
// RSI — Wilder smoothing, one value per bar
// =============================================================================
//
// Gains and losses of the first `period` moves are averaged to seed; every
// later move updates each average as (avg * (period - 1) + move) / period.
// The value is 100 - 100 / (1 + gain_avg / loss_avg).
// =============================================================================

/// Bar-aligned RSI. The first RSI value lands on bar `period` (it consumes
/// `period` deltas); earlier bars are `NaN`.
///
/// # Edge cases
/// - `period == 0` or `closes.len() < period + 1` => all `NaN`
/// - no down moves => 100, no moves at all => 50
/// - a non-finite result stops the series
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    match rsi_from_averages(avg_gain, avg_loss) {
        Some(rsi) => out[period] = rsi,
        None => return out,
    }

    // deltas[i] is the move into bar i + 1.
    for (i, &delta) in deltas.iter().enumerate().skip(period) {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => out[i + 1] = rsi,
            None => break,
        }
    }

    out
}

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}
