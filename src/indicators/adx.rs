// =============================================================================
// Average Directional Index (ADX) with +DI / -DI
// =============================================================================
//
// Calculation pipeline:
//   1. Compute +DM and -DM per bar.
//   2. Compute True Range (TR) per bar.
//   3. Apply Wilder's smoothing (period) to +DM, -DM, and TR.
//   4. +DI = smoothed(+DM) / smoothed(TR) * 100
//      -DI = smoothed(-DM) / smoothed(TR) * 100
//   5. DX  = |+DI - -DI| / (+DI + -DI) * 100
//   6. ADX = Wilder's smoothed average of DX over `period` bars.
//
// Bar alignment: DI values start on bar `period`, ADX on bar `2 * period - 1`.
// =============================================================================

use crate::types::Bar;

use super::atr::true_range;

/// Bar-aligned directional movement system. Warm-up positions are `NaN`.
#[derive(Debug, Clone, Default)]
pub struct Dmi {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

impl Dmi {
    fn empty(len: usize) -> Self {
        Self {
            adx: vec![f64::NAN; len],
            plus_di: vec![f64::NAN; len],
            minus_di: vec![f64::NAN; len],
        }
    }
}

/// Compute ADX, +DI and -DI for every bar.
///
/// # Edge cases
/// - `period == 0` => all `NaN`
/// - fewer than `period + 1` bars => all `NaN`
/// - fewer than `2 * period` bars => DI populated, ADX all `NaN`
/// - zero smoothed TR (no range at all) => DI 0, DX 0
/// - any non-finite intermediate stops every series from that bar on
pub fn dmi_series(bars: &[Bar], period: usize) -> Dmi {
    let n = bars.len();
    let mut out = Dmi::empty(n);
    if period == 0 || n < period + 1 {
        return out;
    }

    let period_f = period as f64;
    let tr = true_range(bars);

    // Directional movement for bar i (index 0 unused).
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;

        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let mut smooth_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut smooth_minus: f64 = minus_dm[1..=period].iter().sum();
    let mut smooth_tr: f64 = tr[1..=period].iter().sum();

    let mut dx = vec![f64::NAN; n];
    for i in period..n {
        if i > period {
            smooth_plus = smooth_plus - smooth_plus / period_f + plus_dm[i];
            smooth_minus = smooth_minus - smooth_minus / period_f + minus_dm[i];
            smooth_tr = smooth_tr - smooth_tr / period_f + tr[i];
        }

        let Some((pdi, mdi, d)) = directional_index(smooth_plus, smooth_minus, smooth_tr) else {
            return out;
        };
        out.plus_di[i] = pdi;
        out.minus_di[i] = mdi;
        dx[i] = d;
    }

    // ADX seed: SMA of the first `period` DX values.
    let seed_at = 2 * period - 1;
    if seed_at >= n {
        return out;
    }
    let mut adx = dx[period..=seed_at].iter().sum::<f64>() / period_f;
    if !adx.is_finite() {
        return out;
    }
    out.adx[seed_at] = adx;

    for i in (seed_at + 1)..n {
        adx = (adx * (period_f - 1.0) + dx[i]) / period_f;
        if !adx.is_finite() {
            break;
        }
        out.adx[i] = adx;
    }

    out
}

/// Derive `(+DI, -DI, DX)` from smoothed +DM, -DM and TR.
fn directional_index(smooth_plus: f64, smooth_minus: f64, smooth_tr: f64) -> Option<(f64, f64, f64)> {
    if smooth_tr == 0.0 {
        return Some((0.0, 0.0, 0.0));
    }

    let plus_di = smooth_plus / smooth_tr * 100.0;
    let minus_di = smooth_minus / smooth_tr * 100.0;
    let di_sum = plus_di + minus_di;

    let dx = if di_sum == 0.0 {
        0.0
    } else {
        (plus_di - minus_di).abs() / di_sum * 100.0
    };

    (plus_di.is_finite() && minus_di.is_finite() && dx.is_finite()).then_some((plus_di, minus_di, dx))
}
