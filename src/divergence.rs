// =============================================================================
// Divergence Detector
// =============================================================================
//
// Compares the last two swing extremes of price against the last two swing
// extremes of an oscillator inside a trailing lookback window.
//
//   Bearish  price makes a higher high while the oscillator makes a lower high
//   Bullish  price makes a lower low while the oscillator makes a higher low
//
// A divergence only counts when
//   - the two oscillator extremes are between `min_distance` and
//     `max_distance` bars apart (inclusive),
//   - the latest oscillator extreme sits inside the final `recency` bars,
//   - the price move is at least `min_price_change` and the oscillator move
//     at least `min_osc_change` (relative to the earlier extreme).
//
// A swing high is strictly greater than both immediate neighbours by more than
// the prominence threshold; the threshold is a fraction of the value range
// inside the window. Ties are never extremes.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::DivergenceSignal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceParams {
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    #[serde(default = "default_min_distance")]
    pub min_distance: usize,
    #[serde(default = "default_max_distance")]
    pub max_distance: usize,
    #[serde(default = "default_recency")]
    pub recency: usize,
    /// Minimum relative price move between the two extremes (0.01 = 1%).
    #[serde(default = "default_min_price_change")]
    pub min_price_change: f64,
    /// Minimum relative oscillator move between the two extremes.
    #[serde(default = "default_min_osc_change")]
    pub min_osc_change: f64,
    /// Peak prominence as a fraction of the price range in the window.
    #[serde(default = "default_price_prominence")]
    pub price_prominence: f64,
    /// Peak prominence as a fraction of the oscillator range in the window.
    #[serde(default = "default_osc_prominence")]
    pub osc_prominence: f64,
}

fn default_lookback() -> usize { 50 }
fn default_min_distance() -> usize { 20 }
fn default_max_distance() -> usize { 40 }
fn default_recency() -> usize { 10 }
fn default_min_price_change() -> f64 { 0.01 }
fn default_min_osc_change() -> f64 { 0.05 }
fn default_price_prominence() -> f64 { 0.01 }
fn default_osc_prominence() -> f64 { 0.02 }

impl Default for DivergenceParams {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            min_distance: default_min_distance(),
            max_distance: default_max_distance(),
            recency: default_recency(),
            min_price_change: default_min_price_change(),
            min_osc_change: default_min_osc_change(),
            price_prominence: default_price_prominence(),
            osc_prominence: default_osc_prominence(),
        }
    }
}

/// Which side of the swing we are looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Swing {
    High,
    Low,
}

/// A confirmed divergence and the position of its latest oscillator extreme.
struct Hit {
    signal: DivergenceSignal,
    osc_index: usize,
}

/// Detect a divergence between `price` and `oscillator`.
///
/// Both inputs are aligned by their last element and truncated to
/// `params.lookback` bars.
///
/// Returns `DivergenceSignal::None` when:
/// - either input is empty or the oscillator is entirely `NaN`
/// - fewer than two extremes exist on either side
/// - any distance, recency or magnitude condition fails
///
/// When both a bullish and a bearish divergence qualify, the one whose latest
/// oscillator extreme is more recent wins.
pub fn detect(price: &[f64], oscillator: &[f64], params: &DivergenceParams) -> DivergenceSignal {
    let w = params.lookback.min(price.len()).min(oscillator.len());
    if w < 3 {
        return DivergenceSignal::None;
    }

    let price = &price[price.len() - w..];
    let osc = &oscillator[oscillator.len() - w..];
    if osc.iter().all(|v| v.is_nan()) {
        return DivergenceSignal::None;
    }

    let bearish = check(price, osc, Swing::High, params);
    let bullish = check(price, osc, Swing::Low, params);

    match (bearish, bullish) {
        (Some(a), Some(b)) => {
            if a.osc_index >= b.osc_index {
                a.signal
            } else {
                b.signal
            }
        }
        (Some(hit), None) | (None, Some(hit)) => hit.signal,
        (None, None) => DivergenceSignal::None,
    }
}

fn check(price: &[f64], osc: &[f64], swing: Swing, params: &DivergenceParams) -> Option<Hit> {
    let w = price.len();
    let price_ext = extremes(price, swing, params.price_prominence);
    let osc_ext = extremes(osc, swing, params.osc_prominence);

    let [.., p1, p2] = price_ext.as_slice() else {
        return None;
    };
    let [.., o1, o2] = osc_ext.as_slice() else {
        return None;
    };
    let (p1, p2, o1, o2) = (*p1, *p2, *o1, *o2);

    let distance = o2 - o1;
    if distance < params.min_distance || distance > params.max_distance {
        return None;
    }
    if w - 1 - o2 >= params.recency {
        return None;
    }

    let (price_diverges, osc_diverges) = match swing {
        Swing::High => (price[p2] > price[p1], osc[o2] < osc[o1]),
        Swing::Low => (price[p2] < price[p1], osc[o2] > osc[o1]),
    };
    if !price_diverges || !osc_diverges {
        return None;
    }

    if relative_change(price[p1], price[p2]) < params.min_price_change
        || relative_change(osc[o1], osc[o2]) < params.min_osc_change
    {
        return None;
    }

    let signal = match swing {
        Swing::High => DivergenceSignal::Bearish,
        Swing::Low => DivergenceSignal::Bullish,
    };
    Some(Hit {
        signal,
        osc_index: o2,
    })
}

/// Indices of swing highs (or lows) in `values`, ascending.
fn extremes(values: &[f64], swing: Swing, prominence: f64) -> Vec<usize> {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return Vec::new();
    }
    let threshold = (hi - lo) * prominence.max(0.0);

    (1..values.len().saturating_sub(1))
        .filter(|&i| {
            let (prev, cur, next) = (values[i - 1], values[i], values[i + 1]);
            match swing {
                Swing::High => cur - prev > threshold && cur - next > threshold,
                Swing::Low => prev - cur > threshold && next - cur > threshold,
            }
        })
        .collect()
}

/// `|to - from| / |from|`, infinite when `from` is zero.
fn relative_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        f64::INFINITY
    } else {
        (to - from).abs() / from.abs()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    /// Flat baseline of `len` bars with spikes at the given positions.
    fn spikes(len: usize, base: f64, points: &[(usize, f64)]) -> Vec<f64> {
        let mut v = vec![base; len];
        for &(i, value) in points {
            v[i] = value;
        }
        v
    }

    fn bearish_pair(first: usize, second: usize) -> (Vec<f64>, Vec<f64>) {
        let price = spikes(50, 100.0, &[(first, 105.0), (second, 110.0)]);
        let osc = spikes(50, 0.0, &[(first, 10.0), (second, 8.0)]);
        (price, osc)
    }

    #[test]
    fn bearish_at_min_distance() {
        let (price, osc) = bearish_pair(25, 45);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::Bearish);
    }

    #[test]
    fn bearish_at_max_distance() {
        let (price, osc) = bearish_pair(5, 45);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::Bearish);
    }

    #[test]
    fn distance_above_max_is_none() {
        let (price, osc) = bearish_pair(4, 45);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::None);
    }

    #[test]
    fn distance_below_min_is_none() {
        let (price, osc) = bearish_pair(26, 45);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::None);
    }

    #[test]
    fn latest_peak_outside_recency_is_none() {
        // Bar 39 is the 11th bar from the end of a 50-bar window.
        let (price, osc) = bearish_pair(19, 39);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::None);

        let (price, osc) = bearish_pair(20, 40);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::Bearish);
    }

    #[test]
    fn bullish_on_troughs() {
        let price = spikes(50, 100.0, &[(22, 95.0), (44, 90.0)]);
        let osc = spikes(50, 0.0, &[(22, -10.0), (44, -8.0)]);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::Bullish);
    }

    #[test]
    fn small_oscillator_move_is_ignored() {
        let price = spikes(50, 100.0, &[(25, 105.0), (45, 110.0)]);
        // 2% lower high, below the 5% threshold.
        let osc = spikes(50, 0.0, &[(25, 10.0), (45, 9.8)]);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::None);
    }

    #[test]
    fn small_price_move_is_ignored() {
        let price = spikes(50, 100.0, &[(25, 105.0), (45, 105.5)]);
        let osc = spikes(50, 0.0, &[(25, 10.0), (45, 8.0)]);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::None);
    }

    #[test]
    fn most_recent_oscillator_extreme_wins() {
        let price = spikes(
            50,
            100.0,
            &[(22, 95.0), (25, 105.0), (42, 90.0), (45, 110.0)],
        );
        let osc = spikes(50, 0.0, &[(22, -10.0), (25, 10.0), (42, -8.0), (45, 8.0)]);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::Bearish);
    }

    #[test]
    fn ties_are_not_peaks() {
        let v = spikes(10, 0.0, &[(4, 5.0), (5, 5.0)]);
        assert!(extremes(&v, Swing::High, 0.0).is_empty());
    }

    #[test]
    fn all_nan_oscillator_is_none() {
        let (price, _) = bearish_pair(25, 45);
        let osc = vec![f64::NAN; 50];
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::None);
    }

    #[test]
    fn single_extreme_is_none() {
        let price = spikes(50, 100.0, &[(45, 110.0)]);
        let osc = spikes(50, 0.0, &[(45, 8.0)]);
        assert_eq!(detect(&price, &osc, &DivergenceParams::default()), DivergenceSignal::None);
    }

    #[test]
    fn windows_align_by_end() {
        // 30 extra leading bars on price only; the window is the last 50.
        let (mut price, osc) = bearish_pair(25, 45);
        let mut padded = vec![100.0; 30];
        padded.append(&mut price);
        assert_eq!(detect(&padded, &osc, &DivergenceParams::default()), DivergenceSignal::Bearish);
    }

    #[test]
    fn relative_change_zero_base_is_infinite() {
        assert!(relative_change(0.0, 1.0).is_infinite());
        assert!((relative_change(10.0, 8.0) - 0.2).abs() < 1e-12);
    }
}
