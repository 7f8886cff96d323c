// =============================================================================
// Impulse Classifier
// =============================================================================
//
// Per-bar agreement between trend (EMA slope) and momentum (MACD histogram
// slope):
//
//   slope[i]     = EMA[i]  - EMA[i-1]
//   histDelta[i] = hist[i] - hist[i-1]
//
//   green  slope > 0 and histDelta > 0
//   red    slope < 0 and histDelta < 0
//   blue   anything else, including bar 0 and any NaN
// =============================================================================

use crate::indicators::IndicatorSet;
use crate::types::ImpulseColor;

/// Classify every bar from an EMA column and a MACD histogram column.
///
/// The two slices are expected to be the same length; extra bars on the longer
/// one are ignored.
pub fn classify(ema: &[f64], hist: &[f64]) -> Vec<ImpulseColor> {
    let n = ema.len().min(hist.len());
    (0..n)
        .map(|i| match i {
            0 => ImpulseColor::Blue,
            _ => color_for(ema[i] - ema[i - 1], hist[i] - hist[i - 1]),
        })
        .collect()
}

/// Classify every bar of an indicator set using the EMA of `ema_period`.
/// An unconfigured period yields all blue.
pub fn classify_set(set: &IndicatorSet, ema_period: usize) -> Vec<ImpulseColor> {
    match set.ema(ema_period) {
        Some(ema) => classify(ema, &set.macd_hist),
        None => vec![ImpulseColor::Blue; set.len()],
    }
}

/// Color of the latest bar, if any.
pub fn latest(set: &IndicatorSet, ema_period: usize) -> Option<ImpulseColor> {
    classify_set(set, ema_period).last().copied()
}

/// NaN compares false both ways and falls through to blue.
fn color_for(slope: f64, hist_delta: f64) -> ImpulseColor {
    if slope > 0.0 && hist_delta > 0.0 {
        ImpulseColor::Green
    } else if slope < 0.0 && hist_delta < 0.0 {
        ImpulseColor::Red
    } else {
        ImpulseColor::Blue
    }
}
