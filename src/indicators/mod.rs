// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free full-series indicator functions. Every series is
// bar-aligned with its input; warm-up positions hold `NaN` until the adapter
// replaces them with documented fallbacks.

pub mod adapter;
pub mod adx;
pub mod atr;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod stochastic;
pub mod volume;

pub use adapter::{compute, IndicatorConfig, IndicatorSet};
