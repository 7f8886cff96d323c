// =============================================================================
// Indicator Adapter
// =============================================================================
//
// Turns a `PriceSeries` into a fixed-column `IndicatorSet`: every array has
// exactly one value per bar. Warm-up positions are replaced by documented
// fallback values and flagged in `unreliable`.
//
// Fallback policy:
//   EMA                     -> close of that bar
//   MACD / signal / hist    -> 0.0
//   RSI                     -> 50.0
//   Stochastic %K / %D      -> 50.0
//   ADX                     -> 25.0
//   +DI / -DI               -> 0.0
//   ATR                     -> high - low of that bar
//   Force Index             -> 0.0
//   OBV / A/D line          -> cumulative from bar 0, no warm-up
//
// The adapter never returns an error. A failure inside the computation
// (non-finite input, non-finite intermediate) degrades the whole set to the
// fallbacks with every bar marked unreliable.
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::types::{Bar, PriceSeries};

use super::{adx, atr, ema, macd, rsi, stochastic, volume};

/// No indicator is computed on fewer bars than this, whatever its window.
pub const MIN_HISTORY_FLOOR: usize = 14;

/// Bounds applied to the ADX, Stochastic and RSI periods.
pub const OSCILLATOR_PERIOD_MIN: usize = 1;
pub const OSCILLATOR_PERIOD_MAX: usize = 50;

pub const RSI_FALLBACK: f64 = 50.0;
pub const STOCH_FALLBACK: f64 = 50.0;
pub const ADX_FALLBACK: f64 = 25.0;
pub const DI_FALLBACK: f64 = 0.0;
pub const MACD_FALLBACK: f64 = 0.0;
pub const FORCE_FALLBACK: f64 = 0.0;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_force_index_window")]
    pub force_index_window: usize,
    #[serde(default = "default_period_14")]
    pub adx_period: usize,
    #[serde(default = "default_period_14")]
    pub stoch_period: usize,
    #[serde(default = "default_stoch_smooth")]
    pub stoch_smooth: usize,
    #[serde(default = "default_period_14")]
    pub rsi_period: usize,
    #[serde(default = "default_period_14")]
    pub atr_period: usize,
}

fn default_ema_fast() -> usize { 13 }
fn default_ema_slow() -> usize { 26 }
fn default_macd_fast() -> usize { 12 }
fn default_macd_slow() -> usize { 26 }
fn default_macd_signal() -> usize { 9 }
fn default_force_index_window() -> usize { 2 }
fn default_period_14() -> usize { 14 }
fn default_stoch_smooth() -> usize { 3 }

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: default_ema_fast(),
            ema_slow: default_ema_slow(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            force_index_window: default_force_index_window(),
            adx_period: default_period_14(),
            stoch_period: default_period_14(),
            stoch_smooth: default_stoch_smooth(),
            rsi_period: default_period_14(),
            atr_period: default_period_14(),
        }
    }
}

impl IndicatorConfig {
    /// Distinct EMA periods, ascending.
    pub fn ema_periods(&self) -> Vec<usize> {
        let mut periods = vec![self.ema_fast, self.ema_slow];
        periods.sort_unstable();
        periods.dedup();
        periods
    }

    pub fn adx_period(&self) -> usize {
        clamp_oscillator(self.adx_period)
    }

    pub fn stoch_period(&self) -> usize {
        clamp_oscillator(self.stoch_period)
    }

    pub fn rsi_period(&self) -> usize {
        clamp_oscillator(self.rsi_period)
    }

    fn macd_window(&self) -> usize {
        self.macd_fast.max(self.macd_slow) + self.macd_signal.saturating_sub(1)
    }

    fn stoch_window(&self) -> usize {
        self.stoch_period() + 2 * self.stoch_smooth.max(1) - 2
    }

    /// Bars needed before the latest bar is out of every warm-up.
    pub fn warmup_bars(&self) -> usize {
        [
            self.ema_fast.max(self.ema_slow),
            self.macd_window(),
            self.atr_period.max(1) + 1,
            2 * self.adx_period(),
            self.stoch_window(),
            self.rsi_period() + 1,
            self.force_index_window.max(1) + 1,
            MIN_HISTORY_FLOOR,
        ]
        .into_iter()
        .max()
        .unwrap_or(MIN_HISTORY_FLOOR)
    }
}

fn clamp_oscillator(period: usize) -> usize {
    period.clamp(OSCILLATOR_PERIOD_MIN, OSCILLATOR_PERIOD_MAX)
}

// =============================================================================
// IndicatorSet
// =============================================================================

/// Bar-aligned indicator columns for one series.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    pub emas: BTreeMap<usize, Vec<f64>>,
    pub macd: Vec<f64>,
    pub macd_signal: Vec<f64>,
    pub macd_hist: Vec<f64>,
    pub atr: Vec<f64>,
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
    pub stoch_k: Vec<f64>,
    pub stoch_d: Vec<f64>,
    pub rsi: Vec<f64>,
    pub obv: Vec<f64>,
    pub ad_line: Vec<f64>,
    pub force_index: Vec<f64>,
    pub unreliable: Vec<bool>,
    /// The computation failed and every column holds its fallback.
    pub degraded: bool,
}

impl IndicatorSet {
    pub fn len(&self) -> usize {
        self.unreliable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unreliable.is_empty()
    }

    /// Whether the latest bar is clear of every warm-up.
    pub fn latest_reliable(&self) -> bool {
        self.unreliable.last() == Some(&false)
    }

    /// EMA column for `period`, if that period was configured.
    pub fn ema(&self, period: usize) -> Option<&[f64]> {
        self.emas.get(&period).map(Vec::as_slice)
    }

    /// Every column at its fallback, every bar unreliable.
    fn fallback(bars: &[Bar], config: &IndicatorConfig) -> Self {
        let n = bars.len();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        Self {
            emas: config
                .ema_periods()
                .into_iter()
                .map(|p| (p, closes.clone()))
                .collect(),
            macd: vec![MACD_FALLBACK; n],
            macd_signal: vec![MACD_FALLBACK; n],
            macd_hist: vec![MACD_FALLBACK; n],
            atr: bars.iter().map(Bar::range).collect(),
            adx: vec![ADX_FALLBACK; n],
            plus_di: vec![DI_FALLBACK; n],
            minus_di: vec![DI_FALLBACK; n],
            stoch_k: vec![STOCH_FALLBACK; n],
            stoch_d: vec![STOCH_FALLBACK; n],
            rsi: vec![RSI_FALLBACK; n],
            obv: vec![0.0; n],
            ad_line: vec![0.0; n],
            force_index: vec![FORCE_FALLBACK; n],
            unreliable: vec![true; n],
            degraded: true,
        }
    }
}

// =============================================================================
// compute
// =============================================================================

/// Compute the full indicator set for `series`. Never fails.
pub fn compute(series: &PriceSeries, config: &IndicatorConfig) -> IndicatorSet {
    match try_compute(series.bars(), config) {
        Ok(set) => set,
        Err(e) => {
            warn!(symbol = %series.symbol, interval = %series.interval, error = %e, "indicator computation degraded to fallbacks");
            IndicatorSet::fallback(series.bars(), config)
        }
    }
}

/// Column builder that tracks which bars are still inside a warm-up.
struct Columns<'a> {
    bars: &'a [Bar],
    unreliable: Vec<bool>,
}

impl<'a> Columns<'a> {
    /// Whether an indicator that needs `window` bars may run at all.
    fn has_history(&self, window: usize) -> bool {
        self.bars.len() >= window.max(MIN_HISTORY_FLOOR)
    }

    /// Replace warm-up `NaN`s with `fallback(i)` and flag those bars. A column
    /// whose indicator was skipped is all fallback.
    fn fill(
        &mut self,
        name: &str,
        raw: Vec<f64>,
        window: usize,
        fallback: impl Fn(usize) -> f64,
    ) -> Result<Vec<f64>, ScanError> {
        if !self.has_history(window) {
            debug!(indicator = name, have = self.bars.len(), need = window.max(MIN_HISTORY_FLOOR), "indicator skipped, using fallback");
            self.unreliable.iter_mut().for_each(|u| *u = true);
            return Ok((0..self.bars.len()).map(fallback).collect());
        }

        let first = raw.iter().position(|v| v.is_finite());
        let Some(first) = first else {
            return Err(ScanError::ComputationError(format!("{name} produced no finite values")));
        };
        if raw[first..].iter().any(|v| !v.is_finite()) {
            return Err(ScanError::ComputationError(format!("{name} produced a non-finite value")));
        }

        self.unreliable[..first].iter_mut().for_each(|u| *u = true);
        Ok(raw
            .into_iter()
            .enumerate()
            .map(|(i, v)| if i < first { fallback(i) } else { v })
            .collect())
    }
}

fn try_compute(bars: &[Bar], config: &IndicatorConfig) -> Result<IndicatorSet, ScanError> {
    if let Some(i) = bars.iter().position(|b| !b.is_valid()) {
        return Err(ScanError::ComputationError(format!("bar {i} is not a valid finite OHLC bar")));
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mut cols = Columns {
        bars,
        unreliable: vec![false; bars.len()],
    };

    // ── Trend ──
    let mut emas = BTreeMap::new();
    for period in config.ema_periods() {
        let column = cols.fill("ema", ema::ema_series(&closes, period), period, |i| closes[i])?;
        emas.insert(period, column);
    }

    let m = macd::macd_series(&closes, config.macd_fast, config.macd_slow, config.macd_signal);
    let macd_window = config.macd_window();
    let macd_line = cols.fill("macd", m.line, macd_window, |_| MACD_FALLBACK)?;
    let macd_signal = cols.fill("macd_signal", m.signal, macd_window, |_| MACD_FALLBACK)?;
    let macd_hist = cols.fill("macd_hist", m.hist, macd_window, |_| MACD_FALLBACK)?;

    // ── Volatility & strength ──
    let atr_period = config.atr_period.max(1);
    let atr_col = cols.fill("atr", atr::atr_series(bars, atr_period), atr_period + 1, |i| bars[i].range())?;

    let adx_period = config.adx_period();
    let dmi = adx::dmi_series(bars, adx_period);
    let adx_col = cols.fill("adx", dmi.adx, 2 * adx_period, |_| ADX_FALLBACK)?;
    let plus_di = cols.fill("plus_di", dmi.plus_di, adx_period + 1, |_| DI_FALLBACK)?;
    let minus_di = cols.fill("minus_di", dmi.minus_di, adx_period + 1, |_| DI_FALLBACK)?;

    // ── Oscillators ──
    let stoch_period = config.stoch_period();
    let smooth = config.stoch_smooth.max(1);
    let stoch = stochastic::stochastic_series(bars, stoch_period, smooth);
    let stoch_window = config.stoch_window();
    let stoch_k = cols.fill("stoch_k", stoch.k, stoch_window, |_| STOCH_FALLBACK)?;
    let stoch_d = cols.fill("stoch_d", stoch.d, stoch_window, |_| STOCH_FALLBACK)?;

    let rsi_period = config.rsi_period();
    let rsi_col = cols.fill("rsi", rsi::rsi_series(&closes, rsi_period), rsi_period + 1, |_| RSI_FALLBACK)?;

    // ── Volume ──
    let force_window = config.force_index_window.max(1);
    let force = cols.fill(
        "force_index",
        volume::force_index_series(bars, force_window),
        force_window + 1,
        |_| FORCE_FALLBACK,
    )?;
    let obv = volume::obv_series(bars);
    let ad_line = volume::ad_line_series(bars);
    if obv.iter().chain(&ad_line).any(|v| !v.is_finite()) {
        return Err(ScanError::ComputationError("volume accumulation overflowed".into()));
    }

    Ok(IndicatorSet {
        emas,
        macd: macd_line,
        macd_signal,
        macd_hist,
        atr: atr_col,
        adx: adx_col,
        plus_di,
        minus_di,
        stoch_k,
        stoch_d,
        rsi: rsi_col,
        obv,
        ad_line,
        force_index: force,
        unreliable: cols.unreliable,
        degraded: false,
    })
}
