// =============================================================================
// Apgar Scorer
// =============================================================================
//
// Five components, each worth 0, 1 or 2 points, for a total between 0 and 10:
//
//   weekly impulse      against the side 0, with the side 1, blue 2
//   daily impulse       same as weekly
//   price vs value      beyond the band on the wrong side 0, inside 1,
//                       beyond the band on the right side 2
//   false breakout      none 0, failed break of the 10-bar extreme 1,
//                       close within 2% of the 10-bar extreme 2
//   perfection          number of timeframes (weekly, daily) where price,
//                       EMA slope and histogram slope all agree with the side
//
// A score passes when the total reaches the threshold (7) and no component is
// zero. Every component is written once for the buy side; the sell side goes
// through the same code with `Side::sign()` flipping the comparisons, so
// `impulse_points(c, Sell) == impulse_points(c.mirror(), Buy)`.
//
// Blue scores 2 on both sides. A "blue after red/green" bonus rule would also
// award 2, so it has no separate branch.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ScanError;
use crate::impulse;
use crate::indicators::{self, ema::sma_series, IndicatorConfig, IndicatorSet};
use crate::market_data::MarketDataProvider;
use crate::runtime_config::ScannerConfig;
use crate::types::{Bar, ImpulseColor, Interval, PriceSeries, Side};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApgarParams {
    /// SMA period defining the centre of the value zone.
    #[serde(default = "default_value_zone_period")]
    pub value_zone_period: usize,
    /// Half-width of the value zone as a fraction of the SMA.
    #[serde(default = "default_value_zone_band")]
    pub value_zone_band: f64,
    /// Bars before the current one used for the breakout extreme.
    #[serde(default = "default_breakout_window")]
    pub breakout_window: usize,
    /// Distance to the extreme that counts as "on the verge".
    #[serde(default = "default_verge_pct")]
    pub verge_pct: f64,
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: u8,
}

fn default_value_zone_period() -> usize { 20 }
fn default_value_zone_band() -> f64 { 0.05 }
fn default_breakout_window() -> usize { 10 }
fn default_verge_pct() -> f64 { 0.02 }
fn default_pass_threshold() -> u8 { 7 }

impl Default for ApgarParams {
    fn default() -> Self {
        Self {
            value_zone_period: default_value_zone_period(),
            value_zone_band: default_value_zone_band(),
            breakout_window: default_breakout_window(),
            verge_pct: default_verge_pct(),
            pass_threshold: default_pass_threshold(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApgarScore {
    pub weekly_impulse: u8,
    pub daily_impulse: u8,
    pub price_vs_value: u8,
    pub false_breakout: u8,
    pub perfection: u8,
    pub total: u8,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApgarScore {
    /// All-zero score carrying the failure reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    fn from_components(weekly: u8, daily: u8, value: u8, breakout: u8, perfection: u8, threshold: u8) -> Self {
        let parts = [weekly, daily, value, breakout, perfection];
        let total = parts.iter().sum();
        Self {
            weekly_impulse: weekly,
            daily_impulse: daily,
            price_vs_value: value,
            false_breakout: breakout,
            perfection,
            total,
            passed: total >= threshold && parts.iter().all(|&p| p > 0),
            error: None,
        }
    }
}

/// One timeframe's bars together with its computed indicators.
#[derive(Debug, Clone, Copy)]
pub struct Timeframe<'a> {
    pub series: &'a PriceSeries,
    pub indicators: &'a IndicatorSet,
}

// ── Components ──

/// Impulse points for the latest color.
pub fn impulse_points(color: ImpulseColor, side: Side) -> u8 {
    let with_side = match side {
        Side::Buy => ImpulseColor::Green,
        Side::Sell => ImpulseColor::Green.mirror(),
    };
    match color {
        ImpulseColor::Blue => 2,
        c if c == with_side => 1,
        _ => 0,
    }
}

/// Position of `close` relative to the `sma ± band` value zone. Buyers want
/// price below the zone, sellers above it. The band edges count as inside.
pub fn value_zone_points(close: f64, sma: f64, band: f64, side: Side) -> Result<u8, ScanError> {
    if !close.is_finite() || !sma.is_finite() || sma <= 0.0 {
        return Err(ScanError::ComputationError("value zone average unavailable".into()));
    }
    // Positive when price sits on the side's favourable side of the average.
    let discount = side.sign() * (sma - close) / sma;
    Ok(if discount > band {
        2
    } else if discount < -band {
        0
    } else {
        1
    })
}

/// False-breakout points on the latest bar against the extreme of the
/// `window` bars before it (10-bar low for buys, high for sells).
pub fn false_breakout_points(bars: &[Bar], window: usize, verge_pct: f64, side: Side) -> Result<u8, ScanError> {
    if window == 0 || bars.len() < window + 1 {
        return Err(ScanError::InsufficientHistory {
            have: bars.len(),
            need: window + 1,
        });
    }
    let Some((current, prior)) = bars[bars.len() - window - 1..].split_last() else {
        return Err(ScanError::ComputationError("breakout window is empty".into()));
    };

    let (extreme, pierced, closed_back) = match side {
        Side::Buy => {
            let low = prior.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            (low, current.low < low, current.close > low)
        }
        Side::Sell => {
            let high = prior.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            (high, current.high > high, current.close < high)
        }
    };
    if !extreme.is_finite() || extreme == 0.0 {
        return Err(ScanError::ComputationError("breakout extreme unavailable".into()));
    }

    let distance = (current.close - extreme).abs() / extreme.abs();
    Ok(if distance <= verge_pct {
        2
    } else if pierced && closed_back {
        1
    } else {
        0
    })
}

/// Whether close, EMA slope and histogram slope all agree with `side` on the
/// latest bar of `tf`.
pub fn is_perfect(tf: Timeframe<'_>, ema_period: usize, side: Side) -> bool {
    let Some(ema) = tf.indicators.ema(ema_period) else {
        return false;
    };
    let hist = &tf.indicators.macd_hist;
    let n = tf.series.len();
    if n < 2 || ema.len() != n || hist.len() != n {
        return false;
    }
    let Some(last) = tf.series.last() else {
        return false;
    };

    let s = side.sign();
    s * (last.close - ema[n - 1]) > 0.0
        && s * (ema[n - 1] - ema[n - 2]) > 0.0
        && s * (hist[n - 1] - hist[n - 2]) > 0.0
}

// ── Scoring ──

/// Score both timeframes for `side`.
///
/// Returns a failed score (all zeros, `error` set) when either indicator set is
/// degraded, either timeframe's latest bar is still inside an indicator
/// warm-up, or the daily series is too short for the value zone or breakout
/// window.
pub fn score_timeframes(
    weekly: Timeframe<'_>,
    daily: Timeframe<'_>,
    side: Side,
    indicator_config: &IndicatorConfig,
    params: &ApgarParams,
) -> ApgarScore {
    match try_score(weekly, daily, side, indicator_config, params) {
        Ok(score) => score,
        Err(e) => {
            debug!(symbol = %daily.series.symbol, side = %side, error = %e, "apgar score failed");
            ApgarScore::failed(e.to_string())
        }
    }
}

fn try_score(
    weekly: Timeframe<'_>,
    daily: Timeframe<'_>,
    side: Side,
    indicator_config: &IndicatorConfig,
    params: &ApgarParams,
) -> Result<ApgarScore, ScanError> {
    let ema_period = indicator_config.ema_fast;
    for tf in [weekly, daily] {
        if tf.indicators.degraded {
            return Err(ScanError::ComputationError(format!(
                "{} indicators degraded",
                tf.series.interval
            )));
        }
        if tf.series.is_empty() {
            return Err(ScanError::DataUnavailable(format!("no {} bars", tf.series.interval)));
        }
        // Warm-up fallbacks (a zero histogram reads as blue) are not evidence.
        if !tf.indicators.latest_reliable() {
            return Err(ScanError::InsufficientHistory {
                have: tf.series.len(),
                need: indicator_config.warmup_bars(),
            });
        }
    }

    let latest_color = |tf: Timeframe<'_>| {
        impulse::latest(tf.indicators, ema_period).unwrap_or(ImpulseColor::Blue)
    };
    let weekly_points = impulse_points(latest_color(weekly), side);
    let daily_points = impulse_points(latest_color(daily), side);

    let closes = daily.series.closes();
    let sma = sma_series(&closes, params.value_zone_period);
    let (Some(&close), Some(&centre)) = (closes.last(), sma.last()) else {
        return Err(ScanError::DataUnavailable("no daily bars".into()));
    };
    if centre.is_nan() {
        return Err(ScanError::InsufficientHistory {
            have: closes.len(),
            need: params.value_zone_period,
        });
    }
    let value_points = value_zone_points(close, centre, params.value_zone_band, side)?;

    let breakout_points = false_breakout_points(daily.series.bars(), params.breakout_window, params.verge_pct, side)?;

    let perfection = [weekly, daily]
        .into_iter()
        .filter(|&tf| is_perfect(tf, ema_period, side))
        .count() as u8;

    Ok(ApgarScore::from_components(
        weekly_points,
        daily_points,
        value_points,
        breakout_points,
        perfection,
        params.pass_threshold,
    ))
}

/// Score already-fetched series. Indicators are computed here.
pub fn score_series(weekly: &PriceSeries, daily: &PriceSeries, side: Side, config: &ScannerConfig) -> ApgarScore {
    let weekly_set = indicators::compute(weekly, &config.indicators);
    let daily_set = indicators::compute(daily, &config.indicators);
    score_timeframes(
        Timeframe {
            series: weekly,
            indicators: &weekly_set,
        },
        Timeframe {
            series: daily,
            indicators: &daily_set,
        },
        side,
        &config.indicators,
        &config.apgar,
    )
}

/// Fetch weekly and daily history for `symbol` and score it. Fetch failures
/// produce a failed score rather than an error.
pub async fn score(provider: &dyn MarketDataProvider, symbol: &str, side: Side, config: &ScannerConfig) -> ApgarScore {
    let daily = provider
        .fetch(symbol, Interval::Daily, config.daily_lookback())
        .await;
    let weekly = provider
        .fetch(symbol, Interval::Weekly, config.weekly_bars)
        .await;

    match (weekly, daily) {
        (Ok(weekly), Ok(daily)) => score_series(&weekly, &daily, side, config),
        (Err(e), _) | (_, Err(e)) => ApgarScore::failed(e.to_string()),
    }
}
