// =============================================================================
// Scan filters
// =============================================================================
//
// Every criterion is optional; an empty `FilterConfig` accepts every row.
// Set criteria are AND-ed, except the two Apgar thresholds which are OR-ed
// when both are present (a row qualifies as a buy setup or a sell setup).
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::types::DivergenceSignal;

use super::ScanResult;

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const MAX_APGAR: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendFilter {
    /// No constraint.
    Any,
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiExtreme {
    /// Either extreme.
    Any,
    Overbought,
    Oversold,
}

impl RsiExtreme {
    /// NaN is never extreme.
    fn accepts(self, rsi: f64) -> bool {
        let overbought = rsi >= RSI_OVERBOUGHT;
        let oversold = rsi <= RSI_OVERSOLD;
        match self {
            Self::Any => overbought || oversold,
            Self::Overbought => overbought,
            Self::Oversold => oversold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceFilter {
    /// Either direction.
    Any,
    Bullish,
    Bearish,
}

impl DivergenceFilter {
    fn accepts(self, signal: DivergenceSignal) -> bool {
        match self {
            Self::Any => signal != DivergenceSignal::None,
            Self::Bullish => signal == DivergenceSignal::Bullish,
            Self::Bearish => signal == DivergenceSignal::Bearish,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Price between the fast and slow EMA.
    pub value_zone_only: bool,
    /// Fast EMA above (bullish) or below (bearish) the slow EMA.
    pub ema_trend: Option<TrendFilter>,
    #[serde(rename = "above_ema_13")]
    pub above_ema_fast: Option<bool>,
    #[serde(rename = "above_ema_26")]
    pub above_ema_slow: Option<bool>,
    pub rsi_min: Option<f64>,
    pub rsi_max: Option<f64>,
    /// RSI at or beyond 70 (overbought) or 30 (oversold).
    pub rsi_extreme: Option<RsiExtreme>,
    pub macd_divergence: Option<DivergenceFilter>,
    pub rsi_divergence: Option<DivergenceFilter>,
    /// MACD line above (bullish) or below (bearish) its signal line.
    pub macd_signal: Option<TrendFilter>,
    pub min_volume: Option<f64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub change_min: Option<f64>,
    pub change_max: Option<f64>,
    pub min_apgar_score: Option<u8>,
    pub min_apgar_sell_score: Option<u8>,
}

impl FilterConfig {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Reject impossible or malformed criteria before any work is dispatched.
    pub fn validate(&self) -> Result<(), ScanError> {
        let numbers = [
            ("rsi_min", self.rsi_min),
            ("rsi_max", self.rsi_max),
            ("min_volume", self.min_volume),
            ("price_min", self.price_min),
            ("price_max", self.price_max),
            ("change_min", self.change_min),
            ("change_max", self.change_max),
        ];
        for (name, value) in numbers {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ScanError::InvalidFilter(format!("{name} must be a finite number")));
                }
            }
        }

        for (name, value) in [("rsi_min", self.rsi_min), ("rsi_max", self.rsi_max)] {
            if let Some(v) = value {
                if !(0.0..=100.0).contains(&v) {
                    return Err(ScanError::InvalidFilter(format!("{name} must be within [0, 100], got {v}")));
                }
            }
        }

        for (name, value) in [
            ("min_volume", self.min_volume),
            ("price_min", self.price_min),
            ("price_max", self.price_max),
        ] {
            if let Some(v) = value {
                if v < 0.0 {
                    return Err(ScanError::InvalidFilter(format!("{name} must not be negative, got {v}")));
                }
            }
        }

        for (name, min, max) in [
            ("rsi", self.rsi_min, self.rsi_max),
            ("price", self.price_min, self.price_max),
            ("change", self.change_min, self.change_max),
        ] {
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return Err(ScanError::InvalidFilter(format!("{name} min {lo} exceeds max {hi}")));
                }
            }
        }

        for (name, value) in [
            ("min_apgar_score", self.min_apgar_score),
            ("min_apgar_sell_score", self.min_apgar_sell_score),
        ] {
            if let Some(v) = value {
                if v > MAX_APGAR {
                    return Err(ScanError::InvalidFilter(format!("{name} must be at most {MAX_APGAR}, got {v}")));
                }
            }
        }

        Ok(())
    }

    /// Whether `row` satisfies every set criterion.
    pub fn matches(&self, row: &ScanResult) -> bool {
        if self.value_zone_only && !row.in_value_zone {
            return false;
        }
        if let Some(trend) = self.ema_trend {
            let bullish = row.ema_fast > row.ema_slow;
            let bearish = row.ema_fast < row.ema_slow;
            let ok = match trend {
                TrendFilter::Any => true,
                TrendFilter::Bullish => bullish,
                TrendFilter::Bearish => bearish,
            };
            if !ok {
                return false;
            }
        }
        if self.above_ema_fast.is_some_and(|want| row.above_ema_fast != want) {
            return false;
        }
        if self.above_ema_slow.is_some_and(|want| row.above_ema_slow != want) {
            return false;
        }

        // NaN fails every bound.
        if self.rsi_min.is_some_and(|lo| !(row.rsi >= lo)) {
            return false;
        }
        if self.rsi_max.is_some_and(|hi| !(row.rsi <= hi)) {
            return false;
        }
        if self.rsi_extreme.is_some_and(|e| !e.accepts(row.rsi)) {
            return false;
        }

        if self.macd_divergence.is_some_and(|f| !f.accepts(row.macd_divergence)) {
            return false;
        }
        if self.rsi_divergence.is_some_and(|f| !f.accepts(row.rsi_divergence)) {
            return false;
        }
        if let Some(direction) = self.macd_signal {
            let ok = match direction {
                TrendFilter::Any => true,
                TrendFilter::Bullish => row.macd > row.macd_signal,
                TrendFilter::Bearish => row.macd < row.macd_signal,
            };
            if !ok {
                return false;
            }
        }

        if self.min_volume.is_some_and(|v| (row.volume as f64) < v) {
            return false;
        }
        if self.price_min.is_some_and(|lo| !(row.price >= lo)) {
            return false;
        }
        if self.price_max.is_some_and(|hi| !(row.price <= hi)) {
            return false;
        }
        if self.change_min.is_some_and(|lo| !(row.change_pct >= lo)) {
            return false;
        }
        if self.change_max.is_some_and(|hi| !(row.change_pct <= hi)) {
            return false;
        }

        let buy_ok = self.min_apgar_score.map(|t| row.apgar_buy.total >= t);
        let sell_ok = self.min_apgar_sell_score.map(|t| row.apgar_sell.total >= t);
        match (buy_ok, sell_ok) {
            (Some(b), Some(s)) => b || s,
            (Some(b), None) => b,
            (None, Some(s)) => s,
            (None, None) => true,
        }
    }
}
