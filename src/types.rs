// =============================================================================
// Shared types used across the scanner
// =============================================================================

use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

// =============================================================================
// Bars & series
// =============================================================================

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(date: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// `low <= min(open, close) <= max(open, close) <= high`, all finite.
    pub fn is_valid(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite();
        finite
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
    }

    /// High minus low.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Daily and weekly bars are dated on sessions, never Saturday or Sunday.
    pub fn on_weekday(&self) -> bool {
        !matches!(self.date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// Sampling interval of a price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Daily,
    Weekly,
}

impl Interval {
    /// Approximate calendar days covered by one bar, used to size provider
    /// requests.
    pub fn calendar_days_per_bar(self) -> f64 {
        match self {
            // 252 sessions per 365 days.
            Self::Daily => 365.0 / 252.0,
            Self::Weekly => 7.0,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "1d"),
            Self::Weekly => write!(f, "1wk"),
        }
    }
}

/// Ordered, immutable bar series for one `(symbol, interval)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub interval: Interval,
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Build a series, dropping bars that violate the OHLC invariant, fall on
    /// a weekend, or are not strictly later than the previous accepted bar.
    pub fn new(symbol: impl Into<String>, interval: Interval, bars: Vec<Bar>) -> Self {
        let symbol = symbol.into();
        let mut accepted: Vec<Bar> = Vec::with_capacity(bars.len());
        let mut dropped = 0usize;

        for bar in bars {
            let in_order = accepted.last().map_or(true, |prev| bar.date > prev.date);
            if bar.is_valid() && bar.on_weekday() && in_order {
                accepted.push(bar);
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            warn!(symbol = %symbol, interval = %interval, dropped, "dropped invalid, weekend or out-of-order bars");
        }

        Self {
            symbol,
            interval,
            bars: accepted,
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

// =============================================================================
// Signal enums
// =============================================================================

/// Trade direction a score is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1.0 for buy, -1.0 for sell. Multiplying a signed move by this turns
    /// "agrees with the side" into "is positive".
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

impl Default for Side {
    fn default() -> Self {
        Self::Buy
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Per-bar trend + momentum agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpulseColor {
    Green,
    Red,
    Blue,
}

impl ImpulseColor {
    /// Swap green and red; blue is its own mirror.
    pub fn mirror(self) -> Self {
        match self {
            Self::Green => Self::Red,
            Self::Red => Self::Green,
            Self::Blue => Self::Blue,
        }
    }
}

impl Default for ImpulseColor {
    fn default() -> Self {
        Self::Blue
    }
}

impl std::fmt::Display for ImpulseColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Green => write!(f, "green"),
            Self::Red => write!(f, "red"),
            Self::Blue => write!(f, "blue"),
        }
    }
}

/// Verdict of a price-vs-oscillator divergence test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceSignal {
    None,
    Bullish,
    Bearish,
}

impl Default for DivergenceSignal {
    fn default() -> Self {
        Self::None
    }
}

impl std::fmt::Display for DivergenceSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
        }
    }
}
