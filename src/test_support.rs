// =============================================================================
// Test support — synthetic bars and an in-memory provider
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::error::ScanError;
use crate::market_data::MarketDataProvider;
use crate::types::{Bar, Interval, PriceSeries};

const BASE_VOLUME: u64 = 1_000_000;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 6, 0, 0, 0).unwrap()
}

/// Session dates from a Monday: daily bars skip weekends, weekly bars land
/// on each Monday.
fn bar_date(interval: Interval, i: usize) -> DateTime<Utc> {
    let i = i as i64;
    match interval {
        Interval::Daily => epoch() + chrono::Duration::weeks(i / 5) + chrono::Duration::days(i % 5),
        Interval::Weekly => epoch() + chrono::Duration::weeks(i),
    }
}

// ── Bars ──

/// A bar with a fixed date, for slice-level indicator tests.
pub fn candle(open: f64, high: f64, low: f64, close: f64) -> Bar {
    candle_with_volume(open, high, low, close, 100)
}

pub fn candle_with_volume(open: f64, high: f64, low: f64, close: f64, volume: u64) -> Bar {
    Bar::new(epoch(), open, high, low, close, volume)
}

// ── Series ──

/// Each bar opens at the previous close with a 0.5% wick on both sides.
pub fn series_from_closes(symbol: &str, interval: Interval, closes: &[f64]) -> PriceSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) * 1.005;
            let low = open.min(close) * 0.995;
            Bar::new(bar_date(interval, i), open, high, low, close, BASE_VOLUME)
        })
        .collect();
    PriceSeries::new(symbol, interval, bars)
}

/// Linear trend: close = start + step * i.
pub fn trending_series(symbol: &str, interval: Interval, n: usize, start: f64, step: f64) -> PriceSeries {
    let closes: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
    series_from_closes(symbol, interval, &closes)
}

/// Geometric trend: close = start * growth^i.
pub fn exponential_series(symbol: &str, interval: Interval, n: usize, start: f64, growth: f64) -> PriceSeries {
    let closes: Vec<f64> = (0..n).map(|i| start * growth.powi(i as i32)).collect();
    series_from_closes(symbol, interval, &closes)
}

/// Flat bars where open, high, low and close are all equal.
pub fn candle_series(symbol: &str, interval: Interval, closes: &[f64]) -> PriceSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::new(bar_date(interval, i), c, c, c, c, BASE_VOLUME))
        .collect();
    PriceSeries::new(symbol, interval, bars)
}

// =============================================================================
// MockProvider
// =============================================================================

struct Entry {
    daily: Result<PriceSeries, ScanError>,
    weekly: Result<PriceSeries, ScanError>,
    delay: Duration,
}

/// In-memory provider with per-symbol behaviour: a series, an empty answer,
/// an error, and an optional delay before answering.
#[derive(Default)]
pub struct MockProvider {
    entries: HashMap<String, Entry>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry(mut self, symbol: &str, daily: Result<PriceSeries, ScanError>, weekly: Result<PriceSeries, ScanError>) -> Self {
        self.entries.insert(
            symbol.to_string(),
            Entry {
                daily,
                weekly,
                delay: Duration::ZERO,
            },
        );
        self
    }

    pub fn with_series(self, symbol: &str, daily: PriceSeries, weekly: PriceSeries) -> Self {
        self.with_entry(symbol, Ok(daily), Ok(weekly))
    }

    /// 400 daily and 200 weekly bars of geometric growth.
    pub fn with_exponential(self, symbol: &str, start: f64, growth: f64) -> Self {
        let daily = exponential_series(symbol, Interval::Daily, 400, start, growth);
        let weekly = exponential_series(symbol, Interval::Weekly, 200, start, growth);
        self.with_series(symbol, daily, weekly)
    }

    /// `n` daily bars of a gentle uptrend; weekly gets the same shape.
    pub fn with_bars(self, symbol: &str, n: usize) -> Self {
        let daily = trending_series(symbol, Interval::Daily, n, 50.0, 0.25);
        let weekly = trending_series(symbol, Interval::Weekly, n.min(200), 50.0, 1.0);
        self.with_series(symbol, daily, weekly)
    }

    pub fn with_closes(self, symbol: &str, closes: &[f64]) -> Self {
        let daily = series_from_closes(symbol, Interval::Daily, closes);
        let weekly = series_from_closes(symbol, Interval::Weekly, closes);
        self.with_series(symbol, daily, weekly)
    }

    pub fn with_empty(self, symbol: &str) -> Self {
        let empty = |interval| PriceSeries::new(symbol, interval, Vec::new());
        self.with_series(symbol, empty(Interval::Daily), empty(Interval::Weekly))
    }

    pub fn with_error(self, symbol: &str, message: &str) -> Self {
        let err = ScanError::DataUnavailable(message.to_string());
        self.with_entry(symbol, Err(err.clone()), Err(err))
    }

    /// Keep the daily answer but fail the weekly fetch.
    pub fn with_weekly_error(mut self, symbol: &str, message: &str) -> Self {
        if let Some(entry) = self.entries.get_mut(symbol) {
            entry.weekly = Err(ScanError::DataUnavailable(message.to_string()));
        }
        self
    }

    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        if let Some(entry) = self.entries.get_mut(symbol) {
            entry.delay = delay;
        }
        self
    }

    /// Number of fetches made for `symbol`, any interval.
    pub fn calls(&self, symbol: &str) -> usize {
        self.calls.lock().get(symbol).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn fetch(&self, symbol: &str, interval: Interval, lookback: usize) -> Result<PriceSeries, ScanError> {
        *self.calls.lock().entry(symbol.to_string()).or_insert(0) += 1;

        let Some(entry) = self.entries.get(symbol) else {
            return Err(ScanError::DataUnavailable(format!("unknown symbol {symbol}")));
        };
        if !entry.delay.is_zero() {
            tokio::time::sleep(entry.delay).await;
        }

        let series = match interval {
            Interval::Daily => entry.daily.clone()?,
            Interval::Weekly => entry.weekly.clone()?,
        };
        let bars = series.bars();
        let tail = bars[bars.len().saturating_sub(lookback)..].to_vec();
        Ok(PriceSeries::new(symbol, interval, tail))
    }
}
