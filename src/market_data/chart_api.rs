// =============================================================================
// Chart API provider — Yahoo-style `v8/finance/chart` endpoint
// =============================================================================
//
// Response shape (only the parts we read):
//
//   { "chart": {
//       "result": [{
//         "timestamp": [unix seconds, ...],
//         "indicators": { "quote": [{ "open": [...], "high": [...],
//                                     "low": [...], "close": [...],
//                                     "volume": [...] }] }
//       }],
//       "error": null | { "code": "...", "description": "..." } } }
//
// Rows with a null in any OHLC column are holidays or halted sessions and are
// dropped before the series is built.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::ScanError;
use crate::types::{Bar, Interval, PriceSeries};

use super::MarketDataProvider;

/// Calendar slack added to every request window for holidays and gaps.
const RANGE_SLACK_DAYS: i64 = 10;

#[derive(Clone)]
pub struct ChartApiProvider {
    base_url: String,
    client: reqwest::Client,
}

impl ChartApiProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("impulse-scanner/1.0")
            .build()
            .context("failed to build HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "ChartApiProvider initialised");

        Ok(Self { base_url, client })
    }

    /// GET /v8/finance/chart/{symbol}
    #[instrument(skip(self), name = "chart_api::get_chart")]
    async fn get_chart(&self, symbol: &str, interval: Interval, lookback: usize) -> Result<PriceSeries> {
        let now = Utc::now().timestamp();
        let days = (lookback as f64 * interval.calendar_days_per_bar()).ceil() as i64 + RANGE_SLACK_DAYS;
        let period1 = now - days * 86_400;

        let query = [
            ("interval", interval.to_string()),
            ("period1", period1.to_string()),
            ("period2", now.to_string()),
        ];

        let resp = self
            .client
            .get(chart_url(&self.base_url, symbol))
            .query(&query)
            .send()
            .await
            .with_context(|| format!("GET chart for {symbol} failed"))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse chart response for {symbol}"))?;

        if !status.is_success() {
            anyhow::bail!("chart API returned {} for {}: {}", status, symbol, body);
        }

        let mut bars = parse_chart(&body)?;
        if bars.len() > lookback {
            bars.drain(..bars.len() - lookback);
        }

        debug!(symbol, interval = %interval, count = bars.len(), "chart fetched");
        Ok(PriceSeries::new(symbol, interval, bars))
    }
}

#[async_trait]
impl MarketDataProvider for ChartApiProvider {
    async fn fetch(&self, symbol: &str, interval: Interval, lookback: usize) -> Result<PriceSeries, ScanError> {
        self.get_chart(symbol, interval, lookback).await.map_err(|e| {
            warn!(symbol, interval = %interval, error = %e, "chart fetch failed");
            ScanError::DataUnavailable(format!("{e:#}"))
        })
    }
}

/// Chart endpoint for `symbol`. The symbol is percent-encoded as a single path
/// segment, so index tickers such as `^GSPC` go out as `%5EGSPC`.
fn chart_url(base_url: &str, symbol: &str) -> String {
    format!(
        "{}/v8/finance/chart/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(symbol)
    )
}

/// Extract bars from a chart response body, oldest first.
pub fn parse_chart(body: &Value) -> Result<Vec<Bar>> {
    let chart = body.get("chart").context("chart response has no `chart` object")?;

    if let Some(err) = chart.get("error").filter(|e| !e.is_null()) {
        let description = err
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        anyhow::bail!("chart API error: {description}");
    }

    let result = chart
        .get("result")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .context("chart response has no result")?;

    // A symbol with no trading history comes back without timestamps.
    let Some(timestamps) = result.get("timestamp").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let quote = result
        .pointer("/indicators/quote/0")
        .context("chart result has no quote block")?;
    let (open, high, low, close, volume) = (
        column(quote, "open")?,
        column(quote, "high")?,
        column(quote, "low")?,
        column(quote, "close")?,
        column(quote, "volume")?,
    );

    let mut bars = Vec::with_capacity(timestamps.len());
    let mut dropped = 0usize;
    for (i, ts) in timestamps.iter().enumerate() {
        let row = (
            ts.as_i64().and_then(|t| Utc.timestamp_opt(t, 0).single()),
            open.get(i).and_then(Value::as_f64),
            high.get(i).and_then(Value::as_f64),
            low.get(i).and_then(Value::as_f64),
            close.get(i).and_then(Value::as_f64),
        );
        match row {
            (Some(date), Some(o), Some(h), Some(l), Some(c)) => {
                let v = volume.get(i).and_then(Value::as_u64).unwrap_or(0);
                bars.push(Bar::new(date, o, h, l, c, v));
            }
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, "dropped chart rows with null prices");
    }
    Ok(bars)
}

fn column<'a>(quote: &'a Value, name: &str) -> Result<&'a Vec<Value>> {
    quote
        .get(name)
        .and_then(Value::as_array)
        .with_context(|| format!("quote block has no `{name}` column"))
}
