// =============================================================================
// Quote service — latest price with a short TTL
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::TtlCache;
use crate::error::ScanError;
use crate::scanner::universe::normalize;
use crate::types::Interval;

use super::MarketDataProvider;

/// Daily bars needed to derive a change versus the previous close.
const QUOTE_BARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub previous_close: Option<f64>,
    pub change_pct: Option<f64>,
    pub volume: u64,
    /// Date of the bar the price comes from.
    pub as_of: DateTime<Utc>,
}

pub struct QuoteService {
    provider: Arc<dyn MarketDataProvider>,
    cache: TtlCache<String, Quote>,
}

impl QuoteService {
    pub fn new(provider: Arc<dyn MarketDataProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            cache: TtlCache::new(ttl),
        }
    }

    /// Latest quote for `symbol`, served from cache while fresh.
    pub async fn quote(&self, symbol: &str) -> Result<Quote, ScanError> {
        let symbol = normalize(symbol);
        if let Some(q) = self.cache.get(&symbol) {
            return Ok(q);
        }

        let series = self.provider.fetch(&symbol, Interval::Daily, QUOTE_BARS).await?;
        let bars = series.bars();
        let Some(last) = bars.last() else {
            return Err(ScanError::DataUnavailable(format!("no quote for {symbol}")));
        };

        let previous_close = bars.len().checked_sub(2).map(|i| bars[i].close);
        let change_pct = previous_close
            .filter(|&prev| prev != 0.0)
            .map(|prev| (last.close - prev) / prev * 100.0);

        let quote = Quote {
            symbol: symbol.clone(),
            price: last.close,
            previous_close,
            change_pct,
            volume: last.volume,
            as_of: last.date,
        };
        debug!(symbol = %symbol, price = quote.price, "quote refreshed");
        self.cache.insert(symbol, quote.clone());
        Ok(quote)
    }

    pub fn cache(&self) -> &TtlCache<String, Quote> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockProvider;

    #[tokio::test]
    async fn quote_change_from_previous_close() {
        let provider = Arc::new(MockProvider::new().with_closes("AAPL", &[100.0, 102.0]));
        let service = QuoteService::new(provider, Duration::seconds(30));

        let q = service.quote(" aapl ").await.unwrap();
        assert_eq!(q.symbol, "AAPL");
        assert_eq!(q.price, 102.0);
        assert_eq!(q.previous_close, Some(100.0));
        assert!((q.change_pct.unwrap() - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn second_read_hits_cache() {
        let provider = Arc::new(MockProvider::new().with_closes("MSFT", &[400.0, 401.0]));
        let service = QuoteService::new(provider.clone(), Duration::seconds(30));

        service.quote("MSFT").await.unwrap();
        service.quote("MSFT").await.unwrap();
        assert_eq!(provider.calls("MSFT"), 1);
        assert_eq!(service.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn empty_history_is_unavailable() {
        let provider = Arc::new(MockProvider::new().with_empty("GONE"));
        let service = QuoteService::new(provider, Duration::seconds(30));
        assert!(matches!(service.quote("GONE").await, Err(ScanError::DataUnavailable(_))));
    }
}
