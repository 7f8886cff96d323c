// =============================================================================
// Market data — provider abstraction
// =============================================================================
//
// The engine only talks to `MarketDataProvider`. `ChartApiProvider` is the
// HTTP implementation used by the binary; tests plug in an in-memory provider.

pub mod chart_api;
pub mod quote;

use async_trait::async_trait;

use crate::error::ScanError;
use crate::types::{Interval, PriceSeries};

pub use chart_api::ChartApiProvider;
pub use quote::QuoteService;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch up to `lookback` of the most recent bars of `symbol`.
    ///
    /// An empty series is a valid answer; callers decide whether that is a
    /// failure. Transport and upstream errors map to `DataUnavailable`.
    async fn fetch(&self, symbol: &str, interval: Interval, lookback: usize) -> Result<PriceSeries, ScanError>;
}
