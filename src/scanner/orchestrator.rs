// =============================================================================
// Scan Orchestrator — bounded fan-out over a symbol universe
// =============================================================================
//
// Batch lifecycle:  idle → running → aggregating → complete
// Task lifecycle:   pending → fetching → computing → done | skipped(reason)
//
// Workers share nothing but the provider, the config and the progress
// counters. Each returns an independent row; the coordinating task collects
// them, writes the row cache and snapshot, then filters, sorts and caps.
// A failing symbol never fails the batch. There are no retries.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::apgar::{self, ApgarScore, Timeframe};
use crate::cache::snapshot::RowKey;
use crate::cache::{ScanSnapshot, TtlCache};
use crate::divergence;
use crate::error::ScanError;
use crate::impulse;
use crate::indicators::{self, IndicatorSet};
use crate::market_data::MarketDataProvider;
use crate::runtime_config::ScannerConfig;
use crate::types::{ImpulseColor, Interval, PriceSeries, Side};

use super::{ranking, universe, ScanOutcome, ScanProgress, ScanRequest, ScanResult, ScanState, SkippedSymbol};

pub struct Scanner {
    provider: Arc<dyn MarketDataProvider>,
    config: Arc<ScannerConfig>,
    row_cache: Arc<TtlCache<RowKey, ScanResult>>,
    progress: Arc<ScanProgress>,
}

impl Scanner {
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: Arc<ScannerConfig>) -> Self {
        let row_cache = Arc::new(TtlCache::new(config.scan_ttl()));
        Self {
            provider,
            config,
            row_cache,
            progress: Arc::new(ScanProgress::new()),
        }
    }

    pub fn progress(&self) -> &ScanProgress {
        &self.progress
    }

    pub fn row_cache(&self) -> &TtlCache<RowKey, ScanResult> {
        &self.row_cache
    }

    /// Run one batch.
    ///
    /// # Errors
    /// Only request-level errors (`InvalidFilter`, `UnknownUniverse`), raised
    /// before any symbol is dispatched. Per-symbol failures land in
    /// `ScanOutcome::skipped`.
    pub async fn scan(&self, request: ScanRequest) -> Result<ScanOutcome, ScanError> {
        request.filters.validate()?;
        let resolved = universe::resolve(&request.universes, &request.symbols, &self.config)?;

        let sampled = request.random_sample.is_some();
        let symbols = match request.random_sample {
            Some(n) => ranking::sample(&resolved.symbols, n, request.seed),
            None => resolved.symbols,
        };

        let scan_id = Uuid::new_v4().to_string();
        let batch_timestamp = Utc::now();
        self.progress.begin(symbols.len());
        info!(
            scan_id = %scan_id,
            symbols = symbols.len(),
            sampled,
            force_refresh = request.force_refresh,
            "scan started"
        );

        // ── Row cache ──
        let requested = symbols.len();
        let mut rows = Vec::with_capacity(requested);
        let mut pending = Vec::new();
        for symbol in symbols {
            let cached = if request.force_refresh {
                None
            } else {
                self.row_cache.get(&(symbol.clone(), Interval::Daily))
            };
            match cached {
                Some(row) => {
                    self.progress.record_done();
                    rows.push(row);
                }
                None => pending.push(symbol),
            }
        }
        let from_cache = rows.len();

        // ── Dispatch ──
        let (fresh, mut skipped) = self.dispatch(pending, batch_timestamp).await;

        // ── Aggregate ──
        self.progress.set_state(ScanState::Aggregating);
        for row in &fresh {
            self.row_cache
                .insert_at((row.symbol.clone(), Interval::Daily), row.clone(), batch_timestamp);
        }
        let computed = fresh.len();
        rows.extend(fresh);
        skipped.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let mut outcome = ScanOutcome {
            scan_id,
            batch_timestamp,
            requested,
            rows: Vec::new(),
            skipped,
            from_cache,
            sampled,
            universe_counts: resolved.universe_counts,
        };

        if computed > 0 {
            let snapshot = ScanSnapshot::new(&outcome, rows.clone());
            if let Err(e) = snapshot.save(&self.config.snapshot_path) {
                warn!(error = %e, path = %self.config.snapshot_path.display(), "failed to persist scan snapshot");
            }
        }

        if !sampled {
            rows.retain(|row| request.filters.matches(row));
        }
        ranking::sort_rows(&mut rows, request.sort, request.seed);
        rows.truncate(request.limit.unwrap_or(self.config.default_limit));
        outcome.rows = rows;

        self.progress.set_state(ScanState::Complete);
        info!(
            scan_id = %outcome.scan_id,
            rows = outcome.rows.len(),
            computed,
            from_cache,
            skipped = outcome.skipped.len(),
            "scan complete"
        );
        Ok(outcome)
    }

    /// Analyse `symbols` on the bounded pool and collect rows and skips.
    async fn dispatch(&self, symbols: Vec<String>, as_of: DateTime<Utc>) -> (Vec<ScanResult>, Vec<SkippedSymbol>) {
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let task_timeout = self.config.task_timeout();
        let mut outstanding: HashSet<String> = symbols.iter().cloned().collect();
        let mut tasks = JoinSet::new();

        for symbol in symbols {
            let permits = Arc::clone(&permits);
            let provider = Arc::clone(&self.provider);
            let config = Arc::clone(&self.config);

            tasks.spawn(async move {
                debug!(symbol = %symbol, state = "pending");
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let err = ScanError::ComputationError("worker pool closed".into());
                        return (symbol, Err(err));
                    }
                };
                let result = tokio::time::timeout(
                    task_timeout,
                    analyze_symbol(provider.as_ref(), &symbol, &config, as_of),
                )
                .await
                .unwrap_or(Err(ScanError::Timeout));
                (symbol, result)
            });
        }

        let mut rows = Vec::new();
        let mut skipped = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, Ok(row))) => {
                    outstanding.remove(&symbol);
                    debug!(symbol = %symbol, state = "done");
                    self.progress.record_done();
                    rows.push(row);
                }
                Ok((symbol, Err(e))) => {
                    outstanding.remove(&symbol);
                    warn!(symbol = %symbol, state = "skipped", kind = e.kind(), error = %e, "symbol skipped");
                    self.progress.record_skipped();
                    skipped.push(SkippedSymbol {
                        symbol,
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "scan worker failed");
                }
            }
        }

        // A panicked worker never reports its symbol; whatever is left over
        // belongs to one.
        let mut lost: Vec<String> = outstanding.into_iter().collect();
        lost.sort();
        for symbol in lost {
            let e = ScanError::ComputationError("worker panicked".into());
            self.progress.record_skipped();
            skipped.push(SkippedSymbol {
                symbol,
                kind: e.kind().to_string(),
                message: e.to_string(),
            });
        }

        (rows, skipped)
    }
}

// =============================================================================
// Per-symbol pipeline
// =============================================================================

/// Fetch, compute and assemble one row.
///
/// # Edge cases
/// - Empty daily history → `DataUnavailable`.
/// - Fewer daily bars than `min_history_bars` → `InsufficientHistory`.
/// - Degraded daily indicators → `ComputationError`.
/// - Weekly fetch failure keeps the row: `weekly_impulse` is `None` and both
///   Apgar scores carry the weekly error.
pub async fn analyze_symbol(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    config: &ScannerConfig,
    as_of: DateTime<Utc>,
) -> Result<ScanResult, ScanError> {
    debug!(symbol, state = "fetching");
    let daily = provider
        .fetch(symbol, Interval::Daily, config.daily_lookback())
        .await?;
    if daily.is_empty() {
        return Err(ScanError::DataUnavailable(format!("no daily bars for {symbol}")));
    }
    if daily.len() < config.min_history_bars {
        return Err(ScanError::InsufficientHistory {
            have: daily.len(),
            need: config.min_history_bars,
        });
    }

    let weekly = match provider.fetch(symbol, Interval::Weekly, config.weekly_bars).await {
        Ok(series) if series.is_empty() => Err(ScanError::DataUnavailable(format!("no weekly bars for {symbol}"))),
        other => other,
    };
    if let Err(e) = &weekly {
        warn!(symbol, error = %e, "weekly data unavailable; scoring without it");
    }

    debug!(symbol, state = "computing");
    let daily_set = indicators::compute(&daily, &config.indicators);
    if daily_set.degraded {
        return Err(ScanError::ComputationError(format!("daily indicators degraded for {symbol}")));
    }

    build_row(&daily, &daily_set, weekly.as_ref(), config, as_of)
}

fn last_or_nan(values: &[f64]) -> f64 {
    values.last().copied().unwrap_or(f64::NAN)
}

fn build_row(
    daily: &PriceSeries,
    set: &IndicatorSet,
    weekly: Result<&PriceSeries, &ScanError>,
    config: &ScannerConfig,
    as_of: DateTime<Utc>,
) -> Result<ScanResult, ScanError> {
    let bars = daily.bars();
    let last = daily
        .last()
        .ok_or_else(|| ScanError::DataUnavailable("no daily bars".into()))?;
    let previous = bars.len().checked_sub(2).map(|i| bars[i].close);
    let change_pct = match previous {
        Some(prev) if prev != 0.0 => (last.close - prev) / prev * 100.0,
        _ => 0.0,
    };

    let ic = &config.indicators;
    let ema_fast = set.ema(ic.ema_fast).map_or(f64::NAN, last_or_nan);
    let ema_slow = set.ema(ic.ema_slow).map_or(f64::NAN, last_or_nan);
    let price = last.close;

    let closes = daily.closes();
    let macd_divergence = divergence::detect(&closes, &set.macd_hist, &config.divergence);
    let rsi_divergence = divergence::detect(&closes, &set.rsi, &config.divergence);
    let daily_impulse = impulse::latest(set, ic.ema_fast).unwrap_or(ImpulseColor::Blue);

    let (weekly_impulse, apgar_buy, apgar_sell) = match weekly {
        Ok(weekly) => {
            let weekly_set = indicators::compute(weekly, ic);
            let weekly_impulse = if weekly_set.degraded || !weekly_set.latest_reliable() {
                None
            } else {
                impulse::latest(&weekly_set, ic.ema_fast)
            };
            let score = |side| {
                apgar::score_timeframes(
                    Timeframe {
                        series: weekly,
                        indicators: &weekly_set,
                    },
                    Timeframe {
                        series: daily,
                        indicators: set,
                    },
                    side,
                    ic,
                    &config.apgar,
                )
            };
            (weekly_impulse, score(Side::Buy), score(Side::Sell))
        }
        Err(e) => (None, ApgarScore::failed(e.to_string()), ApgarScore::failed(e.to_string())),
    };

    Ok(ScanResult {
        symbol: daily.symbol.clone(),
        price,
        volume: last.volume,
        change_pct,
        ema_fast,
        ema_slow,
        above_ema_fast: price > ema_fast,
        above_ema_slow: price > ema_slow,
        ema_trend_bullish: ema_fast > ema_slow,
        in_value_zone: price >= ema_fast.min(ema_slow) && price <= ema_fast.max(ema_slow),
        rsi: last_or_nan(&set.rsi),
        adx: last_or_nan(&set.adx),
        plus_di: last_or_nan(&set.plus_di),
        minus_di: last_or_nan(&set.minus_di),
        stoch_k: last_or_nan(&set.stoch_k),
        stoch_d: last_or_nan(&set.stoch_d),
        macd: last_or_nan(&set.macd),
        macd_signal: last_or_nan(&set.macd_signal),
        macd_hist: last_or_nan(&set.macd_hist),
        atr: last_or_nan(&set.atr),
        force_index: last_or_nan(&set.force_index),
        obv: last_or_nan(&set.obv),
        ad_line: last_or_nan(&set.ad_line),
        unreliable: set.unreliable.last().copied().unwrap_or(true),
        macd_divergence,
        rsi_divergence,
        daily_impulse,
        weekly_impulse,
        apgar_buy,
        apgar_sell,
        cached_at: as_of,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::ScanSnapshot;
    use crate::scanner::{FilterConfig, SortKey};
    use crate::test_support::{trending_series, MockProvider};

    fn config_in(dir: &tempfile::TempDir) -> ScannerConfig {
        ScannerConfig {
            snapshot_path: dir.path().join("scan_snapshot.json"),
            ..ScannerConfig::default()
        }
    }

    fn scanner(provider: MockProvider, config: ScannerConfig) -> (Scanner, Arc<MockProvider>) {
        let provider = Arc::new(provider);
        let scanner = Scanner::new(provider.clone(), Arc::new(config));
        (scanner, provider)
    }

    fn request(symbols: &[&str]) -> ScanRequest {
        ScanRequest {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            ..ScanRequest::default()
        }
    }

    fn symbols(outcome: &ScanOutcome) -> Vec<&str> {
        outcome.rows.iter().map(|r| r.symbol.as_str()).collect()
    }

    #[tokio::test]
    async fn good_empty_and_short_histories() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_bars("A", 200)
            .with_empty("B")
            .with_bars("C", 10);
        let (scanner, _) = scanner(provider, config_in(&dir));

        let outcome = scanner.scan(request(&["A", "B", "C"])).await.unwrap();

        assert_eq!(symbols(&outcome), vec!["A"]);
        let skipped: Vec<(&str, &str)> = outcome
            .skipped
            .iter()
            .map(|s| (s.symbol.as_str(), s.kind.as_str()))
            .collect();
        assert_eq!(skipped, vec![("B", "data_unavailable"), ("C", "insufficient_history")]);
        assert!(outcome.skipped[1].message.contains("have 10 bars, need 35"));

        let row = &outcome.rows[0];
        assert!(row.price > 0.0);
        assert!(row.rsi.is_finite());
        assert!(!row.unreliable);
        assert!(row.obv > 0.0);
        assert!(row.weekly_impulse.is_some());
        assert!(row.apgar_buy.error.is_none());
        assert_eq!(row.cached_at, outcome.batch_timestamp);
    }

    #[tokio::test]
    async fn failures_drop_only_their_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = MockProvider::new();
        let mut all = Vec::new();
        for i in 0..10 {
            let symbol = format!("S{i}");
            provider = if i % 3 == 0 {
                provider.with_error(&symbol, "upstream 503")
            } else {
                provider.with_bars(&symbol, 120)
            };
            all.push(symbol);
        }
        let (scanner, _) = scanner(provider, config_in(&dir));

        let req = ScanRequest {
            symbols: all,
            ..ScanRequest::default()
        };
        let outcome = scanner.scan(req).await.unwrap();

        assert_eq!(outcome.requested, 10);
        assert_eq!(outcome.rows.len(), 6);
        assert_eq!(outcome.skipped.len(), 4);
        assert!(outcome.skipped.iter().all(|s| s.kind == "data_unavailable"));

        let progress = scanner.progress().snapshot();
        assert_eq!(progress.state, ScanState::Complete);
        assert_eq!((progress.total, progress.completed, progress.skipped), (10, 10, 4));
    }

    #[tokio::test]
    async fn completion_order_does_not_leak() {
        let growth = [("AAA", 1.004), ("BBB", 1.001), ("CCC", 1.003), ("DDD", 1.002)];
        let delays_a = [40, 0, 20, 10];
        let delays_b = [0, 40, 10, 20];

        let mut orders = Vec::new();
        for delays in [delays_a, delays_b] {
            let dir = tempfile::tempdir().unwrap();
            let mut provider = MockProvider::new();
            for ((symbol, g), ms) in growth.iter().zip(delays) {
                provider = provider
                    .with_exponential(symbol, 20.0, *g)
                    .with_delay(symbol, Duration::from_millis(ms));
            }
            let (scanner, _) = scanner(provider, config_in(&dir));
            let req = ScanRequest {
                sort: SortKey::ChangePct,
                ..request(&["AAA", "BBB", "CCC", "DDD"])
            };
            let outcome = scanner.scan(req).await.unwrap();
            let rows: Vec<(String, f64)> = outcome.rows.iter().map(|r| (r.symbol.clone(), r.change_pct)).collect();
            orders.push(rows);
        }

        assert_eq!(orders[0], orders[1]);
        let order: Vec<&str> = orders[0].iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(order, vec!["AAA", "CCC", "DDD", "BBB"]);
    }

    #[tokio::test]
    async fn cached_rows_are_reused_until_forced() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_bars("A", 200).with_bars("B", 200);
        let (scanner, provider) = scanner(provider, config_in(&dir));

        let first = scanner.scan(request(&["A", "B"])).await.unwrap();
        assert_eq!(first.from_cache, 0);
        let calls = provider.calls("A");
        assert_eq!(calls, 2);

        let second = scanner.scan(request(&["A", "B"])).await.unwrap();
        assert_eq!(second.from_cache, 2);
        assert_eq!(provider.calls("A"), calls);
        let key = |o: &ScanOutcome| -> Vec<(String, f64, DateTime<Utc>)> {
            o.rows.iter().map(|r| (r.symbol.clone(), r.price, r.cached_at)).collect()
        };
        assert_eq!(key(&second), key(&first));

        let forced = ScanRequest {
            force_refresh: true,
            ..request(&["A", "B"])
        };
        let third = scanner.scan(forced).await.unwrap();
        assert_eq!(third.from_cache, 0);
        assert_eq!(provider.calls("A"), calls * 2);
    }

    #[tokio::test]
    async fn slow_symbol_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_bars("FAST", 200)
            .with_bars("SLOW", 200)
            .with_delay("SLOW", Duration::from_secs(5));
        let config = ScannerConfig {
            task_timeout_secs: 1,
            ..config_in(&dir)
        };
        let (scanner, _) = scanner(provider, config);

        let outcome = scanner.scan(request(&["FAST", "SLOW"])).await.unwrap();
        assert_eq!(symbols(&outcome), vec!["FAST"]);
        assert_eq!(outcome.skipped[0].symbol, "SLOW");
        assert_eq!(outcome.skipped[0].kind, "timeout");
    }

    #[tokio::test]
    async fn request_errors_surface_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let (scanner, provider) = scanner(MockProvider::new().with_bars("A", 200), config_in(&dir));

        let bad_filter = ScanRequest {
            filters: FilterConfig {
                rsi_min: Some(150.0),
                ..FilterConfig::default()
            },
            ..request(&["A"])
        };
        assert!(matches!(scanner.scan(bad_filter).await, Err(ScanError::InvalidFilter(_))));

        let bad_universe = ScanRequest {
            universes: vec!["NOPE".into()],
            ..ScanRequest::default()
        };
        assert_eq!(
            scanner.scan(bad_universe).await.unwrap_err(),
            ScanError::UnknownUniverse("NOPE".into())
        );
        assert_eq!(provider.calls("A"), 0);
    }

    #[tokio::test]
    async fn filters_apply_and_limit_caps() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_exponential("UP", 50.0, 1.003)
            .with_exponential("DOWN", 50.0, 0.997)
            .with_exponential("FLAT", 50.0, 1.0005);
        let (scanner, _) = scanner(provider, config_in(&dir));

        let bearish = ScanRequest {
            filters: FilterConfig {
                change_max: Some(0.0),
                ..FilterConfig::default()
            },
            ..request(&["UP", "DOWN", "FLAT"])
        };
        let outcome = scanner.scan(bearish).await.unwrap();
        assert_eq!(symbols(&outcome), vec!["DOWN"]);

        let capped = ScanRequest {
            limit: Some(2),
            sort: SortKey::ChangePct,
            ..request(&["UP", "DOWN", "FLAT"])
        };
        let outcome = scanner.scan(capped).await.unwrap();
        assert_eq!(symbols(&outcome), vec!["UP", "FLAT"]);
    }

    #[tokio::test]
    async fn sampled_scan_skips_filters() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = MockProvider::new();
        let names: Vec<String> = (0..6).map(|i| format!("R{i}")).collect();
        for name in &names {
            provider = provider.with_bars(name, 150);
        }
        let (scanner, _) = scanner(provider, config_in(&dir));

        let req = ScanRequest {
            symbols: names,
            random_sample: Some(3),
            seed: Some(11),
            filters: FilterConfig {
                rsi_max: Some(1.0),
                ..FilterConfig::default()
            },
            ..ScanRequest::default()
        };
        let outcome = scanner.scan(req).await.unwrap();
        assert!(outcome.sampled);
        assert_eq!(outcome.requested, 3);
        assert_eq!(outcome.rows.len(), 3);
    }

    #[tokio::test]
    async fn weekly_failure_keeps_row() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .with_bars("W", 200)
            .with_weekly_error("W", "weekly endpoint down");
        let (scanner, _) = scanner(provider, config_in(&dir));

        let outcome = scanner.scan(request(&["W"])).await.unwrap();
        let row = &outcome.rows[0];
        assert!(row.weekly_impulse.is_none());
        assert!(!row.apgar_buy.passed);
        assert_eq!(row.apgar_buy.total, 0);
        assert!(row.apgar_sell.error.as_deref().unwrap_or("").contains("weekly endpoint down"));
    }

    #[tokio::test]
    async fn short_weekly_history_has_no_weekly_impulse() {
        let dir = tempfile::tempdir().unwrap();
        let daily = trending_series("YOUNG", Interval::Daily, 200, 50.0, 0.25);
        let weekly = trending_series("YOUNG", Interval::Weekly, 12, 50.0, 1.0);
        let provider = MockProvider::new().with_series("YOUNG", daily, weekly);
        let (scanner, _) = scanner(provider, config_in(&dir));

        let outcome = scanner.scan(request(&["YOUNG"])).await.unwrap();
        let row = &outcome.rows[0];
        assert!(row.weekly_impulse.is_none());
        for score in [&row.apgar_buy, &row.apgar_sell] {
            assert_eq!(score.total, 0);
            assert!(!score.passed);
            assert!(score.error.as_deref().unwrap_or("").starts_with("insufficient history"));
        }
    }

    #[tokio::test]
    async fn snapshot_holds_unfiltered_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let path = config.snapshot_path.clone();
        let provider = MockProvider::new()
            .with_exponential("UP", 50.0, 1.003)
            .with_exponential("DOWN", 50.0, 0.997);
        let (scanner, _) = scanner(provider, config);

        let req = ScanRequest {
            filters: FilterConfig {
                change_min: Some(0.0),
                ..FilterConfig::default()
            },
            ..request(&["UP", "DOWN"])
        };
        let outcome = scanner.scan(req).await.unwrap();
        assert_eq!(symbols(&outcome), vec!["UP"]);

        let snapshot = ScanSnapshot::load(&path).unwrap().unwrap();
        assert_eq!(snapshot.scan_id, outcome.scan_id);
        assert_eq!(snapshot.rows.len(), 2);
    }
}
