// =============================================================================
// Central Application State — Impulse Scanner service
// =============================================================================
//
// Ties the scanner, the quote service and the last completed batch together
// for the REST API. Everything here is shared via `Arc<AppState>`.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the latest outcome.
//   - tokio::sync::Mutex as the single-scan gate, held across `.await`.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;

use crate::cache::ScanSnapshot;
use crate::market_data::{MarketDataProvider, QuoteService};
use crate::runtime_config::ScannerConfig;
use crate::scanner::{ScanOutcome, Scanner};

pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented whenever a new batch is published.
    pub state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub config: Arc<ScannerConfig>,

    // ── Engines ─────────────────────────────────────────────────────────
    pub provider: Arc<dyn MarketDataProvider>,
    pub scanner: Scanner,
    pub quotes: QuoteService,

    // ── Results ─────────────────────────────────────────────────────────
    pub latest: RwLock<Option<Arc<ScanOutcome>>>,
    /// Held for the whole of a scan; a second request fails fast.
    pub scan_lock: Arc<tokio::sync::Mutex<()>>,

    /// Instant when the service was started. Used for uptime.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: ScannerConfig, provider: Arc<dyn MarketDataProvider>) -> Self {
        let config = Arc::new(config);
        Self {
            state_version: AtomicU64::new(1),
            scanner: Scanner::new(Arc::clone(&provider), Arc::clone(&config)),
            quotes: QuoteService::new(Arc::clone(&provider), config.quote_ttl()),
            provider,
            config,
            latest: RwLock::new(None),
            scan_lock: Arc::new(tokio::sync::Mutex::new(())),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Results ─────────────────────────────────────────────────────────

    pub fn publish(&self, outcome: Arc<ScanOutcome>) {
        *self.latest.write() = Some(outcome);
        self.increment_version();
    }

    pub fn latest(&self) -> Option<Arc<ScanOutcome>> {
        self.latest.read().clone()
    }

    /// Restore the last run from its snapshot. The table is published as the
    /// latest outcome whatever its age; the row cache is only seeded while
    /// the snapshot's rows are still inside their TTL. Returns the number of
    /// rows restored to the cache.
    pub fn warm_start(&self, snapshot: &ScanSnapshot) -> usize {
        self.publish(Arc::new(snapshot.to_outcome()));
        let restored = snapshot.seed_cache(self.scanner.row_cache(), self.config.scan_ttl(), Utc::now());
        info!(
            scan_id = %snapshot.scan_id,
            rows = snapshot.rows.len(),
            restored,
            "warm start from snapshot"
        );
        restored
    }
}
