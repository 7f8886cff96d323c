// =============================================================================
// Scanner — request/result types and progress tracking
// =============================================================================
//
// A scan resolves universes into symbols, runs every symbol through the
// per-symbol pipeline on a bounded pool, and aggregates the rows into a
// filtered, sorted, capped table. The coordinating task is the only writer of
// the aggregated table; `ScanProgress` is the only state shared with workers.
// =============================================================================

pub mod filters;
pub mod orchestrator;
pub mod presets;
pub mod ranking;
pub mod universe;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::apgar::ApgarScore;
use crate::types::{DivergenceSignal, ImpulseColor};

pub use filters::FilterConfig;
pub use orchestrator::Scanner;

// =============================================================================
// Rows
// =============================================================================

/// One symbol's analysis as of its latest daily bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanResult {
    pub symbol: String,
    pub price: f64,
    pub volume: u64,
    pub change_pct: f64,

    // ── Trend ──
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub above_ema_fast: bool,
    pub above_ema_slow: bool,
    pub ema_trend_bullish: bool,
    /// Price between the fast and slow EMA (inclusive).
    pub in_value_zone: bool,

    // ── Oscillators ──
    pub rsi: f64,
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub atr: f64,
    pub force_index: f64,
    /// Cumulative on-balance volume from the first fetched bar.
    pub obv: f64,
    /// Cumulative accumulation/distribution line from the first fetched bar.
    pub ad_line: f64,
    /// The latest bar is still inside some indicator's warm-up.
    pub unreliable: bool,

    // ── Signals ──
    pub macd_divergence: DivergenceSignal,
    pub rsi_divergence: DivergenceSignal,
    pub daily_impulse: ImpulseColor,
    /// `None` when weekly data could not be fetched.
    pub weekly_impulse: Option<ImpulseColor>,
    pub apgar_buy: ApgarScore,
    pub apgar_sell: ApgarScore,

    pub cached_at: DateTime<Utc>,
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Volume, highest first.
    #[default]
    Volume,
    /// Daily change, highest first.
    ChangePct,
    /// RSI, lowest first; NaN last.
    RsiAsc,
    /// Seeded shuffle.
    Random,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanRequest {
    /// Universe names, matched case-insensitively.
    pub universes: Vec<String>,
    /// Ad hoc symbols added to the universes.
    pub symbols: Vec<String>,
    pub filters: FilterConfig,
    pub sort: SortKey,
    /// Maximum rows returned; the configured default when unset.
    pub limit: Option<usize>,
    /// Ignore cached rows and recompute every symbol.
    pub force_refresh: bool,
    /// Scan a random subset of this many symbols. Filters are not applied to
    /// a sampled scan.
    pub random_sample: Option<usize>,
    /// Seed for sampling and the random sort.
    pub seed: Option<u64>,
}

// =============================================================================
// Outcome
// =============================================================================

/// A symbol dropped from the table and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub scan_id: String,
    pub batch_timestamp: DateTime<Utc>,
    /// Symbols requested after universe resolution (and sampling).
    pub requested: usize,
    pub rows: Vec<ScanResult>,
    pub skipped: Vec<SkippedSymbol>,
    /// Rows served from the row cache instead of being recomputed.
    pub from_cache: usize,
    pub sampled: bool,
    pub universe_counts: BTreeMap<String, usize>,
}

// =============================================================================
// Progress
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Running,
    Aggregating,
    Complete,
}

impl ScanState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Aggregating,
            3 => Self::Complete,
            _ => Self::Idle,
        }
    }
}

/// Lock-free progress counters for the current batch. Purely observational.
#[derive(Debug, Default)]
pub struct ScanProgress {
    state: AtomicU8,
    total: AtomicUsize,
    completed: AtomicUsize,
    skipped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub state: ScanState,
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.skipped.store(0, Ordering::SeqCst);
        self.set_state(ScanState::Running);
    }

    pub fn set_state(&self, state: ScanState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn record_done(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// A skipped symbol still counts as completed work.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            state: ScanState::from_u8(self.state.load(Ordering::SeqCst)),
            total: self.total.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }
}
