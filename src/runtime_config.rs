// =============================================================================
// Runtime Configuration — scanner settings with atomic save
// =============================================================================
//
// Every tunable parameter of the scanner lives here: server address, provider
// endpoint, pool size, history depth, cache lifetimes, universes and the
// indicator / divergence / Apgar parameters.
//
// Persistence uses an atomic tmp + rename pattern. All fields carry a serde
// default so that adding new fields never breaks loading an older file.
// =============================================================================

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::apgar::ApgarParams;
use crate::divergence::DivergenceParams;
use crate::indicators::IndicatorConfig;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_provider_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_concurrency() -> usize {
    8
}

fn default_task_timeout_secs() -> u64 {
    30
}

fn default_display_bars() -> usize {
    150
}

fn default_warmup_bars() -> usize {
    100
}

fn default_weekly_bars() -> usize {
    104
}

fn default_min_history_bars() -> usize {
    35
}

fn default_scan_ttl_secs() -> u64 {
    4 * 60 * 60
}

fn default_quote_ttl_secs() -> u64 {
    30
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("scan_snapshot.json")
}

fn default_limit() -> usize {
    100
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_universes() -> BTreeMap<String, Vec<String>> {
    let mut universes = BTreeMap::new();
    universes.insert(
        "DOW30".to_string(),
        symbols(&[
            "AAPL", "AMGN", "AMZN", "AXP", "BA", "CAT", "CRM", "CSCO", "CVX", "DIS",
            "GS", "HD", "HON", "IBM", "JNJ", "JPM", "KO", "MCD", "MMM", "MRK",
            "MSFT", "NKE", "NVDA", "PG", "SHW", "TRV", "UNH", "V", "VZ", "WMT",
        ]),
    );
    universes.insert(
        "MEGACAP".to_string(),
        symbols(&[
            "AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "BRK-B", "AVGO", "TSLA", "LLY",
        ]),
    );
    universes.insert(
        "SECTOR_ETFS".to_string(),
        symbols(&[
            "XLB", "XLC", "XLE", "XLF", "XLI", "XLK", "XLP", "XLRE", "XLU", "XLV", "XLY",
        ]),
    );
    universes
}

// =============================================================================
// ScannerConfig
// =============================================================================

/// Top-level configuration for the scanner service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    // --- Server & provider ---------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the chart API (`{base}/v8/finance/chart/{symbol}`).
    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,

    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    // --- Scan pool ------------------------------------------------------------

    /// Maximum number of symbols processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-symbol budget covering fetch and computation.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Rows returned when a request does not set its own limit.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    // --- History depth ----------------------------------------------------------

    /// Daily bars the engine wants to show after indicator warm-up.
    #[serde(default = "default_display_bars")]
    pub display_bars: usize,

    /// Extra daily bars requested so indicators are settled on display bars.
    #[serde(default = "default_warmup_bars")]
    pub warmup_bars: usize,

    #[serde(default = "default_weekly_bars")]
    pub weekly_bars: usize,

    /// Symbols with fewer daily bars are skipped.
    #[serde(default = "default_min_history_bars")]
    pub min_history_bars: usize,

    // --- Caching --------------------------------------------------------------

    #[serde(default = "default_scan_ttl_secs")]
    pub scan_ttl_secs: u64,

    #[serde(default = "default_quote_ttl_secs")]
    pub quote_ttl_secs: u64,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    // --- Universes & analysis ---------------------------------------------------

    /// Named symbol lists. Names are matched case-insensitively.
    #[serde(default = "default_universes")]
    pub universes: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub indicators: IndicatorConfig,

    #[serde(default)]
    pub divergence: DivergenceParams,

    #[serde(default)]
    pub apgar: ApgarParams,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            provider_base_url: default_provider_base_url(),
            provider_timeout_secs: default_provider_timeout_secs(),
            concurrency: default_concurrency(),
            task_timeout_secs: default_task_timeout_secs(),
            default_limit: default_limit(),
            display_bars: default_display_bars(),
            warmup_bars: default_warmup_bars(),
            weekly_bars: default_weekly_bars(),
            min_history_bars: default_min_history_bars(),
            scan_ttl_secs: default_scan_ttl_secs(),
            quote_ttl_secs: default_quote_ttl_secs(),
            snapshot_path: default_snapshot_path(),
            universes: default_universes(),
            indicators: IndicatorConfig::default(),
            divergence: DivergenceParams::default(),
            apgar: ApgarParams::default(),
        }
    }
}

impl ScannerConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scanner config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scanner config from {}", path.display()))?;

        info!(
            path = %path.display(),
            universes = config.universes.len(),
            concurrency = config.concurrency,
            "scanner config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise scanner config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "scanner config saved (atomic)");
        Ok(())
    }

    /// Apply `SCANNER_BIND_ADDR`, `SCANNER_CACHE_PATH` and
    /// `SCANNER_CONCURRENCY` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Unparseable values are
    /// ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("SCANNER_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(path) = lookup("SCANNER_CACHE_PATH") {
            self.snapshot_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("SCANNER_CONCURRENCY") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => self.concurrency = n,
                _ => warn!(value = %raw, "ignoring invalid SCANNER_CONCURRENCY"),
            }
        }
    }

    /// Daily bars requested per symbol.
    pub fn daily_lookback(&self) -> usize {
        self.display_bars + self.warmup_bars
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn scan_ttl(&self) -> chrono::Duration {
        ttl_from_secs(self.scan_ttl_secs)
    }

    pub fn quote_ttl(&self) -> chrono::Duration {
        ttl_from_secs(self.quote_ttl_secs)
    }

    /// Symbols of a universe, matched case-insensitively.
    pub fn universe(&self, name: &str) -> Option<&[String]> {
        let wanted = name.trim();
        self.universes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(wanted))
            .map(|(_, list)| list.as_slice())
    }
}

/// Longest accepted cache lifetime (one year).
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

fn ttl_from_secs(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = ScannerConfig::default();
        assert_eq!(cfg.concurrency, 8);
        assert_eq!(cfg.task_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.daily_lookback(), 250);
        assert_eq!(cfg.weekly_bars, 104);
        assert_eq!(cfg.min_history_bars, 35);
        assert_eq!(cfg.scan_ttl(), chrono::Duration::hours(4));
        assert_eq!(cfg.quote_ttl(), chrono::Duration::seconds(30));
        assert_eq!(cfg.indicators.ema_fast, 13);
        assert_eq!(cfg.apgar.pass_threshold, 7);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: ScannerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
        assert_eq!(cfg.divergence.lookback, 50);
        assert!(cfg.universe("dow30").is_some());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "concurrency": 2, "universes": { "Tech": ["AAPL", "MSFT"] }, "indicators": { "ema_fast": 11 } }"#;
        let cfg: ScannerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.concurrency, 2);
        assert_eq!(cfg.universe("TECH").map(<[String]>::len), Some(2));
        assert!(cfg.universe("DOW30").is_none());
        assert_eq!(cfg.indicators.ema_fast, 11);
        assert_eq!(cfg.indicators.ema_slow, 26);
    }

    #[test]
    fn overrides_apply_and_ignore_garbage() {
        let mut cfg = ScannerConfig::default();
        cfg.apply_overrides(|key| match key {
            "SCANNER_BIND_ADDR" => Some("127.0.0.1:9000".to_string()),
            "SCANNER_CACHE_PATH" => Some("/tmp/snap.json".to_string()),
            "SCANNER_CONCURRENCY" => Some("zero".to_string()),
            _ => None,
        });
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.snapshot_path, PathBuf::from("/tmp/snap.json"));
        assert_eq!(cfg.concurrency, 8);

        cfg.apply_overrides(|key| (key == "SCANNER_CONCURRENCY").then(|| "3".to_string()));
        assert_eq!(cfg.concurrency, 3);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner_config.json");
        let mut cfg = ScannerConfig::default();
        cfg.concurrency = 5;
        cfg.save(&path).unwrap();

        let loaded = ScannerConfig::load(&path).unwrap();
        assert_eq!(loaded.concurrency, 5);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(ScannerConfig::load("/definitely/not/here.json").is_err());
    }
}
