// =============================================================================
// Scan snapshot — last batch persisted to disk for warm starts
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::scanner::{ranking, ScanOutcome, ScanResult, SortKey};
use crate::types::Interval;

use super::TtlCache;

/// Row cache key: symbol plus the interval the row was computed on.
pub type RowKey = (String, Interval);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSnapshot {
    pub scan_id: String,
    pub batch_timestamp: DateTime<Utc>,
    pub universe_counts: BTreeMap<String, usize>,
    pub rows: Vec<ScanResult>,
}

impl ScanSnapshot {
    /// Snapshot of every computed row of a batch, before filtering.
    pub fn new(outcome: &ScanOutcome, rows: Vec<ScanResult>) -> Self {
        Self {
            scan_id: outcome.scan_id.clone(),
            batch_timestamp: outcome.batch_timestamp,
            universe_counts: outcome.universe_counts.clone(),
            rows,
        }
    }

    /// The persisted table as a publishable outcome, whatever its age. Rows
    /// are sorted by the default key; nothing is filtered or capped.
    pub fn to_outcome(&self) -> ScanOutcome {
        let mut rows = self.rows.clone();
        ranking::sort_rows(&mut rows, SortKey::default(), None);
        ScanOutcome {
            scan_id: self.scan_id.clone(),
            batch_timestamp: self.batch_timestamp,
            requested: rows.len(),
            from_cache: rows.len(),
            rows,
            skipped: Vec::new(),
            sampled: false,
            universe_counts: self.universe_counts.clone(),
        }
    }

    /// Atomic write: `.json.tmp`, then rename over `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string(self).context("failed to serialise scan snapshot")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp snapshot to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp snapshot to {}", path.display()))?;

        debug!(path = %path.display(), rows = self.rows.len(), "scan snapshot saved");
        Ok(())
    }

    /// `Ok(None)` when no snapshot has been written yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scan snapshot from {}", path.display()))?;
        let snapshot: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scan snapshot from {}", path.display()))?;
        Ok(Some(snapshot))
    }

    /// Restore rows into `cache` with their original expiry
    /// (`batch_timestamp + ttl`). Nothing is restored once that has passed.
    /// Returns the number of rows restored.
    pub fn seed_cache(&self, cache: &TtlCache<RowKey, ScanResult>, ttl: Duration, now: DateTime<Utc>) -> usize {
        let expires_at = self.batch_timestamp + ttl;
        if now >= expires_at {
            info!(scan_id = %self.scan_id, "scan snapshot expired; starting cold");
            return 0;
        }
        for row in &self.rows {
            cache.insert_until((row.symbol.clone(), Interval::Daily), row.clone(), expires_at);
        }
        info!(scan_id = %self.scan_id, rows = self.rows.len(), expires_at = %expires_at, "row cache warmed from snapshot");
        self.rows.len()
    }
}
