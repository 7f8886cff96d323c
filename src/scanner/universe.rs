// =============================================================================
// Universe resolution
// =============================================================================
//
// Expands universe names plus ad hoc symbols into one ordered symbol list:
// upper-cased, trimmed, blanks dropped, first occurrence wins.
// =============================================================================

use std::collections::{BTreeMap, HashSet};

use crate::error::ScanError;
use crate::runtime_config::ScannerConfig;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    pub symbols: Vec<String>,
    /// Symbols contributed by each universe, keyed by the requested name.
    pub universe_counts: BTreeMap<String, usize>,
}

pub fn normalize(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

/// Resolve `universes` and `extra` symbols against the configured lists.
///
/// Fails with `UnknownUniverse` on the first name that is not configured.
pub fn resolve(universes: &[String], extra: &[String], config: &ScannerConfig) -> Result<Resolved, ScanError> {
    let mut seen = HashSet::new();
    let mut out = Resolved::default();

    let mut push = |raw: &str, out: &mut Resolved| {
        let symbol = normalize(raw);
        if !symbol.is_empty() && seen.insert(symbol.clone()) {
            out.symbols.push(symbol);
        }
    };

    for name in universes {
        let list = config
            .universe(name)
            .ok_or_else(|| ScanError::UnknownUniverse(name.clone()))?;
        out.universe_counts.insert(name.trim().to_string(), list.len());
        for symbol in list {
            push(symbol, &mut out);
        }
    }

    for symbol in extra {
        push(symbol, &mut out);
    }

    Ok(out)
}
