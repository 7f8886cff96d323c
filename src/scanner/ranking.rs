// =============================================================================
// Ranking — sort and sample
// =============================================================================
//
// The sort key is the only ordering contract of a scan: completion order of
// the workers never leaks into the table. Ties are broken by symbol, and the
// random order is a seeded shuffle of the symbol-sorted rows, so the same
// rows and seed always give the same table.
// =============================================================================

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{ScanResult, SortKey};

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Ascending on a float, NaN last.
fn asc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

/// Descending on a float, NaN last.
fn desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        _ => asc(a, b),
    }
}

/// Sort `rows` in place by `key`.
pub fn sort_rows(rows: &mut [ScanResult], key: SortKey, seed: Option<u64>) {
    rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    match key {
        SortKey::Volume => rows.sort_by(|a, b| b.volume.cmp(&a.volume)),
        SortKey::ChangePct => rows.sort_by(|a, b| desc(a.change_pct, b.change_pct)),
        SortKey::RsiAsc => rows.sort_by(|a, b| asc(a.rsi, b.rsi)),
        SortKey::Random => rows.shuffle(&mut rng(seed)),
    }
}

/// Pick `n` symbols at random, preserving their original relative order.
pub fn sample(symbols: &[String], n: usize, seed: Option<u64>) -> Vec<String> {
    if n >= symbols.len() {
        return symbols.to_vec();
    }
    let mut picked = rand::seq::index::sample(&mut rng(seed), symbols.len(), n).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| symbols[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(symbol: &str, volume: u64, change: f64, rsi: f64) -> ScanResult {
        ScanResult {
            symbol: symbol.into(),
            volume,
            change_pct: change,
            rsi,
            ..ScanResult::default()
        }
    }

    fn symbols(rows: &[ScanResult]) -> Vec<&str> {
        rows.iter().map(|r| r.symbol.as_str()).collect()
    }

    fn rows() -> Vec<ScanResult> {
        vec![
            row("MSFT", 100, 1.0, 55.0),
            row("AAPL", 300, -2.0, f64::NAN),
            row("NVDA", 100, 4.0, 28.0),
            row("AMD", 50, 4.0, 71.0),
        ]
    }

    #[test]
    fn volume_desc_ties_by_symbol() {
        let mut r = rows();
        sort_rows(&mut r, SortKey::Volume, None);
        assert_eq!(symbols(&r), vec!["AAPL", "MSFT", "NVDA", "AMD"]);
    }

    #[test]
    fn change_desc_ties_by_symbol() {
        let mut r = rows();
        sort_rows(&mut r, SortKey::ChangePct, None);
        assert_eq!(symbols(&r), vec!["AMD", "NVDA", "MSFT", "AAPL"]);
    }

    #[test]
    fn rsi_asc_nan_last() {
        let mut r = rows();
        sort_rows(&mut r, SortKey::RsiAsc, None);
        assert_eq!(symbols(&r), vec!["NVDA", "MSFT", "AMD", "AAPL"]);
    }

    #[test]
    fn seeded_shuffle_ignores_input_order() {
        let mut a = rows();
        let mut b = rows();
        b.reverse();
        sort_rows(&mut a, SortKey::Random, Some(42));
        sort_rows(&mut b, SortKey::Random, Some(42));
        assert_eq!(symbols(&a), symbols(&b));
    }

    #[test]
    fn sample_is_seeded_and_ordered() {
        let all: Vec<String> = (0..20).map(|i| format!("S{i:02}")).collect();
        let a = sample(&all, 5, Some(7));
        let b = sample(&all, 5, Some(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(a, sorted);

        assert_eq!(sample(&all, 50, Some(7)).len(), 20);
    }
}
