// =============================================================================
// Named filter presets
// =============================================================================

use serde::Serialize;

use super::filters::{DivergenceFilter, FilterConfig, RsiExtreme, TrendFilter};

#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub filters: FilterConfig,
}

/// All built-in presets, in display order.
pub fn all() -> Vec<Preset> {
    vec![
        Preset {
            name: "RSI Oversold",
            description: "RSI at or below 30",
            filters: FilterConfig {
                rsi_max: Some(30.0),
                ..FilterConfig::default()
            },
        },
        Preset {
            name: "RSI Overbought",
            description: "RSI at or above 70",
            filters: FilterConfig {
                rsi_min: Some(70.0),
                ..FilterConfig::default()
            },
        },
        Preset {
            name: "RSI Extremes",
            description: "RSI at either extreme, 30 or below or 70 or above",
            filters: FilterConfig {
                rsi_extreme: Some(RsiExtreme::Any),
                ..FilterConfig::default()
            },
        },
        Preset {
            name: "High Volume",
            description: "At least 10M shares traded on the latest session",
            filters: FilterConfig {
                min_volume: Some(10_000_000.0),
                ..FilterConfig::default()
            },
        },
        Preset {
            name: "Value Zone Longs",
            description: "Uptrend with price pulled back between the EMAs",
            filters: FilterConfig {
                value_zone_only: true,
                ema_trend: Some(TrendFilter::Bullish),
                ..FilterConfig::default()
            },
        },
        Preset {
            name: "Bullish Divergence",
            description: "Bullish MACD-histogram divergence",
            filters: FilterConfig {
                macd_divergence: Some(DivergenceFilter::Bullish),
                ..FilterConfig::default()
            },
        },
        Preset {
            name: "Bearish Divergence",
            description: "Bearish MACD-histogram divergence",
            filters: FilterConfig {
                macd_divergence: Some(DivergenceFilter::Bearish),
                ..FilterConfig::default()
            },
        },
        Preset {
            name: "Apgar Buy Setups",
            description: "Buy-side Apgar score of 7 or more",
            filters: FilterConfig {
                min_apgar_score: Some(7),
                ..FilterConfig::default()
            },
        },
        Preset {
            name: "Apgar Sell Setups",
            description: "Sell-side Apgar score of 7 or more",
            filters: FilterConfig {
                min_apgar_sell_score: Some(7),
                ..FilterConfig::default()
            },
        },
        Preset {
            name: "Strong Uptrend",
            description: "Above both EMAs with a bullish EMA stack and MACD above signal",
            filters: FilterConfig {
                ema_trend: Some(TrendFilter::Bullish),
                above_ema_fast: Some(true),
                above_ema_slow: Some(true),
                macd_signal: Some(TrendFilter::Bullish),
                ..FilterConfig::default()
            },
        },
    ]
}

/// Filters of the preset called `name` (case-insensitive).
pub fn lookup(name: &str) -> Option<FilterConfig> {
    all()
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
        .map(|p| p.filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_validates() {
        let presets = all();
        assert_eq!(presets.len(), 10);
        for p in presets {
            assert!(p.filters.validate().is_ok(), "{} failed validation", p.name);
            assert!(!p.filters.is_empty(), "{} has no criteria", p.name);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let f = lookup("rsi oversold").unwrap();
        assert_eq!(f.rsi_max, Some(30.0));
        assert!(lookup("Moon Shots").is_none());
        assert_eq!(lookup("RSI EXTREMES").and_then(|f| f.rsi_extreme), Some(RsiExtreme::Any));
    }
}
