// =============================================================================
// Scan error taxonomy
// =============================================================================
//
// Per-symbol failures (`DataUnavailable`, `InsufficientHistory`,
// `ComputationError`, `Timeout`) are recovered by the orchestrator and logged
// to the skip list. Request-level failures (`InvalidFilter`, `UnknownUniverse`)
// surface to the caller before any work is dispatched.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScanError {
    /// The provider returned nothing usable for the symbol.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("insufficient history: have {have} bars, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("computation error: {0}")]
    ComputationError(String),

    #[error("timed out")]
    Timeout,

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("unknown universe: {0}")]
    UnknownUniverse(String),
}

impl ScanError {
    /// Stable snake_case tag used in skip logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable(_) => "data_unavailable",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::ComputationError(_) => "computation_error",
            Self::Timeout => "timeout",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::UnknownUniverse(_) => "unknown_universe",
        }
    }

    /// True for errors that reject the whole request rather than one symbol.
    pub fn is_request_error(&self) -> bool {
        matches!(self, Self::InvalidFilter(_) | Self::UnknownUniverse(_))
    }
}
