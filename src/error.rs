//! Error types for model construction, sweeps and tracebacks.
//!
//! Numerical degeneracies are not errors: an unreachable cell simply holds
//! `f64::NEG_INFINITY`. Errors are reserved for misuse of the trellis
//! (wrong sweep order, wrong query), malformed models, and allocation failure.

use thiserror::Error;

use crate::trellis::SweepMode;

/// Failures raised by a [`StochTable`](crate::stoch::StochTable).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StochError {
    /// A push targeted a position before the bucket currently being filled.
    #[error("push at position {position} after bucket {current} was opened")]
    PositionOrder { position: usize, current: usize },

    /// The table is read-only once finalized.
    #[error("stochastic table is finalized; no further pushes are accepted")]
    Finalized,

    /// Sampling requires a finalized table.
    #[error("stochastic table must be finalized before traceback")]
    NotFinalized,

    /// Nothing was pushed.
    #[error("stochastic table is empty")]
    Empty,

    /// An entry names a predecessor with no group in the previous bucket.
    #[error("entry at position {position} names predecessor {prev} absent from position {}", .position - 1)]
    MissingPredecessor { position: usize, prev: usize },

    /// The terminal bucket must hold exactly one state group.
    #[error("terminal bucket holds {groups} state groups, expected 1")]
    TerminalGroups { groups: usize },

    /// An INIT entry was pushed after position 0.
    #[error("INIT predecessor pushed at position {position}; only position 0 starts a path")]
    InitAfterStart { position: usize },

    /// A position-0 entry named a predecessor state instead of INIT.
    #[error("entry at position 0 names predecessor {prev}; position 0 is reached from INIT")]
    PredecessorAtStart { prev: usize },

    /// Entry storage could not be reserved.
    #[error("cannot allocate {entries} stochastic table entries")]
    Allocation { entries: usize },
}

/// Unified error type for the decoding engine.
#[derive(Debug, Error)]
pub enum TrellisError {
    /// The model failed validation while being built.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Decoding a zero-length sequence is a precondition violation.
    #[error("sequence is empty")]
    EmptySequence,

    /// A digitized symbol does not index the model's alphabet.
    #[error("symbol {symbol} at position {position} outside alphabet of size {alphabet}")]
    SymbolOutOfRange {
        position: usize,
        symbol: usize,
        alphabet: usize,
    },

    /// A sweep already ran; call `reset` before the next one.
    #[error("a {0:?} sweep already ran; reset the trellis first")]
    SweepInProgress(SweepMode),

    /// A result was requested before any sweep completed.
    #[error("no sweep has been run")]
    NoSweep,

    /// The completed sweep does not provide the requested result.
    #[error("{query} is not available after a {found:?} sweep")]
    WrongMode {
        query: &'static str,
        found: SweepMode,
    },

    /// Every path has zero probability.
    #[error("no path with non-zero probability explains the sequence")]
    NoPath,

    /// A configuration value is out of range.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// A dynamic-programming table could not be reserved.
    #[error("cannot allocate {cells} table cells")]
    Allocation { cells: usize },

    #[error(transparent)]
    Stoch(#[from] StochError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrellisError>;
