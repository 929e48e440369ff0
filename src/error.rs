//! Error type of the crate.

use thiserror::Error;

/// Errors raised while building, refining or repartitioning a distributed forest.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A weight was negative, infinite or not a number.
    #[error("invalid weight {weight} for local active cell {index}")]
    InvalidWeight {
        /// Local active cell index of the offending weight.
        index: usize,
        /// The weight that was supplied.
        weight: f64,
    },
    /// The number of weights does not match the number of locally owned active cells.
    #[error("expected {expected} weights but got {actual}")]
    WeightCountMismatch {
        /// Number of locally owned active cells.
        expected: usize,
        /// Number of weights supplied.
        actual: usize,
    },
    /// Partitioning into zero processes was requested.
    #[error("cannot partition into {0} processes")]
    InvalidProcessCount(usize),
    /// Parent and child links of the forest are inconsistent.
    #[error("malformed tree: {0}")]
    MalformedTree(String),
    /// A cell on the deepest level was marked for refinement.
    #[error("cell {cell} is on level {level} and cannot be refined further")]
    RefinementLimit {
        /// The cell that was marked.
        cell: usize,
        /// Its level.
        level: usize,
    },
    /// The requested dimension is not supported by an operation.
    #[error("dimension {0} is not supported")]
    UnsupportedDimension(usize),
    /// Ranks disagree on the global state.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),
    /// Other ranks failed with a contract violation during a collective operation.
    #[error("collective operation aborted, ranks {ranks:?} reported invalid input")]
    PeerFailure {
        /// The ranks that reported an error.
        ranks: Vec<usize>,
    },
    /// Writing an output file failed.
    #[error("export failed: {0}")]
    Export(String),
}

/// Result type of the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) const CONTRACT_STATUS: u64 = 1;
    pub(crate) const CONSISTENCY_STATUS: u64 = 2;

    /// Status code exchanged between ranks to agree on the outcome of a local step.
    pub(crate) fn status_code(&self) -> u64 {
        match self {
            Error::ConsistencyViolation(_) => Self::CONSISTENCY_STATUS,
            _ => Self::CONTRACT_STATUS,
        }
    }
}
