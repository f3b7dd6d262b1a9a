use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("no object format uses {0}-character ids")]
    UnsupportedHexLength(usize),

    #[error("unknown object kind: {0:?}")]
    UnknownKind(String),

    #[error("unknown object format: {0:?}")]
    UnknownFormat(String),
}
