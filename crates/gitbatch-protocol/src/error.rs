use gitbatch_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The backend answered `<id> missing` (or `ambiguous`).
    #[error("object does not exist: {id}")]
    NotExist { id: String },

    /// A header or listing line did not have the expected shape.
    #[error("malformed batch output ({reason}): {line:?}")]
    Malformed { reason: String, line: String },

    #[error("unknown mode: {0:o}")]
    UnknownMode(u32),

    #[error("cannot parse mode: {0:?}")]
    InvalidMode(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(#[from] TypeError),

    #[error("cannot acquire batch channel: {0}")]
    Acquire(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub fn malformed(reason: impl Into<String>, line: &[u8]) -> Self {
        Self::Malformed {
            reason: reason.into(),
            line: String::from_utf8_lossy(line).into_owned(),
        }
    }

    /// Returns `true` if the backend reported the object as absent.
    pub fn is_not_exist(&self) -> bool {
        matches!(self, Self::NotExist { .. })
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
