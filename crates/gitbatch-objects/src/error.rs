use std::fmt;

use gitbatch_protocol::ProtocolError;
use gitbatch_types::{ObjectKind, TypeError};

/// Why a symlink could not be resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BadLinkReason {
    NotSymlink,
    TooLarge,
    OutsideRepo,
    Broken,
    Recursive,
    TooManyLevels,
}

impl BadLinkReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSymlink => "not a symlink",
            Self::TooLarge => "symlink too large",
            Self::OutsideRepo => "points outside of repo",
            Self::Broken => "broken link",
            Self::Recursive => "recursive link",
            Self::TooManyLevels => "too many levels of symbolic links",
        }
    }
}

impl fmt::Display for BadLinkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from blob and tree operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// No object with this id, or nothing at this path.
    #[error("object does not exist [id: {id}, rel_path: {path}]")]
    NotExist { id: String, path: String },

    /// Content exceeds a caller-imposed limit.
    #[error("blob size {size} exceeds limit {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("{name}: {reason}")]
    BadLink { name: String, reason: BadLinkReason },

    #[error("invalid object id: {0}")]
    InvalidId(#[from] TypeError),

    #[error("object {id} is a {actual}, expected a {expected}")]
    UnexpectedKind {
        id: String,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error(transparent)]
    Protocol(ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectError {
    pub(crate) fn not_exist_path(path: impl Into<String>) -> Self {
        Self::NotExist {
            id: String::new(),
            path: path.into(),
        }
    }

    pub(crate) fn bad_link(name: impl Into<String>, reason: BadLinkReason) -> Self {
        Self::BadLink {
            name: name.into(),
            reason,
        }
    }

    pub fn is_not_exist(&self) -> bool {
        matches!(self, Self::NotExist { .. })
    }

    /// The symlink failure reason, if this is a [`ObjectError::BadLink`].
    pub fn bad_link_reason(&self) -> Option<BadLinkReason> {
        match self {
            Self::BadLink { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl From<ProtocolError> for ObjectError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::NotExist { id } => Self::NotExist {
                id,
                path: String::new(),
            },
            ProtocolError::InvalidObjectId(e) => Self::InvalidId(e),
            ProtocolError::Io(e) => Self::Io(e),
            other => Self::Protocol(other),
        }
    }
}

pub type ObjectResult<T> = Result<T, ObjectError>;
