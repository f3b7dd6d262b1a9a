use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The type tag the backend reports for an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Raw content.
    Blob,
    /// Directory listing.
    Tree,
    /// Commit; inside a tree this is a submodule pointer.
    Commit,
    /// Annotated tag.
    Tag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

/// Mask selecting the object-type bits of a tree entry mode.
pub const MODE_TYPE_MASK: u32 = 0o170000;

/// Classification of a tree entry.
///
/// Git tooling writes permission bits inconsistently, so a mode is classified
/// by its type bits (and the owner-exec bit for files) rather than matched
/// against the handful of canonical values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Subtree / directory (0o040000).
    Tree,
    /// Normal file (0o100644).
    Blob,
    /// Executable file (0o100755).
    Exec,
    /// Symbolic link (0o120000).
    Symlink,
    /// Submodule commit pointer (0o160000).
    Commit,
}

impl EntryMode {
    /// Canonical octal mode value.
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Tree => 0o040000,
            Self::Blob => 0o100644,
            Self::Exec => 0o100755,
            Self::Symlink => 0o120000,
            Self::Commit => 0o160000,
        }
    }

    /// Classify any octal mode value. Returns `None` for type bits git does
    /// not use in trees.
    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits & MODE_TYPE_MASK {
            0o040000 => Some(Self::Tree),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Commit),
            0o100000 if bits & 0o100 == 0o100 => Some(Self::Exec),
            0o100000 => Some(Self::Blob),
            _ => None,
        }
    }

    /// The kind of object an entry with this mode points at.
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            Self::Tree => ObjectKind::Tree,
            Self::Commit => ObjectKind::Commit,
            Self::Blob | Self::Exec | Self::Symlink => ObjectKind::Blob,
        }
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}
