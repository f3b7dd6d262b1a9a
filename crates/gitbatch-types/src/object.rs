use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::TypeError;
use crate::mode::ObjectKind;

/// The digest a repository uses to name its objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFormat {
    Sha1,
    Sha256,
}

impl ObjectFormat {
    /// Width of a raw (binary) id in bytes.
    pub const fn raw_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Width of a hex-encoded id in characters.
    pub const fn hex_len(&self) -> usize {
        self.raw_len() * 2
    }

    /// Name as it appears in `extensions.objectformat`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// The format whose hex ids are `len` characters long.
    pub fn from_hex_len(len: usize) -> Result<Self, TypeError> {
        match len {
            40 => Ok(Self::Sha1),
            64 => Ok(Self::Sha256),
            other => Err(TypeError::UnsupportedHexLength(other)),
        }
    }

    /// The all-zero id of this format.
    pub const fn zero_id(&self) -> ObjectId {
        match self {
            Self::Sha1 => ObjectId::Sha1([0u8; 20]),
            Self::Sha256 => ObjectId::Sha256([0u8; 32]),
        }
    }

    /// Id of the tree with no entries.
    pub fn empty_tree(&self) -> ObjectId {
        self.hash_object(ObjectKind::Tree, &[])
    }

    /// Hash `data` the way git names a loose object: `"<kind> <len>\0" + data`.
    pub fn hash_object(&self, kind: ObjectKind, data: &[u8]) -> ObjectId {
        let header = format!("{} {}\0", kind, data.len());
        match self {
            Self::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(header.as_bytes());
                hasher.update(data);
                ObjectId::Sha1(hasher.finalize().into())
            }
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(header.as_bytes());
                hasher.update(data);
                ObjectId::Sha256(hasher.finalize().into())
            }
        }
    }
}

impl Default for ObjectFormat {
    fn default() -> Self {
        Self::Sha1
    }
}

impl fmt::Display for ObjectFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectFormat {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => Err(TypeError::UnknownFormat(other.to_string())),
        }
    }
}

/// Identifier of a git object.
///
/// Equality is byte-exact and includes the format: a SHA-1 id never equals a
/// SHA-256 id. The all-zero id of either format is the "no object" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectId {
    Sha1([u8; 20]),
    Sha256([u8; 32]),
}

impl ObjectId {
    /// Build an id from raw digest bytes of the given format.
    pub fn from_raw(format: ObjectFormat, bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != format.raw_len() {
            return Err(TypeError::InvalidLength {
                expected: format.raw_len(),
                actual: bytes.len(),
            });
        }
        Ok(match format {
            ObjectFormat::Sha1 => {
                let mut arr = [0u8; 20];
                arr.copy_from_slice(bytes);
                Self::Sha1(arr)
            }
            ObjectFormat::Sha256 => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(bytes);
                Self::Sha256(arr)
            }
        })
    }

    /// Parse from a hex string. The format is inferred from the length.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let format = ObjectFormat::from_hex_len(s.len())?;
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_raw(format, &bytes)
    }

    /// Parse from hex held in a byte slice, as read off the wire.
    pub fn from_hex_bytes(s: &[u8]) -> Result<Self, TypeError> {
        let s = std::str::from_utf8(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_hex(s)
    }

    pub fn format(&self) -> ObjectFormat {
        match self {
            Self::Sha1(_) => ObjectFormat::Sha1,
            Self::Sha256(_) => ObjectFormat::Sha256,
        }
    }

    /// Returns `true` for the all-zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.as_bytes().iter().all(|b| *b == 0)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(b) => b,
            Self::Sha256(b) => b,
        }
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.as_bytes()[..4])
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 20]> for ObjectId {
    fn from(bytes: [u8; 20]) -> Self {
        Self::Sha1(bytes)
    }
}

impl From<[u8; 32]> for ObjectId {
    fn from(bytes: [u8; 32]) -> Self {
        Self::Sha256(bytes)
    }
}
