use serde::{Deserialize, Serialize};

use crate::error::{ObjectError, ObjectResult};

/// Tunables for blob reads and symlink resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    /// Blobs smaller than this are read eagerly and their channel released
    /// before the data is returned.
    pub small_object_threshold: u64,
    /// Largest symlink target that will be read.
    pub symlink_size_limit: u64,
    /// How many links a chain may pass through before resolution gives up.
    pub max_symlink_hops: usize,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            small_object_threshold: 4096,
            symlink_size_limit: 4096,
            max_symlink_hops: 999,
        }
    }
}

impl ObjectConfig {
    pub fn from_toml_str(s: &str) -> ObjectResult<Self> {
        toml::from_str(s).map_err(|e| {
            ObjectError::Protocol(gitbatch_protocol::ProtocolError::Config(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ObjectConfig::default();
        assert_eq!(c.small_object_threshold, 4096);
        assert_eq!(c.symlink_size_limit, 4096);
        assert_eq!(c.max_symlink_hops, 999);
    }

    #[test]
    fn partial_toml() {
        let c = ObjectConfig::from_toml_str("max_symlink_hops = 8").unwrap();
        assert_eq!(c.max_symlink_hops, 8);
        assert_eq!(c.small_object_threshold, 4096);
    }

    #[test]
    fn bad_toml() {
        assert!(ObjectConfig::from_toml_str("symlink_size_limit = -1").is_err());
    }
}
