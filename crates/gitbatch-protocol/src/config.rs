use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Configuration for batch channel providers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// The git executable used to spawn `cat-file` processes.
    pub git_binary: PathBuf,
    /// How many aligned pipes each channel flavor keeps around for reuse.
    pub max_idle_pipes: usize,
    /// Capacity of the buffered read side of each pipe.
    pub read_buffer_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            git_binary: PathBuf::from("git"),
            max_idle_pipes: 1,
            read_buffer_capacity: 64 * 1024,
        }
    }
}

impl BatchConfig {
    /// Parse from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> ProtocolResult<Self> {
        toml::from_str(s).map_err(|e| ProtocolError::Config(e.to_string()))
    }
}
