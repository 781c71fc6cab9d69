//! Configuration for store selection and write-queue tuning.
//!
//! Config files are JSON. Every field is optional:
//!
//! ```json
//! {
//!   "store": { "kind": "auto", "path": "saves/store.json" },
//!   "queue": { "maxRetries": 5, "backoffMs": 250 }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::VfsResult;
use crate::queue::QueueOptions;

/// Which entry store backend to open.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StoreConfig {
    /// Ephemeral in-memory store.
    #[default]
    Memory,
    /// Durable store at `path`; opening fails if it is unusable.
    Durable { path: PathBuf },
    /// Durable store at `path`, or memory if it cannot be opened.
    Auto { path: PathBuf },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavefsConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueOptions,
}

impl SavefsConfig {
    pub fn from_json_str(text: &str) -> VfsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a config file from the host filesystem.
    pub fn load(path: impl AsRef<Path>) -> VfsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
