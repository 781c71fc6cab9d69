//! Entry storage for the virtual filesystem.
//!
//! This module provides the flat storage layer:
//! - `EntryStore`: async key-value contract, one entry per canonical path
//! - `MemoryEntryStore`: in-memory fallback
//! - `FileEntryStore`: durable JSON-document backend

mod entry_store;
mod file_store;
mod memory_store;

use std::sync::Arc;

pub use entry_store::{Content, Entry, EntryStore, Node, StoreBackend};
pub use file_store::FileEntryStore;
pub use memory_store::MemoryEntryStore;

use crate::config::StoreConfig;
use crate::error::VfsResult;

/// Open the backend described by `config`.
///
/// The choice is made once here; callers only ever see `dyn EntryStore`.
/// `Auto` degrades to memory when the durable document cannot be opened,
/// while `Durable` returns the error ([`crate::VfsError::StoreUnavailable`]
/// for I/O failures, [`crate::VfsError::Store`] for a corrupt document).
pub async fn open_store(config: &StoreConfig) -> VfsResult<Arc<dyn EntryStore>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryEntryStore::new())),
        StoreConfig::Durable { path } => Ok(Arc::new(FileEntryStore::open(path).await?)),
        StoreConfig::Auto { path } => match FileEntryStore::open(path).await {
            Ok(store) => Ok(Arc::new(store)),
            Err(e) => {
                tracing::warn!(error = %e, "durable store unavailable, falling back to memory");
                Ok(Arc::new(MemoryEntryStore::new()))
            }
        },
    }
}
