//! Virtual filesystem over a flat entry store.
//!
//! The store has no notion of hierarchy. Directories are plain entries, and
//! the tree is derived on every `read_dir` by grouping the full entry list on
//! path prefix. Saves are small, so the linear scan is cheap.
//!
//! There is no cross-operation locking. Two calls racing on one path resolve
//! by whichever `put` lands last, and `ensure_dir_chain` touches one ancestor
//! at a time, so a concurrent recursive `remove` can leave a partial chain.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app_fs::{AppFs, DirEntry};
use crate::config::StoreConfig;
use crate::error::{VfsError, VfsResult};
use crate::path::{parent_path, require_path, store_key};
use crate::store::{
    open_store, Content, Entry, EntryStore, MemoryEntryStore, Node, StoreBackend,
};

/// Filesystem view over an [`EntryStore`].
///
/// Clone is cheap (just clones the Arc); clones share the same store.
#[derive(Clone)]
pub struct VirtualFs {
    store: Arc<dyn EntryStore>,
}

impl VirtualFs {
    pub fn new(store: Arc<dyn EntryStore>) -> Self {
        Self { store }
    }

    /// Filesystem over a fresh, empty in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryEntryStore::new()))
    }

    /// Open the store described by `config` and wrap it.
    pub async fn open(config: &StoreConfig) -> VfsResult<Self> {
        let store = open_store(config).await?;
        tracing::info!(backend = %store.backend(), "virtual filesystem ready");
        Ok(Self::new(store))
    }

    pub fn backend(&self) -> StoreBackend {
        self.store.backend()
    }

    pub fn store(&self) -> &Arc<dyn EntryStore> {
        &self.store
    }

    /// Create every missing directory along `key`, shallowest first.
    async fn ensure_dir_chain(&self, key: &str) -> VfsResult<()> {
        if key.is_empty() {
            return Ok(());
        }

        let mut current = String::with_capacity(key.len());
        for part in key.split('/') {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);

            match self.store.get(&current).await? {
                Some(entry) if entry.is_file() => {
                    return Err(VfsError::NotADirectory(current));
                }
                Some(_) => {}
                None => {
                    tracing::trace!(path = %current, "creating directory");
                    self.store.put(Entry::directory(current.clone())).await?;
                }
            }
        }
        Ok(())
    }

    /// Store `content` as a file at `key`, creating ancestors.
    async fn put_file(&self, key: String, content: Content) -> VfsResult<()> {
        self.ensure_dir_chain(parent_path(&key)).await?;
        if let Some(existing) = self.store.get(&key).await? {
            if existing.is_directory() {
                return Err(VfsError::Conflict(key));
            }
        }
        self.store.put(Entry::file(key, content)).await
    }

    /// Content of the file at `key`, or `FileNotFound`.
    async fn file_content(&self, key: &str) -> VfsResult<Content> {
        match self.store.get(key).await? {
            Some(Entry {
                node: Node::File { content },
                ..
            }) => Ok(content),
            _ => Err(VfsError::FileNotFound(key.to_string())),
        }
    }

    /// Every stored entry strictly below `key`.
    async fn descendants(&self, key: &str) -> VfsResult<Vec<Entry>> {
        let prefix = format!("{}/", key);
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|e| e.path.starts_with(&prefix))
            .collect())
    }

    /// Move a directory and its subtree from `from` to `to`.
    ///
    /// `to` must be missing or an empty directory, so the old and new key
    /// sets never overlap.
    async fn rename_dir(&self, from: &str, to: &str) -> VfsResult<()> {
        if to.starts_with(&format!("{}/", from)) {
            return Err(VfsError::InvalidPath(format!(
                "cannot move \"{}\" into itself",
                from
            )));
        }

        let occupied = self.descendants(to).await?;
        match self.store.get(to).await? {
            Some(existing) if existing.is_file() => {
                return Err(VfsError::Conflict(to.to_string()));
            }
            _ if !occupied.is_empty() => {
                return Err(VfsError::DestinationNotEmpty(to.to_string()));
            }
            _ => {}
        }

        self.ensure_dir_chain(parent_path(to)).await?;
        let descendants = self.descendants(from).await?;

        let mut moved = Vec::with_capacity(descendants.len() + 1);
        moved.push(Entry::directory(to));
        moved.extend(descendants.iter().map(|entry| Entry {
            path: format!("{}{}", to, &entry.path[from.len()..]),
            node: entry.node.clone(),
        }));
        self.store.put_many(moved).await?;

        let mut old: Vec<String> = descendants.into_iter().map(|e| e.path).collect();
        old.push(from.to_string());
        self.store.delete_many(&old).await
    }
}

/// Group `entries` into the immediate children of `base`.
fn build_dir_entries(base: &str, entries: &[Entry], recursive: bool) -> Vec<DirEntry> {
    let prefix = if base.is_empty() {
        String::new()
    } else {
        format!("{}/", base)
    };

    let mut children: BTreeMap<&str, DirEntry> = BTreeMap::new();
    for entry in entries {
        let Some(relative) = entry.path.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if relative.is_empty() {
            continue;
        }

        let (name, nested) = match relative.split_once('/') {
            Some((first, _)) => (first, true),
            None => (relative, false),
        };
        let is_directory = nested || entry.is_directory();

        children
            .entry(name)
            .and_modify(|child| {
                if is_directory {
                    child.is_directory = true;
                    child.is_file = false;
                }
            })
            .or_insert_with(|| {
                DirEntry::new(format!("{}{}", prefix, name), name.to_string(), is_directory)
            });
    }

    children
        .into_values()
        .map(|mut child| {
            if recursive && child.is_directory {
                child.children = Some(build_dir_entries(&child.path, entries, true));
            }
            child
        })
        .collect()
}

#[async_trait]
impl AppFs for VirtualFs {
    #[tracing::instrument(level = "debug", skip(self, text), fields(len = text.len()))]
    async fn write_text_file(&self, path: &str, text: &str) -> VfsResult<()> {
        let key = require_path(path)?;
        self.put_file(key, Content::Text(text.to_string())).await
    }

    #[tracing::instrument(level = "debug", skip(self, bytes), fields(len = bytes.len()))]
    async fn write_file(&self, path: &str, bytes: &[u8]) -> VfsResult<()> {
        let key = require_path(path)?;
        self.put_file(key, Content::Bytes(bytes.to_vec())).await
    }

    async fn read_text_file(&self, path: &str) -> VfsResult<String> {
        let key = require_path(path)?;
        let content = self.file_content(&key).await?;
        content.into_text().ok_or(VfsError::InvalidUtf8(key))
    }

    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let key = require_path(path)?;
        Ok(self.file_content(&key).await?.into_bytes())
    }

    async fn exists(&self, path: &str) -> VfsResult<bool> {
        let key = store_key(path);
        if key.is_empty() {
            return Ok(true);
        }
        Ok(self.store.get(&key).await?.is_some())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn mkdir(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let key = require_path(path)?;
        let parent = parent_path(&key);
        if !recursive && !self.exists(parent).await? {
            return Err(VfsError::ParentMissing(parent.to_string()));
        }
        if let Some(existing) = self.store.get(&key).await? {
            if existing.is_file() {
                return Err(VfsError::Conflict(key));
            }
        }
        self.ensure_dir_chain(&key).await
    }

    async fn read_dir(&self, path: &str, recursive: bool) -> VfsResult<Vec<DirEntry>> {
        let key = store_key(path);
        if !key.is_empty() && self.store.get(&key).await?.is_none() {
            return Err(VfsError::DirectoryNotFound(key));
        }
        let all = self.store.list().await?;
        Ok(build_dir_entries(&key, &all, recursive))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn remove(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let key = store_key(path);
        if key.is_empty() {
            if !recursive {
                return Err(VfsError::RootRemoval);
            }
            let all: Vec<String> = self.store.list().await?.into_iter().map(|e| e.path).collect();
            tracing::debug!(entries = all.len(), "clearing store");
            return self.store.delete_many(&all).await;
        }
        let key = require_path(path)?;

        let entry = self.store.get(&key).await?;
        let descendants = self.descendants(&key).await?;
        if entry.is_none() && descendants.is_empty() {
            return Ok(());
        }

        let is_directory = entry.as_ref().is_some_and(Entry::is_directory);
        if (is_directory || !descendants.is_empty()) && !recursive {
            return Err(VfsError::DirectoryNotEmpty(key));
        }

        let mut doomed: Vec<String> = descendants.into_iter().map(|e| e.path).collect();
        if entry.is_some() {
            doomed.push(key);
        }
        self.store.delete_many(&doomed).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn copy_file(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = require_path(from)?;
        let to = require_path(to)?;
        let content = self.file_content(&from).await?;
        self.put_file(to, content).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = require_path(from)?;
        let to = require_path(to)?;

        let entry = self
            .store
            .get(&from)
            .await?
            .ok_or_else(|| VfsError::FileNotFound(from.clone()))?;
        if from == to {
            return Ok(());
        }

        if entry.is_directory() {
            return self.rename_dir(&from, &to).await;
        }

        // Copy then delete: a failure in between leaves both paths present.
        self.copy_file(&from, &to).await?;
        self.store.delete(&from).await
    }
}
