//! In-memory entry store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::entry_store::{Entry, EntryStore, StoreBackend};
use crate::error::{VfsError, VfsResult};

/// Entry store held entirely in memory. All data is lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with initial entries.
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = Entry>,
    {
        let entries = entries.into_iter().map(|e| (e.path.clone(), e)).collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn get(&self, path: &str) -> VfsResult<Option<Entry>> {
        let entries = self.entries.read().map_err(|_| VfsError::LockPoisoned)?;
        Ok(entries.get(path).cloned())
    }

    async fn put(&self, entry: Entry) -> VfsResult<()> {
        let mut entries = self.entries.write().map_err(|_| VfsError::LockPoisoned)?;
        entries.insert(entry.path.clone(), entry);
        Ok(())
    }

    async fn delete(&self, path: &str) -> VfsResult<()> {
        let mut entries = self.entries.write().map_err(|_| VfsError::LockPoisoned)?;
        entries.remove(path);
        Ok(())
    }

    async fn list(&self) -> VfsResult<Vec<Entry>> {
        let entries = self.entries.read().map_err(|_| VfsError::LockPoisoned)?;
        Ok(entries.values().cloned().collect())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Content;

    #[tokio::test]
    async fn test_put_get_replace() {
        let store = MemoryEntryStore::new();
        store
            .put(Entry::file("save.json", Content::Text("1".into())))
            .await
            .unwrap();
        store
            .put(Entry::file("save.json", Content::Bytes(vec![2])))
            .await
            .unwrap();

        let entry = store.get("save.json").await.unwrap().unwrap();
        assert_eq!(entry.content(), Some(&Content::Bytes(vec![2])));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_returns_copy() {
        let store = MemoryEntryStore::new();
        store
            .put(Entry::file("bin", Content::Bytes(vec![1, 2, 3])))
            .await
            .unwrap();

        let mut first = store.get("bin").await.unwrap().unwrap();
        if let crate::store::Node::File {
            content: Content::Bytes(bytes),
        } = &mut first.node
        {
            bytes[0] = 99;
        }

        let second = store.get("bin").await.unwrap().unwrap();
        assert_eq!(second.content(), Some(&Content::Bytes(vec![1, 2, 3])));
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = MemoryEntryStore::with_entries([Entry::directory("a"), Entry::directory("b")]);
        store.delete("a").await.unwrap();
        store.delete("missing").await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed, vec![Entry::directory("b")]);
    }
}
