//! Durable entry store backed by a single JSON document.
//!
//! The whole store lives in one file. Every mutation is a transaction:
//! - apply the change to a copy of the in-memory image
//! - write the image to a sibling temp file
//! - rename the temp file over the document
//! - only then swap the copy in as the new image
//!
//! A crash mid-write leaves either the old or the new document on disk, and a
//! failed write leaves the in-memory image untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::entry_store::{Entry, EntryStore, StoreBackend};
use crate::error::{VfsError, VfsResult};

const DOCUMENT_VERSION: u32 = 1;

/// On-disk layout of the store document.
#[derive(Debug, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    entries: Vec<Entry>,
}

/// Borrowed form of [`StoreDocument`] for writing.
#[derive(Serialize)]
struct StoreDocumentRef<'a> {
    version: u32,
    entries: Vec<&'a Entry>,
}

/// Entry store persisted to a JSON file. Survives process restarts.
#[derive(Debug)]
pub struct FileEntryStore {
    path: PathBuf,
    image: Mutex<HashMap<String, Entry>>,
}

impl FileEntryStore {
    /// Open the store at `path`, creating parent directories if needed.
    ///
    /// A missing document opens as an empty store; nothing is written until
    /// the first mutation. I/O failures are `StoreUnavailable`; a corrupt or
    /// unknown-version document is `Store`.
    pub async fn open(path: impl AsRef<Path>) -> VfsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let unavailable =
            |e: std::io::Error| VfsError::StoreUnavailable(format!("{}: {}", path.display(), e));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(unavailable)?;
        }

        let entries = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let doc: StoreDocument = serde_json::from_slice(&raw).map_err(|e| {
                    VfsError::Store(format!("{}: corrupt document: {}", path.display(), e))
                })?;
                if doc.version != DOCUMENT_VERSION {
                    return Err(VfsError::Store(format!(
                        "{}: unsupported document version {}",
                        path.display(),
                        doc.version
                    )));
                }
                doc.entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(unavailable(e)),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "opened durable store");

        Ok(Self {
            path,
            image: Mutex::new(entries.into_iter().map(|e| (e.path.clone(), e)).collect()),
        })
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write `image` to disk atomically.
    async fn commit(&self, image: &HashMap<String, Entry>) -> VfsResult<()> {
        let mut entries: Vec<&Entry> = image.values().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let raw = serde_json::to_vec(&StoreDocumentRef {
            version: DOCUMENT_VERSION,
            entries,
        })?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, &raw).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    /// Run `mutate` against a copy of the image and persist it.
    async fn transact<F>(&self, mutate: F) -> VfsResult<()>
    where
        F: FnOnce(&mut HashMap<String, Entry>) + Send,
    {
        let mut image = self.image.lock().await;
        let mut next = image.clone();
        mutate(&mut next);
        self.commit(&next).await?;
        *image = next;
        tracing::debug!(path = %self.path.display(), entries = image.len(), "committed store");
        Ok(())
    }
}

#[async_trait]
impl EntryStore for FileEntryStore {
    async fn get(&self, path: &str) -> VfsResult<Option<Entry>> {
        Ok(self.image.lock().await.get(path).cloned())
    }

    async fn put(&self, entry: Entry) -> VfsResult<()> {
        self.transact(move |image| {
            image.insert(entry.path.clone(), entry);
        })
        .await
    }

    async fn delete(&self, path: &str) -> VfsResult<()> {
        if !self.image.lock().await.contains_key(path) {
            return Ok(());
        }
        self.transact(|image| {
            image.remove(path);
        })
        .await
    }

    async fn list(&self) -> VfsResult<Vec<Entry>> {
        Ok(self.image.lock().await.values().cloned().collect())
    }

    async fn put_many(&self, entries: Vec<Entry>) -> VfsResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.transact(move |image| {
            for entry in entries {
                image.insert(entry.path.clone(), entry);
            }
        })
        .await
    }

    async fn delete_many(&self, paths: &[String]) -> VfsResult<()> {
        {
            let image = self.image.lock().await;
            if !paths.iter().any(|p| image.contains_key(p)) {
                return Ok(());
            }
        }
        self.transact(|image| {
            for path in paths {
                image.remove(path);
            }
        })
        .await
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Durable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Content;

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("saves").join("store.json");

        {
            let store = FileEntryStore::open(&doc).await.unwrap();
            store.put(Entry::directory("slot")).await.unwrap();
            store
                .put(Entry::file("slot/save.bin", Content::Bytes(vec![1, 2, 3])))
                .await
                .unwrap();
        }

        let reopened = FileEntryStore::open(&doc).await.unwrap();
        let entry = reopened.get("slot/save.bin").await.unwrap().unwrap();
        assert_eq!(entry.content(), Some(&Content::Bytes(vec![1, 2, 3])));
        assert_eq!(reopened.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEntryStore::open(dir.path().join("none.json")).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_delete_persists() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("store.json");

        let store = FileEntryStore::open(&doc).await.unwrap();
        store.put(Entry::directory("a")).await.unwrap();
        store.delete("a").await.unwrap();
        store.delete("never-existed").await.unwrap();

        let reopened = FileEntryStore::open(&doc).await.unwrap();
        assert!(reopened.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("store.json");
        std::fs::write(&doc, b"not json").unwrap();

        let err = FileEntryStore::open(&doc).await.unwrap_err();
        assert!(matches!(err, VfsError::Store(_)));
        assert!(err.to_string().contains("corrupt document"));
    }

    #[tokio::test]
    async fn test_unknown_version_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("store.json");
        std::fs::write(&doc, br#"{"version":99,"entries":[]}"#).unwrap();

        let err = FileEntryStore::open(&doc).await.unwrap_err();
        assert!(matches!(err, VfsError::Store(_)));
        assert!(err.to_string().contains("version 99"));
    }

    #[tokio::test]
    async fn test_unreadable_path_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileEntryStore::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, VfsError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_batch_put_and_delete_persist() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("store.json");

        let store = FileEntryStore::open(&doc).await.unwrap();
        store
            .put_many(vec![
                Entry::directory("slot"),
                Entry::file("slot/a.json", Content::Text("a".into())),
                Entry::file("slot/b.json", Content::Text("b".into())),
            ])
            .await
            .unwrap();
        store
            .delete_many(&["slot/a.json".to_string(), "missing".to_string()])
            .await
            .unwrap();

        let reopened = FileEntryStore::open(&doc).await.unwrap();
        let mut paths: Vec<String> = reopened
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["slot", "slot/b.json"]);
    }

    #[tokio::test]
    async fn test_batch_of_missing_paths_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEntryStore::open(dir.path().join("store.json")).await.unwrap();

        store.delete_many(&["a".to_string(), "b".to_string()]).await.unwrap();
        store.put_many(Vec::new()).await.unwrap();
        assert!(!store.path().exists());
    }
}
