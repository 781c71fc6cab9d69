//! EntryStore trait - flat, path-keyed record storage.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VfsResult;

/// File content as it was written.
///
/// Text and bytes are kept apart so a text write reads back without a
/// decode step, but either accessor works on either variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "lowercase")]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
}

impl Content {
    /// Content as raw bytes, encoding text as UTF-8.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Text(text) => text.into_bytes(),
            Content::Bytes(bytes) => bytes,
        }
    }

    /// Content as text, decoding bytes as UTF-8.
    pub fn into_text(self) -> Option<String> {
        match self {
            Content::Text(text) => Some(text),
            Content::Bytes(bytes) => String::from_utf8(bytes).ok(),
        }
    }
}

/// What a stored path denotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    File { content: Content },
    #[serde(rename = "dir")]
    Directory,
}

/// One stored record, keyed by its canonical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub path: String,
    #[serde(flatten)]
    pub node: Node,
}

impl Entry {
    pub fn file(path: impl Into<String>, content: Content) -> Self {
        Self {
            path: path.into(),
            node: Node::File { content },
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            node: Node::Directory,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.node, Node::File { .. })
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.node, Node::Directory)
    }

    /// File content, or None for a directory.
    pub fn content(&self) -> Option<&Content> {
        match &self.node {
            Node::File { content } => Some(content),
            Node::Directory => None,
        }
    }
}

/// Which backend a store is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Durable,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => f.write_str("memory"),
            StoreBackend::Durable => f.write_str("durable"),
        }
    }
}

/// Flat key-value store holding at most one [`Entry`] per canonical path.
///
/// Stores own their data: `get` and `list` hand out copies, and `put` takes
/// ownership of the entry, so callers never alias stored content.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Look up the entry at exactly `path`.
    async fn get(&self, path: &str) -> VfsResult<Option<Entry>>;

    /// Insert or fully replace the entry at `entry.path`.
    async fn put(&self, entry: Entry) -> VfsResult<()>;

    /// Delete the entry at `path`. Deleting a missing path is not an error.
    async fn delete(&self, path: &str) -> VfsResult<()>;

    /// Snapshot of every stored entry, in no particular order.
    async fn list(&self) -> VfsResult<Vec<Entry>>;

    /// Insert or replace several entries. Backends that persist should
    /// override this to write once.
    async fn put_many(&self, entries: Vec<Entry>) -> VfsResult<()> {
        for entry in entries {
            self.put(entry).await?;
        }
        Ok(())
    }

    /// Delete several paths. Missing paths are skipped.
    async fn delete_many(&self, paths: &[String]) -> VfsResult<()> {
        for path in paths {
            self.delete(path).await?;
        }
        Ok(())
    }

    fn backend(&self) -> StoreBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_conversions() {
        assert_eq!(Content::Text("hi".into()).into_bytes(), b"hi".to_vec());
        assert_eq!(
            Content::Bytes(b"hi".to_vec()).into_text(),
            Some("hi".to_string())
        );
        assert_eq!(Content::Bytes(vec![0xFF, 0xFE]).into_text(), None);
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = Entry::file("a/b.txt", Content::Text("x".into()));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["path"], "a/b.txt");
        assert_eq!(json["kind"], "file");
        assert_eq!(json["content"]["encoding"], "text");

        let dir = serde_json::to_value(Entry::directory("a")).unwrap();
        assert_eq!(dir["kind"], "dir");

        let back: Entry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
