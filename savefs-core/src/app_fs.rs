//! AppFs trait - the filesystem contract application code is written against.
//!
//! `VirtualFs` implements it over an entry store, `NativeFs` over a real
//! directory. Code generic over `AppFs` runs unchanged on either.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{VfsError, VfsResult};

/// One node in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    /// Canonical path of the child (no leading slash).
    pub path: String,
    /// Last path segment.
    pub name: String,
    pub is_file: bool,
    pub is_directory: bool,
    /// Populated for directories in recursive listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DirEntry>>,
}

impl DirEntry {
    pub(crate) fn new(path: String, name: String, is_directory: bool) -> Self {
        Self {
            path,
            name,
            is_file: !is_directory,
            is_directory,
            children: None,
        }
    }
}

/// Filesystem operations over `/`-separated paths.
///
/// Writes create missing ancestor directories. Removing a non-empty
/// directory requires `recursive`.
#[async_trait]
pub trait AppFs: Send + Sync {
    /// Write a text file, replacing any previous content.
    async fn write_text_file(&self, path: &str, text: &str) -> VfsResult<()>;

    /// Write a binary file, replacing any previous content.
    async fn write_file(&self, path: &str, bytes: &[u8]) -> VfsResult<()>;

    /// Read a file as UTF-8 text.
    async fn read_text_file(&self, path: &str) -> VfsResult<String>;

    /// Read a file as bytes.
    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// True for the root and for any stored file or directory.
    async fn exists(&self, path: &str) -> VfsResult<bool>;

    /// Create a directory. Without `recursive` the parent must exist.
    async fn mkdir(&self, path: &str, recursive: bool) -> VfsResult<()>;

    /// List a directory, sorted by name.
    async fn read_dir(&self, path: &str, recursive: bool) -> VfsResult<Vec<DirEntry>>;

    /// Remove a file or directory. Missing paths are a no-op.
    async fn remove(&self, path: &str, recursive: bool) -> VfsResult<()>;

    /// Copy a file, leaving the source untouched.
    async fn copy_file(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Move a file or directory. Not atomic across a crash.
    async fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Read and deserialize a JSON document.
    async fn read_json<T>(&self, path: &str) -> VfsResult<T>
    where
        Self: Sized,
        T: DeserializeOwned + Send,
    {
        let text = self.read_text_file(path).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Serialize `value` as pretty JSON and write it.
    async fn write_json<T>(&self, path: &str, value: &T) -> VfsResult<()>
    where
        Self: Sized,
        T: Serialize + Sync,
    {
        let text = serde_json::to_string_pretty(value)?;
        self.write_text_file(path, &text).await
    }
}

/// Reject a UTF-8 decode failure with the offending path.
pub(crate) fn decode_utf8(path: &str, bytes: Vec<u8>) -> VfsResult<String> {
    String::from_utf8(bytes).map_err(|_| VfsError::InvalidUtf8(path.to_string()))
}
