//! Native filesystem backend.
//!
//! Same contract as `VirtualFs`, but over a real directory. Paths are
//! canonicalized with the same rules, so `..` can never climb out of the root.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use tokio::fs;

use crate::app_fs::{decode_utf8, AppFs, DirEntry};
use crate::error::{VfsError, VfsResult};
use crate::path::{parent_path, require_path, store_key};

type ListFuture<'a> = Pin<Box<dyn Future<Output = VfsResult<Vec<DirEntry>>> + Send + 'a>>;

/// Filesystem rooted at a directory on the host.
///
/// All operations are relative to `root`: `read_file("saves/a.json")` reads
/// `{root}/saves/a.json`. Missing ancestors are created on write, matching
/// `VirtualFs`.
#[derive(Debug, Clone)]
pub struct NativeFs {
    root: PathBuf,
}

/// What a host path currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Missing,
    File,
    Directory,
}

impl NativeFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, key: &str) -> PathBuf {
        if key.is_empty() {
            self.root.clone()
        } else {
            self.root.join(key)
        }
    }

    async fn kind(&self, key: &str) -> VfsResult<Kind> {
        match fs::metadata(self.host_path(key)).await {
            Ok(meta) if meta.is_dir() => Ok(Kind::Directory),
            Ok(_) => Ok(Kind::File),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Kind::Missing),
            Err(e) => Err(e.into()),
        }
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

            match self.kind(&current).await? {
                Kind::File => return Err(VfsError::NotADirectory(current)),
                Kind::Directory => {}
                Kind::Missing => fs::create_dir(self.host_path(&current)).await?,
            }
        }
        Ok(())
    }

    async fn put_file(&self, key: &str, bytes: &[u8]) -> VfsResult<()> {
        self.ensure_dir_chain(parent_path(key)).await?;
        if self.kind(key).await? == Kind::Directory {
            return Err(VfsError::Conflict(key.to_string()));
        }
        fs::write(self.host_path(key), bytes).await?;
        Ok(())
    }

    async fn file_bytes(&self, key: &str) -> VfsResult<Vec<u8>> {
        if self.kind(key).await? != Kind::File {
            return Err(VfsError::FileNotFound(key.to_string()));
        }
        Ok(fs::read(self.host_path(key)).await?)
    }

    async fn is_empty_dir(&self, key: &str) -> VfsResult<bool> {
        let mut dir = fs::read_dir(self.host_path(key)).await?;
        Ok(dir.next_entry().await?.is_none())
    }

    fn list_dir(&self, key: String, recursive: bool) -> ListFuture<'_> {
        Box::pin(async move {
            let mut children = Vec::new();
            let mut dir = fs::read_dir(self.host_path(&key)).await?;

            while let Some(entry) = dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let path = if key.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", key, name)
                };
                let is_directory = entry.file_type().await?.is_dir();
                children.push(DirEntry::new(path, name, is_directory));
            }

            children.sort_by(|a, b| a.name.cmp(&b.name));
            if recursive {
                for child in children.iter_mut().filter(|c| c.is_directory) {
                    child.children = Some(self.list_dir(child.path.clone(), true).await?);
                }
            }
            Ok(children)
        })
    }
}

#[async_trait]
impl AppFs for NativeFs {
    async fn write_text_file(&self, path: &str, text: &str) -> VfsResult<()> {
        let key = require_path(path)?;
        self.put_file(&key, text.as_bytes()).await
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> VfsResult<()> {
        let key = require_path(path)?;
        self.put_file(&key, bytes).await
    }

    async fn read_text_file(&self, path: &str) -> VfsResult<String> {
        let key = require_path(path)?;
        let bytes = self.file_bytes(&key).await?;
        decode_utf8(&key, bytes)
    }

    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let key = require_path(path)?;
        self.file_bytes(&key).await
    }

    async fn exists(&self, path: &str) -> VfsResult<bool> {
        let key = store_key(path);
        if key.is_empty() {
            return Ok(true);
        }
        Ok(self.kind(&key).await? != Kind::Missing)
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let key = require_path(path)?;
        let parent = parent_path(&key);
        if !recursive && !self.exists(parent).await? {
            return Err(VfsError::ParentMissing(parent.to_string()));
        }
        if self.kind(&key).await? == Kind::File {
            return Err(VfsError::Conflict(key));
        }
        self.ensure_dir_chain(&key).await
    }

    async fn read_dir(&self, path: &str, recursive: bool) -> VfsResult<Vec<DirEntry>> {
        let key = store_key(path);
        match self.kind(&key).await? {
            Kind::Directory => self.list_dir(key, recursive).await,
            Kind::File => Ok(Vec::new()),
            Kind::Missing if key.is_empty() => Ok(Vec::new()),
            Kind::Missing => Err(VfsError::DirectoryNotFound(key)),
        }
    }

    async fn remove(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let key = store_key(path);
        if key.is_empty() {
            if !recursive {
                return Err(VfsError::RootRemoval);
            }
            if self.kind("").await? != Kind::Directory {
                return Ok(());
            }
            let mut dir = fs::read_dir(&self.root).await?;
            while let Some(entry) = dir.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    fs::remove_dir_all(entry.path()).await?;
                } else {
                    fs::remove_file(entry.path()).await?;
                }
            }
            return Ok(());
        }
        let key = require_path(path)?;

        match self.kind(&key).await? {
            Kind::Missing => Ok(()),
            Kind::File => Ok(fs::remove_file(self.host_path(&key)).await?),
            Kind::Directory if !recursive => Err(VfsError::DirectoryNotEmpty(key)),
            Kind::Directory => Ok(fs::remove_dir_all(self.host_path(&key)).await?),
        }
    }

    async fn copy_file(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = require_path(from)?;
        let to = require_path(to)?;
        let bytes = self.file_bytes(&from).await?;
        self.put_file(&to, &bytes).await
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = require_path(from)?;
        let to = require_path(to)?;

        let source = self.kind(&from).await?;
        if source == Kind::Missing {
            return Err(VfsError::FileNotFound(from));
        }
        if from == to {
            return Ok(());
        }
        if to.starts_with(&format!("{}/", from)) {
            return Err(VfsError::InvalidPath(format!(
                "cannot move \"{}\" into itself",
                from
            )));
        }

        self.ensure_dir_chain(parent_path(&to)).await?;
        let target = self.kind(&to).await?;
        if target != Kind::Missing && target != source {
            return Err(VfsError::Conflict(to));
        }
        if target == Kind::Directory && !self.is_empty_dir(&to).await? {
            return Err(VfsError::DestinationNotEmpty(to));
        }
        fs::rename(self.host_path(&from), self.host_path(&to)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFs::new(dir.path());

        fs.write_text_file("/saves/slot1.json", "{}").await.unwrap();
        assert_eq!(fs.read_text_file("saves/slot1.json").await.unwrap(), "{}");
        assert!(dir.path().join("saves").is_dir());
    }

    #[tokio::test]
    async fn test_mkdir_parent_missing() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFs::new(dir.path());

        let err = fs.mkdir("a/b", false).await.unwrap_err();
        assert!(err.to_string().contains("Parent directory does not exist"));
        fs.mkdir("a/b", true).await.unwrap();
        assert!(fs.exists("a/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_dir_tree() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFs::new(dir.path());
        fs.write_text_file("a/b/c.txt", "hi").await.unwrap();

        let listing = fs.read_dir("a", true).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "b");
        assert!(listing[0].is_directory);
        let children = listing[0].children.as_ref().unwrap();
        assert_eq!(children[0].name, "c.txt");
        assert_eq!(children[0].path, "a/b/c.txt");
        assert!(children[0].is_file);
    }

    #[tokio::test]
    async fn test_remove_requires_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFs::new(dir.path());
        fs.write_text_file("tree/file.txt", "x").await.unwrap();

        let err = fs.remove("tree", false).await.unwrap_err();
        assert!(err.to_string().contains("recursive"));
        fs.remove("tree", true).await.unwrap();
        assert!(!fs.exists("tree").await.unwrap());
        fs.remove("tree", false).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_root_clears_contents() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFs::new(dir.path());
        fs.write_text_file("a/x.txt", "x").await.unwrap();
        fs.write_text_file("y.txt", "y").await.unwrap();

        assert!(matches!(fs.remove("/", false).await, Err(VfsError::RootRemoval)));
        fs.remove("/", true).await.unwrap();
        assert!(fs.read_dir("", false).await.unwrap().is_empty());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_rename_and_copy() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFs::new(dir.path());
        fs.write_file("old.bin", &[1, 2]).await.unwrap();

        fs.copy_file("old.bin", "backup/old.bin").await.unwrap();
        fs.rename("old.bin", "new/new.bin").await.unwrap();

        assert!(!fs.exists("old.bin").await.unwrap());
        assert_eq!(fs.read_file("new/new.bin").await.unwrap(), vec![1, 2]);
        assert_eq!(fs.read_file("backup/old.bin").await.unwrap(), vec![1, 2]);

        let err = fs.rename("missing", "x").await.unwrap_err();
        assert_eq!(err.to_string(), "File not found: missing");
    }

    #[tokio::test]
    async fn test_rename_onto_ancestor_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFs::new(dir.path());
        fs.write_text_file("a/b/x", "1").await.unwrap();
        fs.write_text_file("a/b/b/x", "2").await.unwrap();

        let err = fs.rename("a/b", "a").await.unwrap_err();
        assert!(matches!(err, VfsError::DestinationNotEmpty(p) if p == "a"));
        assert_eq!(fs.read_text_file("a/b/x").await.unwrap(), "1");
        assert_eq!(fs.read_text_file("a/b/b/x").await.unwrap(), "2");
    }
}
