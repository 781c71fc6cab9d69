//! Local persistence with a filesystem-shaped API
//!
//! This crate provides the pieces needed to keep application state on a
//! flat key-value store while code talks in paths, files and directories:
//! - Path algebra shared by every backend
//! - Entry stores (durable JSON document, in-memory fallback)
//! - A virtual filesystem derived from the flat store
//! - A native filesystem with the same contract
//! - A coalescing write queue for high-frequency saves
//!
//! # Architecture
//!
//! - `EntryStore` trait: flat path-keyed storage of file/directory entries
//! - `AppFs` trait: filesystem operations (`VirtualFs`, `NativeFs`)
//! - `CoalescingWriteQueue`: single-flight saves with retry and backoff

pub mod app_fs;
pub mod config;
pub mod error;
pub mod native;
pub mod path;
pub mod queue;
pub mod store;
pub mod vfs;

pub use app_fs::{AppFs, DirEntry};
pub use config::{SavefsConfig, StoreConfig};
pub use error::{VfsError, VfsResult};
pub use native::NativeFs;
pub use path::BaseDirectory;
pub use queue::{Backoff, CoalescingWriteQueue, QueueOptions, TokioBackoff, WriteQueueBuilder};
pub use store::{
    open_store, Content, Entry, EntryStore, FileEntryStore, MemoryEntryStore, Node, StoreBackend,
};
pub use vfs::VirtualFs;
