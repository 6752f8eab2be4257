//! # wikipack storage
//!
//! Byte-store backends underneath wikipack segment files.
//!
//! Backends are **opaque positional byte stores**: callers decide where bytes
//! go and the backend puts them there. They know nothing about payloads,
//! titles or the metadata index.
//!
//! ## Design Principles
//!
//! - Writes are positional (`write_at`), so writers holding disjoint ranges
//!   never wait on each other
//! - All operations take `&self`; backends are `Send + Sync` and shared via `Arc`
//! - wikipack owns all payload interpretation
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing
//! - [`FileBackend`] - For segment files on disk
//!
//! ## Example
//!
//! ```rust
//! use wikipack_storage::{StorageBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.write_at(0, b"hello world").unwrap();
//! let data = backend.read_at(6, 5).unwrap();
//! assert_eq!(&data, b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
