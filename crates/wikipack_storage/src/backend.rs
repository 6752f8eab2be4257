//! Storage backend trait definition.

use crate::error::StorageResult;

/// A positional byte store holding one segment's bytes.
///
/// Backends are **opaque byte stores**. The segment allocator hands out
/// non-overlapping ranges and writers fill them with `write_at`, possibly
/// from several threads at once.
///
/// # Invariants
///
/// - `read_at` returns exactly the bytes previously written at that range
/// - `size` is the high-water mark of all completed writes
/// - Writes to disjoint ranges may run concurrently
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For segment files
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The read would extend beyond the current size
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` starting at `offset`.
    ///
    /// Any gap between the previous end of storage and `offset` reads back
    /// as zero bytes until it is written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Flushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&self) -> StorageResult<()>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}
