//! Factories for segment backends.

use crate::types::SegmentId;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wikipack_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageResult};

/// Opens the backend for a newly started segment.
pub trait SegmentOpener: Send + Sync {
    /// Creates the storage for segment `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment storage cannot be created.
    fn open(&self, id: SegmentId) -> StorageResult<Arc<dyn StorageBackend>>;
}

/// Segment files inside an output directory.
#[derive(Debug, Clone)]
pub struct DirectorySegments {
    dir: PathBuf,
}

impl DirectorySegments {
    /// Creates an opener writing `dat.<n>` files into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory segments are created in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SegmentOpener for DirectorySegments {
    fn open(&self, id: SegmentId) -> StorageResult<Arc<dyn StorageBackend>> {
        let backend = FileBackend::create(&self.dir.join(id.file_name()))?;
        Ok(Arc::new(backend))
    }
}

/// In-memory segments, kept for inspection.
#[derive(Debug, Default, Clone)]
pub struct InMemorySegments {
    opened: Arc<Mutex<Vec<Arc<InMemoryBackend>>>>,
}

impl InMemorySegments {
    /// Creates an opener with no segments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the backends opened so far, indexed by segment id.
    #[must_use]
    pub fn segments(&self) -> Vec<Arc<InMemoryBackend>> {
        self.opened.lock().clone()
    }
}

impl SegmentOpener for InMemorySegments {
    fn open(&self, id: SegmentId) -> StorageResult<Arc<dyn StorageBackend>> {
        let backend = Arc::new(InMemoryBackend::new());
        let mut opened = self.opened.lock();
        debug_assert_eq!(opened.len(), id.as_u32() as usize);
        opened.push(Arc::clone(&backend));
        Ok(backend)
    }
}
