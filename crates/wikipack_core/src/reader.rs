//! Read access to finished archives.

use crate::dir::{is_segment_file, meta_path, segment_path};
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexEntry, IndexSettings, MetadataIndex};
use crate::payload::{decode_payload, Compression};
pub use crate::payload::Page;
use crate::types::{Location, SegmentId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use wikipack_storage::{FileBackend, StorageBackend};

/// Redirects followed before a lookup gives up.
pub const MAX_REDIRECT_HOPS: usize = 8;

/// A title lookup after following redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// The entry holding the page.
    pub entry: IndexEntry,
    /// Titles passed through on the way, starting with the requested one.
    pub redirects: Vec<String>,
}

/// Read-only view of a built archive directory.
///
/// Segment files are opened on first use and kept open.
pub struct ArchiveReader {
    dir: PathBuf,
    index: MetadataIndex,
    segments: Mutex<HashMap<SegmentId, Arc<FileBackend>>>,
}

impl ArchiveReader {
    /// Opens the archive in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if there is no `meta.db`, and
    /// [`CoreError::IndexNotFinalized`] if the build never completed.
    pub fn open(dir: &Path) -> CoreResult<Self> {
        let index = MetadataIndex::open_read_only(&meta_path(dir))?;
        debug!(dir = %dir.display(), compression = ?index.compression(), "opened archive");
        Ok(Self {
            dir: dir.to_path_buf(),
            index,
            segments: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the archive directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns how payloads are stored.
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.index.compression()
    }

    /// Returns the underlying index.
    #[must_use]
    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    /// Returns the build facts recorded in the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be read.
    pub fn settings(&self) -> CoreResult<IndexSettings> {
        self.index.settings()
    }

    /// Looks up an entry by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no record has this id.
    pub fn entry_by_id(&self, id: u64) -> CoreResult<IndexEntry> {
        self.index
            .entry_by_id(id)?
            .ok_or_else(|| CoreError::not_found(id.to_string()))
    }

    /// Looks up an entry by exact title.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no record has this title.
    pub fn entry_by_title(&self, title: &str) -> CoreResult<IndexEntry> {
        self.index
            .entry_by_title(title)?
            .ok_or_else(|| CoreError::not_found(title))
    }

    /// Returns up to `limit` entries whose title starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be queried.
    pub fn titles_with_prefix(&self, prefix: &str, limit: usize) -> CoreResult<Vec<IndexEntry>> {
        self.index
            .ids_with_title_prefix(prefix, limit)?
            .into_iter()
            .map(|id| self.entry_by_id(id))
            .collect()
    }

    /// Full-text search over titles.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be queried.
    pub fn search(&self, query: &str, limit: usize) -> CoreResult<Vec<(u64, String)>> {
        self.index.search_titles(query, limit)
    }

    /// Follows redirects from `title` to the entry holding a page.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if a title along the way is missing,
    /// the chain loops, or it is longer than [`MAX_REDIRECT_HOPS`].
    pub fn resolve(&self, title: &str) -> CoreResult<Resolved> {
        let mut entry = self.entry_by_title(title)?;
        let mut redirects = Vec::new();

        while let Some(target) = entry.redirect.clone() {
            if redirects.len() >= MAX_REDIRECT_HOPS || redirects.contains(&target) {
                return Err(CoreError::not_found(format!(
                    "{title} (redirect chain does not end)"
                )));
            }
            redirects.push(std::mem::take(&mut entry.title));
            entry = self.entry_by_title(&target)?;
        }

        Ok(Resolved { entry, redirects })
    }

    /// Reads and decodes the payload of a stored entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIndexEntry`] for a redirect entry and
    /// [`CoreError::CorruptPayload`] if the stored title does not match.
    pub fn read_page(&self, entry: &IndexEntry) -> CoreResult<Page> {
        let location = entry
            .location
            .ok_or_else(|| CoreError::invalid_index_entry(entry.id, "redirect has no payload"))?;
        let page = self.read_location(location)?;
        if page.title != entry.title {
            return Err(CoreError::corrupt_payload(
                location,
                format!("stored title {:?}, index title {:?}", page.title, entry.title),
            ));
        }
        Ok(page)
    }

    /// Reads and decodes the payload at `location`.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be read or the bytes do not
    /// decode.
    pub fn read_location(&self, location: Location) -> CoreResult<Page> {
        let segment = self.segment(location.segment_id)?;
        let bytes = segment.read_at(location.offset, location.length as usize)?;
        decode_payload(&bytes, self.compression(), location)
    }

    /// Returns the on-disk size of every `dat.<n>` file, by segment id.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn segment_sizes(&self) -> CoreResult<Vec<(SegmentId, u64)>> {
        let mut sizes = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !is_segment_file(&name) {
                continue;
            }
            if let Some(id) = name.strip_prefix("dat.").and_then(|n| n.parse().ok()) {
                sizes.push((SegmentId::new(id), entry.metadata()?.len()));
            }
        }
        sizes.sort_unstable();
        Ok(sizes)
    }

    fn segment(&self, id: SegmentId) -> CoreResult<Arc<FileBackend>> {
        let mut segments = self.segments.lock();
        if let Some(backend) = segments.get(&id) {
            return Ok(Arc::clone(backend));
        }
        let path = segment_path(&self.dir, id);
        if !path.is_file() {
            return Err(CoreError::not_found(path.display().to_string()));
        }
        let backend = Arc::new(FileBackend::open(&path)?);
        segments.insert(id, Arc::clone(&backend));
        Ok(backend)
    }
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("dir", &self.dir)
            .field("compression", &self.compression())
            .finish_non_exhaustive()
    }
}
