//! Segment allocation and writes.

use crate::error::{CoreError, CoreResult};
use crate::segment::opener::SegmentOpener;
use crate::types::{Location, SegmentId};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::{debug, info};
use wikipack_storage::{StorageBackend, StorageError};

/// Allocation state, only ever touched under the store mutex.
struct AllocState {
    /// Every segment opened so far, indexed by segment id.
    segments: Vec<Arc<dyn StorageBackend>>,
    /// Bytes handed out per segment. The last entry is the write cursor.
    allocated: Vec<u64>,
    closed: bool,
}

/// Append-only multi-file byte store.
///
/// `allocate` reserves a range under a single mutex; `write` fills a
/// reserved range outside of it, so writers holding different ranges never
/// wait on each other.
///
/// # Rotation
///
/// A new segment is opened when none exists yet, or when the active segment
/// already holds data and the next range would bring it to
/// `max_segment_size` or beyond. The cap is soft: a payload larger than the
/// cap still lands whole in a single segment.
pub struct SegmentStore {
    opener: Box<dyn SegmentOpener>,
    max_segment_size: u64,
    state: Mutex<AllocState>,
}

impl SegmentStore {
    /// Creates a store that opens segments through `opener`.
    pub fn new(opener: Box<dyn SegmentOpener>, max_segment_size: u64) -> Self {
        Self {
            opener,
            max_segment_size,
            state: Mutex::new(AllocState {
                segments: Vec::new(),
                allocated: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Returns the configured soft size cap.
    #[must_use]
    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }

    /// Reserves `size` bytes and returns where they live.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] after [`close`](Self::close), and
    /// [`CoreError::StorageWriteFailed`] for a zero-sized request or if a new
    /// segment cannot be created.
    pub fn allocate(&self, size: u64) -> CoreResult<Location> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CoreError::StoreClosed);
        }

        let next_id = SegmentId::new(state.segments.len() as u32);
        if size == 0 {
            return Err(invalid_write(
                Location::new(next_id, 0, 0),
                "zero-sized allocation",
            ));
        }

        let rotate = match state.allocated.last() {
            None => true,
            Some(&cursor) => cursor > 0 && cursor.saturating_add(size) >= self.max_segment_size,
        };

        if rotate {
            let backend = self
                .opener
                .open(next_id)
                .map_err(|source| CoreError::StorageWriteFailed {
                    location: Location::new(next_id, 0, size),
                    source,
                })?;
            if let Some(&previous) = state.allocated.last() {
                info!(
                    segment_id = next_id.as_u32(),
                    previous_size = previous,
                    "segment full, rotating"
                );
            } else {
                debug!(segment_id = next_id.as_u32(), "opened first segment");
            }
            state.segments.push(backend);
            state.allocated.push(0);
        }

        let segment_id = SegmentId::new((state.segments.len() - 1) as u32);
        let cursor = state
            .allocated
            .last_mut()
            .ok_or_else(|| invalid_write(Location::new(segment_id, 0, size), "no active segment"))?;
        let location = Location::new(segment_id, *cursor, size);
        *cursor += size;
        Ok(location)
    }

    /// Writes `data` into a range previously returned by `allocate`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] after [`close`](Self::close), and
    /// [`CoreError::StorageWriteFailed`] if the length does not match the
    /// location, the segment is unknown, or the backend write fails.
    pub fn write(&self, location: Location, data: &[u8]) -> CoreResult<()> {
        if data.len() as u64 != location.length {
            return Err(invalid_write(
                location,
                format!("{} bytes for a {}-byte range", data.len(), location.length),
            ));
        }

        let backend = self.backend(location)?;
        backend
            .write_at(location.offset, data)
            .map_err(|source| CoreError::StorageWriteFailed { location, source })
    }

    /// Reads the bytes stored at `location`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the range is unreadable.
    pub fn read(&self, location: Location) -> CoreResult<Vec<u8>> {
        let backend = self.backend(location)?;
        Ok(backend.read_at(location.offset, location.length as usize)?)
    }

    /// Returns the number of segments opened so far.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.state.lock().allocated.len()
    }

    /// Returns the bytes allocated in each segment, indexed by segment id.
    ///
    /// Once all writes have completed these are the final segment sizes.
    #[must_use]
    pub fn allocated_sizes(&self) -> Vec<u64> {
        self.state.lock().allocated.clone()
    }

    /// Flushes, syncs and releases every segment ever opened.
    ///
    /// All segments are attempted even if one fails; the first failure is
    /// returned. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first flush or sync failure.
    pub fn close(&self) -> CoreResult<()> {
        let segments = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            std::mem::take(&mut state.segments)
        };

        let mut first_error = None;
        for (id, backend) in segments.iter().enumerate() {
            if let Err(e) = backend.flush().and_then(|()| backend.sync()) {
                tracing::error!(segment_id = id, error = %e, "failed to sync segment");
                first_error.get_or_insert(e);
            }
        }
        info!(segments = segments.len(), "segment store closed");

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn backend(&self, location: Location) -> CoreResult<Arc<dyn StorageBackend>> {
        let state = self.state.lock();
        if state.closed {
            return Err(CoreError::StoreClosed);
        }
        state
            .segments
            .get(location.segment_id.as_u32() as usize)
            .cloned()
            .ok_or_else(|| invalid_write(location, "unknown segment"))
    }
}

impl std::fmt::Debug for SegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStore")
            .field("max_segment_size", &self.max_segment_size)
            .field("segment_count", &self.segment_count())
            .finish_non_exhaustive()
    }
}

fn invalid_write(location: Location, message: impl Into<String>) -> CoreError {
    CoreError::StorageWriteFailed {
        location,
        source: StorageError::Io(io::Error::new(io::ErrorKind::InvalidInput, message.into())),
    }
}
