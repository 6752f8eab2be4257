//! Core type definitions for wikipack.

use std::fmt;

/// Identifier of one segment file.
///
/// Segment ids start at zero and increase by one per rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u32);

impl SegmentId {
    /// Creates a new segment ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the id of the segment opened after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the segment's file name inside the output directory.
    #[must_use]
    pub fn file_name(self) -> String {
        format!("dat.{}", self.0)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}

/// A byte range inside one segment file.
///
/// Locations are handed out by the segment allocator and never overlap
/// within a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Segment holding the bytes.
    pub segment_id: SegmentId,
    /// Offset of the first byte.
    pub offset: u64,
    /// Number of bytes.
    pub length: u64,
}

impl Location {
    /// Creates a new location.
    #[must_use]
    pub const fn new(segment_id: SegmentId, offset: u64, length: u64) -> Self {
        Self {
            segment_id,
            offset,
            length,
        }
    }

    /// Returns the offset one past the last byte.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Returns true if both ranges are in the same segment and share a byte.
    #[must_use]
    pub fn overlaps(&self, other: &Location) -> bool {
        self.segment_id == other.segment_id
            && self.offset < other.end()
            && other.offset < self.end()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}+{}", self.segment_id, self.offset, self.length)
    }
}
