//! Error types for wikipack core.

use crate::types::Location;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while building or reading an archive.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] wikipack_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Metadata store error.
    #[error("metadata store error: {0}")]
    Index(#[from] rusqlite::Error),

    /// The input document is not well-formed markup.
    #[error("dump syntax error at byte {position}: {source}")]
    Xml {
        /// Byte offset in the input where the tokenizer failed.
        position: u64,
        /// Underlying tokenizer error.
        #[source]
        source: quick_xml::Error,
    },

    /// An identifier or namespace field could not be parsed.
    #[error("malformed <{field}> field: {value:?}")]
    MalformedField {
        /// Element name of the field.
        field: &'static str,
        /// Raw text that failed to parse.
        value: String,
    },

    /// The renderer rejected a record's markup.
    #[error("render failed: {message}")]
    RenderFailed {
        /// Description of the failure.
        message: String,
    },

    /// A record payload could not be encoded.
    #[error("payload encoding failed: {message}")]
    EncodeFailed {
        /// Description of the failure.
        message: String,
    },

    /// Allocating or writing a segment range failed.
    #[error("segment write failed at {location}: {source}")]
    StorageWriteFailed {
        /// The range being written, or the range being allocated.
        location: Location,
        /// Underlying storage error.
        #[source]
        source: wikipack_storage::StorageError,
    },

    /// An index row does not satisfy the row invariants.
    #[error("invalid index entry for id {id}: {message}")]
    InvalidIndexEntry {
        /// Record identifier of the offending row.
        id: u64,
        /// Which invariant was violated.
        message: String,
    },

    /// The output directory holds a previous build.
    #[error("output directory is not empty: {path}")]
    OutputNotEmpty {
        /// The output directory.
        path: String,
    },

    /// The output path is unusable.
    #[error("invalid output directory: {message}")]
    InvalidOutputDir {
        /// Description of the problem.
        message: String,
    },

    /// Another process is building into the same directory.
    #[error("output directory locked: another build has exclusive access")]
    OutputLocked,

    /// The segment store has been closed.
    #[error("segment store is closed")]
    StoreClosed,

    /// Read access before the index was finalized.
    #[error("metadata index is not finalized")]
    IndexNotFinalized,

    /// Write access after the index was finalized.
    #[error("metadata index is already finalized")]
    IndexFinalized,

    /// The worker pool no longer accepts batches.
    #[error("write pool is closed")]
    PoolClosed,

    /// A worker thread panicked.
    #[error("write worker panicked: {message}")]
    WorkerPanicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// Build configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A stored payload could not be decoded.
    #[error("corrupt payload at {location}: {message}")]
    CorruptPayload {
        /// Where the payload was read from.
        location: Location,
        /// Description of the corruption.
        message: String,
    },

    /// No record with the requested id or title.
    #[error("not found: {key}")]
    NotFound {
        /// The id or title that was looked up.
        key: String,
    },
}

impl CoreError {
    /// Creates a malformed field error.
    pub fn malformed_field(field: &'static str, value: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            value: value.into(),
        }
    }

    /// Creates a render failed error.
    pub fn render_failed(message: impl Into<String>) -> Self {
        Self::RenderFailed {
            message: message.into(),
        }
    }

    /// Creates an encode failed error.
    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self::EncodeFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid index entry error.
    pub fn invalid_index_entry(id: u64, message: impl Into<String>) -> Self {
        Self::InvalidIndexEntry {
            id,
            message: message.into(),
        }
    }

    /// Creates an invalid output directory error.
    pub fn invalid_output_dir(message: impl Into<String>) -> Self {
        Self::InvalidOutputDir {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a corrupt payload error.
    pub fn corrupt_payload(location: Location, message: impl Into<String>) -> Self {
        Self::CorruptPayload {
            location,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Returns true for failures confined to a single record.
    ///
    /// Write workers skip the record and keep going on these; every other
    /// error fails the batch it occurred in.
    #[must_use]
    pub fn is_record_local(&self) -> bool {
        matches!(self, Self::RenderFailed { .. } | Self::EncodeFailed { .. })
    }
}
