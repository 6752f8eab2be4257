//! Metadata index for built archives.
//!
//! The index maps a record id to either a redirect target or the location
//! of its payload, and maps titles back to ids. It is written in batches
//! while the archive is being built and becomes readable once
//! [`MetadataIndex::finalize`] has run.
//!
//! # Store layout
//!
//! ```text
//! meta.db
//! ├─ android_metadata(locale)
//! ├─ wiki(_id, title, redirect, segment_id, position, length)
//! ├─ titles            FTS5 over title, rowid = _id
//! └─ meta(key, value)  compressed_values, format_version, ...
//! ```

mod entry;
mod fulltext;
mod metadata;

pub use entry::IndexEntry;
pub use fulltext::FullTextSink;
pub use metadata::{IndexSettings, MetadataIndex, FORMAT_VERSION};
