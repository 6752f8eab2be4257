//! # wikipack core
//!
//! Turns a MediaWiki XML export into an offline archive: append-only
//! segment files holding rendered pages plus a SQLite metadata index that
//! maps ids and titles to redirects or payload locations.
//!
//! This crate provides:
//! - A streaming dump parser ([`RecordStream`])
//! - Size-capped segment storage with concurrent writers ([`SegmentStore`])
//! - The metadata index ([`MetadataIndex`])
//! - A bounded write pool with backpressure ([`WriteCoordinator`])
//! - Build orchestration ([`Ingestor`]) and read access ([`ArchiveReader`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wikipack_core::{BuildConfig, HtmlRenderer, Ingestor};
//!
//! let config = BuildConfig::new("out").workers(8);
//! let ingestor = Ingestor::create(config, Arc::new(HtmlRenderer::new()))?;
//! let dump = std::io::BufReader::new(std::fs::File::open("dump.xml")?);
//! let summary = ingestor.ingest(dump, |title, count| println!("{count} {title}"))?;
//! println!("{} entries", summary.entry_count);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod dir;
pub mod error;
pub mod index;
pub mod ingest;
pub mod namespace;
pub mod parser;
pub mod payload;
pub mod reader;
pub mod record;
pub mod render;
pub mod segment;
pub mod types;

pub use config::BuildConfig;
pub use coordinator::{CoordinatorStats, WriteContext, WriteCoordinator};
pub use dir::OutputDir;
pub use error::{CoreError, CoreResult};
pub use index::{FullTextSink, IndexEntry, IndexSettings, MetadataIndex};
pub use ingest::{BuildSummary, Ingestor};
pub use namespace::{Namespace, NamespaceFilter};
pub use parser::RecordStream;
pub use payload::{decode_payload, encode_payload, Compression, Page};
pub use reader::{ArchiveReader, Resolved, MAX_REDIRECT_HOPS};
pub use record::Record;
pub use render::{HtmlRenderer, Renderer};
pub use segment::{DirectorySegments, InMemorySegments, SegmentOpener, SegmentStore};
pub use types::{Location, SegmentId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
