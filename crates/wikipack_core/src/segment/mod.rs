//! Segment storage for rendered pages.
//!
//! Segments are append-only files named `dat.<n>`. The store hands out
//! non-overlapping byte ranges from the active segment and rotates to a new
//! segment once the active one reaches the configured size cap.
//!
//! ## Segment Layout
//!
//! ```text
//! | payload 0 | payload 1 | ... | payload k |
//! ```
//!
//! Payloads carry no framing of their own beyond the title prefix; offsets
//! and lengths live in the metadata index.

mod opener;
mod store;

pub use opener::{DirectorySegments, InMemorySegments, SegmentOpener};
pub use store::SegmentStore;
