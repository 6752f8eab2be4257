//! # wikipack testkit
//!
//! Test utilities for wikipack.
//!
//! This crate provides:
//! - Dump fixtures that write MediaWiki-shaped XML exports
//! - Scratch output directories that build and reopen archives
//! - Property-based generators for titles, markup and page sets
//! - Cross-crate invariant checks over finished archives
//!
//! ## Usage
//!
//! ```rust
//! use wikipack_testkit::prelude::*;
//!
//! let dump = DumpBuilder::new()
//!     .page(DumpPage::content(1, "Cat", "fur"))
//!     .page(DumpPage::redirect(2, "Dog", "Cat"))
//!     .build();
//! let output = TempOutput::new();
//! let summary = output.build(&dump, |config| config);
//! assert_eq!(summary.entry_count, 2);
//! check_archive(&output.reader());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
