//! Full-text indexing hook.

use crate::error::CoreResult;

/// Receives the raw markup of every stored content record.
///
/// Nothing in the build depends on a sink being present. Implementations
/// are called concurrently from write workers and must not assume any
/// ordering between records.
pub trait FullTextSink: Send + Sync {
    /// Adds one record to the full-text index.
    ///
    /// # Errors
    ///
    /// A failure is logged and the record stays stored; it does not fail
    /// the batch.
    fn add(&self, id: u64, title: &str, markup: &str) -> CoreResult<()>;

    /// Flushes the full-text index once the build has drained.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be persisted.
    fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}
