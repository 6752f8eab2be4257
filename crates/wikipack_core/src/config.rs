//! Build configuration.

use crate::error::{CoreError, CoreResult};
use crate::namespace::NamespaceFilter;
use crate::payload::Compression;
use std::path::PathBuf;

/// Configuration for building an archive.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory the archive is written into.
    pub output_dir: PathBuf,

    /// Whether payloads are gzip-compressed.
    pub compress: bool,

    /// Number of write worker threads.
    pub workers: usize,

    /// Number of batches that may wait for a worker before `submit` blocks.
    pub queue_capacity: usize,

    /// Records per batch handed to the workers.
    pub batch_size: usize,

    /// Soft size cap of a single segment file.
    pub max_segment_size: u64,

    /// Records between two progress callbacks.
    pub progress_interval: u64,

    /// Stop after this many records, if set.
    pub limit: Option<u64>,

    /// Namespaces whose records are kept.
    pub namespaces: NamespaceFilter,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("wikipack-out"),
            compress: true,
            workers: 4,
            queue_capacity: 64,
            batch_size: 300,
            max_segment_size: 1024 * 1024 * 1024, // 1 GiB
            progress_interval: 10_000,
            limit: None,
            namespaces: NamespaceFilter::default(),
        }
    }
}

impl BuildConfig {
    /// Creates a configuration with default values writing to `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Sets whether payloads are compressed.
    #[must_use]
    pub const fn compress(mut self, value: bool) -> Self {
        self.compress = value;
        self
    }

    /// Sets the number of write workers.
    #[must_use]
    pub const fn workers(mut self, count: usize) -> Self {
        self.workers = count;
        self
    }

    /// Sets the batch queue capacity.
    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the segment size cap.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the progress interval.
    #[must_use]
    pub const fn progress_interval(mut self, records: u64) -> Self {
        self.progress_interval = records;
        self
    }

    /// Sets the maximum number of records to ingest.
    #[must_use]
    pub const fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the accepted namespaces.
    #[must_use]
    pub const fn namespaces(mut self, filter: NamespaceFilter) -> Self {
        self.namespaces = filter;
        self
    }

    /// Returns the payload compression mode.
    #[must_use]
    pub fn compression(&self) -> Compression {
        Compression::from_flag(self.compress)
    }

    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] naming the first zero setting.
    pub fn validate(&self) -> CoreResult<()> {
        let zero = [
            ("workers", self.workers == 0),
            ("queue_capacity", self.queue_capacity == 0),
            ("batch_size", self.batch_size == 0),
            ("max_segment_size", self.max_segment_size == 0),
            ("progress_interval", self.progress_interval == 0),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((name, _)) => Err(CoreError::invalid_config(format!("{name} must be positive"))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;

    #[test]
    fn default_config() {
        let config = BuildConfig::default();
        assert!(config.compress);
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.batch_size, 300);
        assert_eq!(config.max_segment_size, 1 << 30);
        assert_eq!(config.progress_interval, 10_000);
        assert!(config.limit.is_none());
        assert!(config.namespaces.contains(Namespace::Article));
        assert!(!config.namespaces.contains(Namespace::ArticleTalk));
        config.validate().unwrap();
    }

    #[test]
    fn builder_pattern() {
        let config = BuildConfig::new("/tmp/out")
            .compress(false)
            .workers(2)
            .batch_size(10)
            .limit(Some(5));

        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.compression(), Compression::None);
        assert_eq!(config.workers, 2);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.limit, Some(5));
    }

    #[test]
    fn zero_settings_are_rejected() {
        let cases = [
            BuildConfig::default().workers(0),
            BuildConfig::default().queue_capacity(0),
            BuildConfig::default().batch_size(0),
            BuildConfig::default().max_segment_size(0),
            BuildConfig::default().progress_interval(0),
        ];
        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(CoreError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn error_names_the_setting() {
        let err = BuildConfig::default().batch_size(0).validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }
}
