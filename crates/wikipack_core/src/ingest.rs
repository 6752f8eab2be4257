//! Build orchestration.
//!
//! [`Ingestor`] owns one build from start to finish:
//!
//! 1. Reserve the output directory and create the metadata index
//! 2. Parse the dump and hand batches of records to the write pool
//! 3. Drain the pool once the dump (or the record limit) is exhausted
//! 4. Finalize the index, then close the segments
//!
//! If anything fails the pool is still drained and the segments closed
//! before the error is returned.

use crate::config::BuildConfig;
use crate::coordinator::{CoordinatorStats, WriteContext, WriteCoordinator};
use crate::dir::OutputDir;
use crate::error::CoreResult;
use crate::index::{FullTextSink, MetadataIndex};
use crate::parser::RecordStream;
use crate::render::Renderer;
use crate::segment::{SegmentOpener, SegmentStore};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Records yielded by the parser.
    pub records_parsed: u64,
    /// Pages dropped by the namespace filter.
    pub records_filtered: u64,
    /// Write pool counters.
    pub writes: CoordinatorStats,
    /// Final size of every segment, indexed by segment id.
    pub segment_sizes: Vec<u64>,
    /// Rows in the finalized index.
    pub entry_count: u64,
    /// Wall time of the build.
    pub elapsed: Duration,
}

impl BuildSummary {
    /// Returns the number of segment files written.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segment_sizes.len()
    }
}

/// Counts reported by the parsing loop.
struct Parsed {
    yielded: u64,
    filtered: u64,
}

/// Drives one archive build.
pub struct Ingestor {
    config: BuildConfig,
    dir: OutputDir,
    store: Arc<SegmentStore>,
    index: Arc<MetadataIndex>,
    renderer: Arc<dyn Renderer>,
    full_text: Option<Arc<dyn FullTextSink>>,
}

impl Ingestor {
    /// Prepares a build into `config.output_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the output
    /// directory is unusable or already holds a build, or the index cannot
    /// be created. Nothing is parsed in that case.
    pub fn create(config: BuildConfig, renderer: Arc<dyn Renderer>) -> CoreResult<Self> {
        config.validate()?;
        let dir = OutputDir::create(&config.output_dir)?;
        let opener = Box::new(dir.segments());
        Self::assemble(config, dir, opener, renderer)
    }

    /// Prepares a build whose segments come from `opener` instead of the
    /// output directory.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub fn create_with_opener(
        config: BuildConfig,
        opener: Box<dyn SegmentOpener>,
        renderer: Arc<dyn Renderer>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let dir = OutputDir::create(&config.output_dir)?;
        Self::assemble(config, dir, opener, renderer)
    }

    fn assemble(
        config: BuildConfig,
        dir: OutputDir,
        opener: Box<dyn SegmentOpener>,
        renderer: Arc<dyn Renderer>,
    ) -> CoreResult<Self> {
        let index = MetadataIndex::create(&dir.meta_path(), config.compression())?;
        let store = SegmentStore::new(opener, config.max_segment_size);
        Ok(Self {
            config,
            dir,
            store: Arc::new(store),
            index: Arc::new(index),
            renderer,
            full_text: None,
        })
    }

    /// Feeds every stored record to `sink` as well.
    #[must_use]
    pub fn with_full_text(mut self, sink: Arc<dyn FullTextSink>) -> Self {
        self.full_text = Some(sink);
        self
    }

    /// Returns the output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the segment store being written.
    #[must_use]
    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    /// Returns the index being written.
    #[must_use]
    pub fn index(&self) -> &Arc<MetadataIndex> {
        &self.index
    }

    /// Runs the build over `input`.
    ///
    /// `progress` is called on this thread with the last title and the
    /// running record count every `progress_interval` records.
    ///
    /// # Errors
    ///
    /// Returns the first parse, storage or index error. Resources are
    /// released before returning.
    pub fn ingest<R, F>(self, input: R, mut progress: F) -> CoreResult<BuildSummary>
    where
        R: BufRead,
        F: FnMut(&str, u64),
    {
        let started = Instant::now();
        info!(
            output = %self.dir.path().display(),
            workers = self.config.workers,
            compress = self.config.compress,
            "starting build"
        );

        let context = WriteContext {
            store: Arc::clone(&self.store),
            index: Arc::clone(&self.index),
            renderer: Arc::clone(&self.renderer),
            compression: self.config.compression(),
            full_text: self.full_text.clone(),
        };
        let coordinator = match WriteCoordinator::start(
            context,
            self.config.workers,
            self.config.queue_capacity,
        ) {
            Ok(coordinator) => coordinator,
            Err(e) => {
                self.release();
                return Err(e);
            }
        };

        let parsed = match self.drive(&coordinator, input, &mut progress) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error = %e, "build aborted, draining write pool");
                if let Err(drain_err) = coordinator.finish() {
                    warn!(error = %drain_err, "write pool also failed while draining");
                }
                self.release();
                return Err(e);
            }
        };

        let writes = match coordinator.finish() {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "write pool failed");
                self.release();
                return Err(e);
            }
        };

        match self.complete(parsed, writes, started) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    fn drive<R, F>(
        &self,
        coordinator: &WriteCoordinator,
        input: R,
        progress: &mut F,
    ) -> CoreResult<Parsed>
    where
        R: BufRead,
        F: FnMut(&str, u64),
    {
        let batch_size = self.config.batch_size;
        let interval = self.config.progress_interval;
        let mut stream =
            RecordStream::new(input, self.config.namespaces).with_limit(self.config.limit);
        let mut batch = Vec::with_capacity(batch_size);
        let mut count = 0u64;

        for record in &mut stream {
            let record = record?;
            count += 1;
            if count % interval == 0 {
                progress(&record.title, count);
            }
            batch.push(record);
            if batch.len() >= batch_size {
                coordinator.submit(std::mem::replace(&mut batch, Vec::with_capacity(batch_size)))?;
            }
        }
        coordinator.submit(batch)?;

        Ok(Parsed {
            yielded: stream.yielded(),
            filtered: stream.filtered(),
        })
    }

    /// Finalizes the index and closes the segments, in that order.
    fn complete(&self, parsed: Parsed, writes: CoordinatorStats, started: Instant) -> CoreResult<BuildSummary> {
        let segment_sizes = self.store.allocated_sizes();
        self.index
            .put_setting("segment_count", &segment_sizes.len().to_string())?;
        self.index
            .put_setting("max_segment_size", &self.config.max_segment_size.to_string())?;
        self.index.finalize()?;
        self.store.close()?;
        if let Some(sink) = &self.full_text {
            sink.close()?;
        }

        let summary = BuildSummary {
            records_parsed: parsed.yielded,
            records_filtered: parsed.filtered,
            writes,
            segment_sizes,
            entry_count: self.index.entry_count()?,
            elapsed: started.elapsed(),
        };
        info!(
            records = summary.records_parsed,
            filtered = summary.records_filtered,
            stored = summary.writes.records_stored,
            redirects = summary.writes.redirects_indexed,
            skipped = summary.writes.records_empty
                + summary.writes.records_failed
                + summary.writes.records_unwritten,
            segments = summary.segment_count(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "build complete"
        );
        Ok(summary)
    }

    /// Best-effort close after a failure.
    fn release(&self) {
        if let Err(e) = self.store.close() {
            warn!(error = %e, "failed to close segments during cleanup");
        }
    }
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("config", &self.config)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::render::HtmlRenderer;
    use std::fs;
    use tempfile::tempdir;

    fn page(id: u64, title: &str, ns: i32, text: &str) -> String {
        format!(
            "<page><title>{title}</title><ns>{ns}</ns><id>{id}</id>\
             <revision><id>{}</id><text>{text}</text></revision></page>",
            id + 1000
        )
    }

    fn dump(pages: &[String]) -> String {
        format!("<mediawiki>{}</mediawiki>", pages.concat())
    }

    fn renderer() -> Arc<dyn Renderer> {
        Arc::new(HtmlRenderer::new())
    }

    #[test]
    fn builds_and_finalizes() {
        let root = tempdir().unwrap();
        let out = root.path().join("out");
        let config = BuildConfig::new(&out).batch_size(2).workers(2);
        let ingestor = Ingestor::create(config, renderer()).unwrap();
        let index = Arc::clone(ingestor.index());

        let xml = dump(&[
            page(1, "Cat", 0, "fur"),
            page(2, "Dog", 0, "bark"),
            page(3, "Cow", 0, "moo"),
        ]);
        let summary = ingestor.ingest(xml.as_bytes(), |_, _| {}).unwrap();

        // The trailing partial batch is written too.
        assert_eq!(summary.records_parsed, 3);
        assert_eq!(summary.writes.records_stored, 3);
        assert_eq!(summary.entry_count, 3);
        assert_eq!(summary.segment_count(), 1);
        assert!(index.is_finalized());
        assert!(out.join("meta.db").is_file());
        assert!(out.join("dat.0").is_file());

        let settings = index.settings().unwrap();
        assert_eq!(settings.segment_count, Some(1));
        assert_eq!(settings.entry_count, Some(3));
    }

    #[test]
    fn progress_fires_every_interval() {
        let root = tempdir().unwrap();
        let config = BuildConfig::new(root.path()).progress_interval(2);
        let ingestor = Ingestor::create(config, renderer()).unwrap();

        let pages: Vec<String> = (1..=5).map(|i| page(i, &format!("P{i}"), 0, "x")).collect();
        let mut calls = Vec::new();
        ingestor
            .ingest(dump(&pages).as_bytes(), |title, count| {
                calls.push((title.to_string(), count));
            })
            .unwrap();

        assert_eq!(calls, vec![("P2".to_string(), 2), ("P4".to_string(), 4)]);
    }

    #[test]
    fn limit_stops_early() {
        let root = tempdir().unwrap();
        let config = BuildConfig::new(root.path()).limit(Some(2));
        let ingestor = Ingestor::create(config, renderer()).unwrap();
        let index = Arc::clone(ingestor.index());

        let pages: Vec<String> = (1..=5).map(|i| page(i, &format!("P{i}"), 0, "x")).collect();
        let summary = ingestor.ingest(dump(&pages).as_bytes(), |_, _| {}).unwrap();

        assert_eq!(summary.records_parsed, 2);
        assert_eq!(index.entry_count().unwrap(), 2);
        assert!(index.entry_by_id(3).unwrap().is_none());
    }

    #[test]
    fn excluded_namespaces_never_reach_the_pool() {
        let root = tempdir().unwrap();
        let ingestor = Ingestor::create(BuildConfig::new(root.path()), renderer()).unwrap();

        let xml = dump(&[page(1, "Cat", 0, "fur"), page(2, "Talk:Cat", 1, "chat")]);
        let summary = ingestor.ingest(xml.as_bytes(), |_, _| {}).unwrap();

        assert_eq!(summary.records_parsed, 1);
        assert_eq!(summary.records_filtered, 1);
        assert_eq!(summary.entry_count, 1);
    }

    #[test]
    fn malformed_id_aborts_and_releases() {
        let root = tempdir().unwrap();
        let ingestor = Ingestor::create(BuildConfig::new(root.path()), renderer()).unwrap();
        let store = Arc::clone(ingestor.store());

        let xml = dump(&[
            page(1, "Cat", 0, "fur"),
            "<page><title>Bad</title><ns>0</ns><id>x1</id></page>".to_string(),
        ]);
        let err = ingestor.ingest(xml.as_bytes(), |_, _| {}).unwrap_err();

        assert!(matches!(err, CoreError::MalformedField { field: "id", .. }));
        assert!(matches!(store.allocate(1), Err(CoreError::StoreClosed)));
    }

    #[test]
    fn setup_errors_happen_before_parsing() {
        let root = tempdir().unwrap();
        let err = Ingestor::create(BuildConfig::new(root.path()).workers(0), renderer()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
        assert!(!root.path().join("meta.db").exists());

        fs::write(root.path().join("dat.0"), b"old").unwrap();
        let err = Ingestor::create(BuildConfig::new(root.path()), renderer()).unwrap_err();
        assert!(matches!(err, CoreError::OutputNotEmpty { .. }));
    }

    #[test]
    fn finished_directory_cannot_be_rebuilt() {
        let root = tempdir().unwrap();
        let ingestor = Ingestor::create(BuildConfig::new(root.path()), renderer()).unwrap();
        ingestor
            .ingest(dump(&[page(1, "Cat", 0, "fur")]).as_bytes(), |_, _| {})
            .unwrap();

        let err = Ingestor::create(BuildConfig::new(root.path()), renderer()).unwrap_err();
        assert!(matches!(err, CoreError::OutputNotEmpty { .. }));
    }
}
