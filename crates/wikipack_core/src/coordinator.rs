//! Bounded pool of write workers.
//!
//! The producer hands batches of records to [`WriteCoordinator::submit`].
//! Batches wait in a bounded queue; when it is full `submit` blocks until a
//! worker takes one, so memory stays bounded no matter how fast the parser
//! runs. Each worker renders, encodes, stores and indexes one batch at a
//! time:
//!
//! ```text
//! producer ──submit──▶ [ queue (capacity) ] ──▶ worker 0 ─┐
//!                                           ├─▶ worker 1 ─┼─▶ SegmentStore
//!                                           └─▶ worker n ─┘   MetadataIndex
//! ```
//!
//! Render and encode failures skip the record. A storage failure also
//! skips only its record, and the rest of the batch is still indexed. An
//! index failure aborts the batch. The first storage or index failure is
//! kept and reported by the next `submit` or by
//! [`WriteCoordinator::finish`].

use crate::error::{CoreError, CoreResult};
use crate::index::{FullTextSink, IndexEntry, MetadataIndex};
use crate::payload::{encode_payload, Compression};
use crate::record::Record;
use crate::render::Renderer;
use crate::segment::SegmentStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

type Batch = Vec<Record>;

/// Everything a worker writes to.
#[derive(Clone)]
pub struct WriteContext {
    /// Segment storage for payloads.
    pub store: Arc<SegmentStore>,
    /// Index receiving one upsert per batch.
    pub index: Arc<MetadataIndex>,
    /// Renders record markup.
    pub renderer: Arc<dyn Renderer>,
    /// Payload compression.
    pub compression: Compression,
    /// Optional full-text sink fed with every stored record.
    pub full_text: Option<Arc<dyn FullTextSink>>,
}

/// Counters describing the work done by the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Batches accepted by `submit`.
    pub batches_submitted: u64,
    /// Batches fully processed and indexed.
    pub batches_completed: u64,
    /// Batches aborted by an index failure.
    pub batches_failed: u64,
    /// Records stored as payloads.
    pub records_stored: u64,
    /// Redirect records indexed.
    pub redirects_indexed: u64,
    /// Records with neither redirect nor content.
    pub records_empty: u64,
    /// Records skipped after a render or encode failure.
    pub records_failed: u64,
    /// Records skipped after their payload could not be stored.
    pub records_unwritten: u64,
    /// Payload bytes written to segments.
    pub bytes_written: u64,
    /// Most batches ever accepted but not yet fully processed.
    pub max_in_flight: u64,
}

#[derive(Debug, Default)]
struct Counters {
    batches_submitted: AtomicU64,
    batches_completed: AtomicU64,
    batches_failed: AtomicU64,
    records_stored: AtomicU64,
    redirects_indexed: AtomicU64,
    records_empty: AtomicU64,
    records_failed: AtomicU64,
    records_unwritten: AtomicU64,
    bytes_written: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CoordinatorStats {
        CoordinatorStats {
            batches_submitted: self.batches_submitted.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            records_stored: self.records_stored.load(Ordering::Relaxed),
            redirects_indexed: self.redirects_indexed.load(Ordering::Relaxed),
            records_empty: self.records_empty.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            records_unwritten: self.records_unwritten.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            max_in_flight: self.max_in_flight.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct Shared {
    counters: Counters,
    failure: Mutex<Option<CoreError>>,
}

impl Shared {
    fn record_failure(&self, err: CoreError) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take_failure(&self) -> Option<CoreError> {
        self.failure.lock().take()
    }
}

/// Fixed pool of write workers behind a bounded queue.
pub struct WriteCoordinator {
    sender: Option<SyncSender<Batch>>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
    queue_capacity: usize,
}

impl WriteCoordinator {
    /// Starts `workers` threads sharing a queue of `queue_capacity` batches.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for zero workers or capacity,
    /// or an I/O error if a thread cannot be spawned.
    pub fn start(context: WriteContext, workers: usize, queue_capacity: usize) -> CoreResult<Self> {
        if workers == 0 || queue_capacity == 0 {
            return Err(CoreError::invalid_config(
                "write pool needs at least one worker and one queue slot",
            ));
        }

        let (sender, receiver) = mpsc::sync_channel::<Batch>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let shared = Arc::new(Shared::default());

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let receiver = Arc::clone(&receiver);
            let context = context.clone();
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("wikipack-writer-{i}"))
                .spawn(move || run_worker(&receiver, &context, &shared))?;
            handles.push(handle);
        }
        debug!(workers, queue_capacity, "write pool started");

        Ok(Self {
            sender: Some(sender),
            workers: handles,
            shared,
            queue_capacity,
        })
    }

    /// Returns the number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Returns the queue capacity in batches.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Hands a batch to the pool, blocking while the queue is full.
    ///
    /// Returns once the batch is accepted, not once it is written. Empty
    /// batches are ignored.
    ///
    /// # Errors
    ///
    /// Returns the first storage or index failure any worker has hit so
    /// far, or [`CoreError::PoolClosed`] if every worker is gone.
    pub fn submit(&self, batch: Vec<Record>) -> CoreResult<()> {
        if let Some(err) = self.shared.take_failure() {
            return Err(err);
        }
        if batch.is_empty() {
            return Ok(());
        }
        let sender = self.sender.as_ref().ok_or(CoreError::PoolClosed)?;

        let counters = &self.shared.counters;
        counters.in_flight.fetch_add(1, Ordering::AcqRel);
        if sender.send(batch).is_err() {
            counters.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(CoreError::PoolClosed);
        }
        let in_flight = counters.in_flight.load(Ordering::Acquire);
        counters.max_in_flight.fetch_max(in_flight, Ordering::Relaxed);
        Counters::add(&counters.batches_submitted, 1);
        Ok(())
    }

    /// Returns a snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        self.shared.counters.snapshot()
    }

    /// Closes the queue and waits for every accepted batch to finish.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WorkerPanicked`] if a worker panicked, otherwise
    /// the first storage or index failure not yet reported by `submit`.
    pub fn finish(mut self) -> CoreResult<CoordinatorStats> {
        let panicked = self.drain();
        if let Some(message) = panicked {
            return Err(CoreError::WorkerPanicked { message });
        }
        if let Some(err) = self.shared.take_failure() {
            return Err(err);
        }

        let stats = self.stats();
        debug!(
            batches = stats.batches_completed,
            stored = stats.records_stored,
            "write pool drained"
        );
        Ok(stats)
    }

    /// Drops the sender and joins all workers; returns the first panic.
    fn drain(&mut self) -> Option<String> {
        self.sender.take();
        let mut panicked = None;
        for handle in self.workers.drain(..) {
            if let Err(payload) = handle.join() {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(message = %message, "write worker panicked");
                panicked.get_or_insert(message);
            }
        }
        panicked
    }
}

impl Drop for WriteCoordinator {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            let _ = self.drain();
        }
    }
}

impl std::fmt::Debug for WriteCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCoordinator")
            .field("workers", &self.workers.len())
            .field("queue_capacity", &self.queue_capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

fn run_worker(receiver: &Mutex<Receiver<Batch>>, context: &WriteContext, shared: &Shared) {
    let counters = &shared.counters;
    loop {
        let batch = {
            let guard = receiver.lock();
            guard.recv()
        };
        let Ok(batch) = batch else {
            break;
        };

        match write_batch(context, shared, batch) {
            Ok(()) => Counters::add(&counters.batches_completed, 1),
            Err(e) => {
                error!(error = %e, "write batch failed");
                Counters::add(&counters.batches_failed, 1);
                shared.record_failure(e);
            }
        }
        counters.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

fn write_batch(context: &WriteContext, shared: &Shared, batch: Batch) -> CoreResult<()> {
    let counters = &shared.counters;
    let mut entries = Vec::with_capacity(batch.len());
    let mut bytes = 0u64;

    for record in &batch {
        match write_record(context, record) {
            Ok(Some(entry)) => {
                if let Some(location) = entry.location {
                    bytes += location.length;
                }
                entries.push(entry);
            }
            Ok(None) => {
                warn!(id = record.id, title = %record.title, "record has neither redirect nor content, skipping");
                Counters::add(&counters.records_empty, 1);
            }
            Err(e) if e.is_record_local() => {
                warn!(id = record.id, title = %record.title, error = %e, "skipping record");
                Counters::add(&counters.records_failed, 1);
            }
            Err(e) => {
                error!(id = record.id, title = %record.title, error = %e, "payload not stored, skipping record");
                Counters::add(&counters.records_unwritten, 1);
                shared.record_failure(e);
            }
        }
    }
    Counters::add(&counters.bytes_written, bytes);

    context.index.upsert(&entries)?;

    let redirects = entries.iter().filter(|e| e.is_redirect()).count() as u64;
    Counters::add(&counters.redirects_indexed, redirects);
    Counters::add(&counters.records_stored, entries.len() as u64 - redirects);
    Ok(())
}

/// Produces the index row for one record, storing its payload if needed.
///
/// Returns `None` for a record with neither redirect nor content.
fn write_record(context: &WriteContext, record: &Record) -> CoreResult<Option<IndexEntry>> {
    if let Some(target) = &record.redirect {
        return Ok(Some(IndexEntry::redirect(record.id, &record.title, target)));
    }
    let Some(markup) = &record.content else {
        return Ok(None);
    };

    let document = context.renderer.render(markup)?;
    let payload = encode_payload(&record.title, &document, context.compression)?;
    let location = context.store.allocate(payload.len() as u64)?;
    context.store.write(location, &payload)?;

    if let Some(sink) = &context.full_text {
        if let Err(e) = sink.add(record.id, &record.title, markup) {
            warn!(id = record.id, title = %record.title, error = %e, "full-text indexing failed");
        }
    }

    Ok(Some(IndexEntry::stored(record.id, &record.title, location)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::decode_payload;
    use crate::render::HtmlRenderer;
    use crate::segment::{InMemorySegments, SegmentOpener};
    use crate::types::SegmentId;
    use std::io;
    use std::time::Duration;
    use wikipack_storage::{StorageBackend, StorageError, StorageResult};

    fn context_with(opener: Box<dyn SegmentOpener>, renderer: Arc<dyn Renderer>) -> WriteContext {
        WriteContext {
            store: Arc::new(SegmentStore::new(opener, 1 << 20)),
            index: Arc::new(MetadataIndex::in_memory(Compression::Gzip).unwrap()),
            renderer,
            compression: Compression::Gzip,
            full_text: None,
        }
    }

    fn context() -> WriteContext {
        context_with(Box::new(InMemorySegments::new()), Arc::new(HtmlRenderer::new()))
    }

    #[test]
    fn stores_content_and_indexes_redirects() {
        let ctx = context();
        let pool = WriteCoordinator::start(ctx.clone(), 2, 4).unwrap();
        pool.submit(vec![Record::page(1, "Cat", "fur"), Record::redirect(2, "Dog", "Cat")])
            .unwrap();
        let stats = pool.finish().unwrap();

        assert_eq!(stats.batches_completed, 1);
        assert_eq!(stats.records_stored, 1);
        assert_eq!(stats.redirects_indexed, 1);

        ctx.index.finalize().unwrap();
        let cat = ctx.index.entry_by_id(1).unwrap().unwrap();
        let location = cat.location.unwrap();
        let page = decode_payload(&ctx.store.read(location).unwrap(), Compression::Gzip, location)
            .unwrap();
        assert_eq!(page.title, "Cat");
        assert_eq!(page.document, "<p>fur</p>");

        let dog = ctx.index.entry_by_id(2).unwrap().unwrap();
        assert_eq!(dog.redirect.as_deref(), Some("Cat"));
        assert!(dog.location.is_none());
    }

    #[test]
    fn redirect_with_body_is_not_stored() {
        let ctx = context();
        let mut record = Record::redirect(3, "Kitty", "Cat");
        record.content = Some("#REDIRECT [[Cat]]".into());

        let pool = WriteCoordinator::start(ctx.clone(), 1, 1).unwrap();
        pool.submit(vec![record]).unwrap();
        let stats = pool.finish().unwrap();

        assert_eq!(stats.bytes_written, 0);
        assert_eq!(ctx.store.segment_count(), 0);
    }

    #[test]
    fn empty_records_are_skipped_without_writes() {
        let ctx = context();
        let empty = Record {
            id: 9,
            title: "Nothing".into(),
            namespace: None,
            redirect: None,
            content: None,
        };

        let pool = WriteCoordinator::start(ctx.clone(), 1, 1).unwrap();
        pool.submit(vec![empty]).unwrap();
        let stats = pool.finish().unwrap();

        assert_eq!(stats.records_empty, 1);
        assert_eq!(ctx.store.segment_count(), 0);
        ctx.index.finalize().unwrap();
        assert!(ctx.index.entry_by_id(9).unwrap().is_none());
    }

    #[test]
    fn render_failure_skips_only_that_record() {
        let renderer = |markup: &str| -> CoreResult<String> {
            if markup.contains("bad") {
                Err(CoreError::render_failed("bad markup"))
            } else {
                Ok(markup.to_string())
            }
        };
        let ctx = context_with(Box::new(InMemorySegments::new()), Arc::new(renderer));

        let pool = WriteCoordinator::start(ctx.clone(), 1, 1).unwrap();
        pool.submit(vec![
            Record::page(1, "Good", "ok"),
            Record::page(2, "Bad", "bad"),
            Record::page(3, "Also good", "ok"),
        ])
        .unwrap();
        let stats = pool.finish().unwrap();

        assert_eq!(stats.records_failed, 1);
        assert_eq!(stats.records_stored, 2);
        ctx.index.finalize().unwrap();
        assert!(ctx.index.entry_by_id(2).unwrap().is_none());
        assert!(ctx.index.entry_by_id(3).unwrap().is_some());
    }

    struct FullDisk;

    impl SegmentOpener for FullDisk {
        fn open(&self, _id: SegmentId) -> StorageResult<Arc<dyn StorageBackend>> {
            Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }
    }

    #[test]
    fn storage_failure_is_reported_by_finish() {
        let ctx = context_with(Box::new(FullDisk), Arc::new(HtmlRenderer::new()));
        let pool = WriteCoordinator::start(ctx, 2, 2).unwrap();
        pool.submit(vec![Record::page(1, "Cat", "fur")]).unwrap();

        let err = pool.finish().unwrap_err();
        assert!(matches!(err, CoreError::StorageWriteFailed { .. }));
    }

    #[test]
    fn storage_failure_is_reported_by_next_submit() {
        let ctx = context_with(Box::new(FullDisk), Arc::new(HtmlRenderer::new()));
        let pool = WriteCoordinator::start(ctx, 1, 2).unwrap();
        pool.submit(vec![Record::page(1, "Cat", "fur")]).unwrap();

        for _ in 0..500 {
            if pool.stats().records_unwritten > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let err = pool.submit(vec![Record::page(2, "Dog", "bark")]).unwrap_err();
        assert!(matches!(err, CoreError::StorageWriteFailed { .. }));
    }

    /// Opens the first segment in memory and fails every later one.
    struct FirstSegmentOnly(InMemorySegments);

    impl SegmentOpener for FirstSegmentOnly {
        fn open(&self, id: SegmentId) -> StorageResult<Arc<dyn StorageBackend>> {
            if id.as_u32() == 0 {
                self.0.open(id)
            } else {
                Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
            }
        }
    }

    #[test]
    fn storage_failure_keeps_the_rest_of_the_batch() {
        let ctx = WriteContext {
            store: Arc::new(SegmentStore::new(
                Box::new(FirstSegmentOnly(InMemorySegments::new())),
                40,
            )),
            index: Arc::new(MetadataIndex::in_memory(Compression::None).unwrap()),
            renderer: Arc::new(HtmlRenderer::new()),
            compression: Compression::None,
            full_text: None,
        };

        let pool = WriteCoordinator::start(ctx.clone(), 1, 1).unwrap();
        pool.submit(vec![
            Record::page(1, "Cat", "fur"),
            Record::page(2, "Dog", "bark ".repeat(20)),
            Record::page(3, "Eel", "x"),
            Record::redirect(4, "Kitty", "Cat"),
        ])
        .unwrap();
        let err = pool.finish().unwrap_err();
        assert!(matches!(err, CoreError::StorageWriteFailed { .. }));

        ctx.index.finalize().unwrap();
        let cat = ctx.index.entry_by_id(1).unwrap().unwrap();
        assert_eq!(cat.location.unwrap().segment_id, SegmentId::new(0));
        assert!(ctx.index.entry_by_id(2).unwrap().is_none());
        assert!(ctx.index.entry_by_id(3).unwrap().is_some());
        assert!(ctx.index.entry_by_id(4).unwrap().unwrap().is_redirect());
        assert_eq!(ctx.store.segment_count(), 1);
    }

    #[test]
    fn in_flight_batches_are_bounded() {
        let slow = |markup: &str| -> CoreResult<String> {
            thread::sleep(Duration::from_millis(2));
            Ok(markup.to_string())
        };
        let ctx = context_with(Box::new(InMemorySegments::new()), Arc::new(slow));
        let (workers, capacity) = (2, 3);
        let pool = WriteCoordinator::start(ctx, workers, capacity).unwrap();

        for b in 0..40u64 {
            let batch = (0..3).map(|i| Record::page(b * 10 + i, format!("P{b}-{i}"), "x")).collect();
            pool.submit(batch).unwrap();
            assert!(pool.stats().max_in_flight <= (workers + capacity) as u64);
        }
        let stats = pool.finish().unwrap();

        assert_eq!(stats.batches_submitted, 40);
        assert_eq!(stats.batches_completed, 40);
        assert_eq!(stats.records_stored, 120);
        assert!(stats.max_in_flight <= (workers + capacity) as u64);
    }

    #[test]
    fn zero_sized_pool_is_rejected() {
        assert!(matches!(
            WriteCoordinator::start(context(), 0, 1),
            Err(CoreError::InvalidConfig { .. })
        ));
        assert!(matches!(
            WriteCoordinator::start(context(), 1, 0),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn empty_batch_is_ignored() {
        let pool = WriteCoordinator::start(context(), 1, 1).unwrap();
        pool.submit(Vec::new()).unwrap();
        assert_eq!(pool.finish().unwrap().batches_submitted, 0);
    }

    #[derive(Default)]
    struct Collecting(Mutex<Vec<u64>>);

    impl FullTextSink for Collecting {
        fn add(&self, id: u64, _title: &str, _markup: &str) -> CoreResult<()> {
            self.0.lock().push(id);
            Ok(())
        }
    }

    #[test]
    fn full_text_sink_sees_stored_records() {
        let sink = Arc::new(Collecting::default());
        let mut ctx = context();
        ctx.full_text = Some(Arc::clone(&sink) as Arc<dyn FullTextSink>);

        let pool = WriteCoordinator::start(ctx, 1, 1).unwrap();
        pool.submit(vec![Record::page(1, "Cat", "fur"), Record::redirect(2, "Dog", "Cat")])
            .unwrap();
        pool.finish().unwrap();

        assert_eq!(*sink.0.lock(), vec![1]);
    }

    #[test]
    fn dropping_the_pool_joins_workers() {
        let ctx = context();
        let pool = WriteCoordinator::start(ctx.clone(), 2, 2).unwrap();
        pool.submit(vec![Record::page(1, "Cat", "fur")]).unwrap();
        drop(pool);
        assert_eq!(ctx.store.segment_count(), 1);
    }
}
