//! Archive invariant checks and end-to-end build tests.
//!
//! The `check_*` functions inspect a finished archive and panic with a
//! description of the first violation found. They are meant to be called
//! from tests after a build.

use std::collections::BTreeMap;
use wikipack_core::{ArchiveReader, HtmlRenderer, IndexEntry, Location, Renderer, SegmentId};

use crate::fixtures::DumpPage;

/// Runs every invariant check against a finished archive.
pub fn check_archive(reader: &ArchiveReader) {
    check_exclusive(reader);
    check_round_trip(reader);
    check_packing(reader);
    if let Some(max) = reader.settings().expect("Failed to read settings").max_segment_size {
        check_segment_cap(reader, max);
    }
}

/// Every index row is either a redirect or a stored page, never both.
pub fn check_exclusive(reader: &ArchiveReader) {
    for entry in entries(reader) {
        assert!(
            entry.redirect.is_some() != entry.location.is_some(),
            "entry {} ({}) must have exactly one of redirect and location",
            entry.id,
            entry.title
        );
        if let Some(target) = &entry.redirect {
            assert!(!target.is_empty(), "entry {} has an empty redirect target", entry.id);
        }
    }
}

/// Every stored page decodes and carries the title it is indexed under.
pub fn check_round_trip(reader: &ArchiveReader) {
    for entry in entries(reader).into_iter().filter(|e| !e.is_redirect()) {
        let page = reader
            .read_page(&entry)
            .unwrap_or_else(|e| panic!("entry {} ({}) does not decode: {e}", entry.id, entry.title));
        assert_eq!(page.title, entry.title, "title mismatch for entry {}", entry.id);
    }
}

/// Records in a segment neither overlap nor leave gaps, and they end
/// exactly at the end of the file.
pub fn check_packing(reader: &ArchiveReader) {
    let by_segment = locations_by_segment(reader);
    let sizes: BTreeMap<SegmentId, u64> = reader
        .segment_sizes()
        .expect("Failed to read segment sizes")
        .into_iter()
        .collect();

    for (segment_id, locations) in &by_segment {
        let mut cursor = 0;
        for location in locations {
            assert_eq!(
                location.offset, cursor,
                "segment {} has a gap or overlap at {location}",
                segment_id.as_u32()
            );
            cursor = location.end();
        }
        assert_eq!(
            sizes.get(segment_id).copied(),
            Some(cursor),
            "segment {} size does not match its records",
            segment_id.as_u32()
        );
    }
}

/// A segment only reaches `max` when it holds a single record.
pub fn check_segment_cap(reader: &ArchiveReader, max: u64) {
    for (segment_id, locations) in locations_by_segment(reader) {
        if locations.len() <= 1 {
            continue;
        }
        let end = locations.last().map_or(0, Location::end);
        assert!(
            end < max,
            "segment {} holds {} records and ends at {end}, cap is {max}",
            segment_id.as_u32(),
            locations.len()
        );
    }
}

/// Checks that each page of a dump landed in the archive as expected:
/// redirects indexed with their target, bodies rendered and stored, empty
/// pages absent.
pub fn check_pages(reader: &ArchiveReader, pages: &[DumpPage]) {
    let renderer = HtmlRenderer::new();
    for page in pages {
        match (&page.redirect, &page.text) {
            (Some(target), _) => {
                let entry = reader.entry_by_id(page.id).expect("redirect not indexed");
                assert_eq!(entry.redirect.as_deref(), Some(target.as_str()));
                assert!(entry.location.is_none());
            }
            (None, Some(text)) if !text.is_empty() => {
                let entry = reader.entry_by_id(page.id).expect("page not indexed");
                assert_eq!(entry.title, page.title);
                let stored = reader.read_page(&entry).expect("page not readable");
                let expected = renderer.render(text).expect("render failed");
                assert_eq!(stored.document, expected, "document mismatch for {}", page.title);
            }
            _ => {
                assert!(
                    reader.entry_by_id(page.id).is_err(),
                    "empty page {} was indexed",
                    page.id
                );
            }
        }
    }
}

fn entries(reader: &ArchiveReader) -> Vec<IndexEntry> {
    reader.index().entries().expect("Failed to list entries")
}

fn locations_by_segment(reader: &ArchiveReader) -> BTreeMap<SegmentId, Vec<Location>> {
    let mut by_segment: BTreeMap<SegmentId, Vec<Location>> = BTreeMap::new();
    for location in entries(reader).into_iter().filter_map(|e| e.location) {
        by_segment.entry(location.segment_id).or_default().push(location);
    }
    for locations in by_segment.values_mut() {
        locations.sort_by_key(|l| l.offset);
    }
    by_segment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{DumpBuilder, TempOutput};
    use crate::generators::page_set_strategy;
    use proptest::prelude::*;
    use std::io;
    use std::sync::Arc;
    use wikipack_core::{CoreError, Namespace, NamespaceFilter, SegmentOpener};
    use wikipack_storage::{StorageBackend, StorageError, StorageResult};

    fn cat_and_dog() -> DumpBuilder {
        DumpBuilder::new()
            .page(DumpPage::content(1, "Cat", "'''Cats''' are [[mammal]]s."))
            .page(DumpPage::redirect(2, "Dog", "Cat"))
    }

    #[test]
    fn scenario_content_and_redirect() {
        let output = TempOutput::new();
        let summary = output.build(&cat_and_dog().build(), |config| config);

        assert_eq!(summary.records_parsed, 2);
        assert_eq!(summary.writes.records_stored, 1);
        assert_eq!(summary.writes.redirects_indexed, 1);
        assert_eq!(summary.entry_count, 2);
        assert_eq!(summary.segment_count(), 1);

        let reader = output.reader();
        check_archive(&reader);

        let cat = reader.entry_by_title("Cat").unwrap();
        let location = cat.location.unwrap();
        assert_eq!(location.segment_id, SegmentId::new(0));
        assert_eq!(location.offset, 0);

        let page = reader.read_page(&cat).unwrap();
        assert_eq!(page.title, "Cat");
        assert!(page.document.contains("<b>Cats</b>"));

        let dog = reader.entry_by_id(2).unwrap();
        assert_eq!(dog.redirect.as_deref(), Some("Cat"));
        let resolved = reader.resolve("Dog").unwrap();
        assert_eq!(resolved.entry.id, 1);
        assert_eq!(resolved.redirects, vec!["Dog".to_string()]);
    }

    #[test]
    fn scenario_rotation() {
        let output = TempOutput::new();
        let body = "word ".repeat(40);
        let dump = DumpBuilder::new()
            .pages((1..=6).map(|id| DumpPage::content(id, format!("Page {id}"), body.clone())))
            .build();

        let summary = output.build(&dump, |config| {
            config.compress(false).max_segment_size(400).workers(1)
        });
        assert!(summary.segment_count() >= 2);

        let reader = output.reader();
        check_archive(&reader);
        let segment_ids: std::collections::BTreeSet<_> = reader
            .index()
            .entries()
            .unwrap()
            .into_iter()
            .filter_map(|e| e.location.map(|l| l.segment_id))
            .collect();
        assert!(segment_ids.len() >= 2);
        assert!(output.path().join("dat.1").is_file());
        assert_eq!(reader.settings().unwrap().segment_count, Some(summary.segment_count() as u64));
    }

    #[test]
    fn scenario_namespace_filter() {
        let output = TempOutput::new();
        let dump = cat_and_dog()
            .page(DumpPage::content(3, "Talk:Cat", "chatter").in_ns(Namespace::ArticleTalk.code()))
            .page(DumpPage::content(4, "Category:Felines", "cats").in_ns(Namespace::Category.code()))
            .build();

        let summary = output.build(&dump, |config| config);
        assert_eq!(summary.records_filtered, 1);
        assert_eq!(summary.records_parsed, 3);

        let reader = output.reader();
        assert!(reader.entry_by_id(3).is_err());
        assert!(reader.entry_by_id(4).is_ok());
        check_archive(&reader);
    }

    #[test]
    fn explicit_namespace_filter() {
        let output = TempOutput::new();
        let dump = cat_and_dog()
            .page(DumpPage::content(3, "Talk:Cat", "chatter").in_ns(Namespace::ArticleTalk.code()))
            .build();

        let summary = output.build(&dump, |config| {
            config.namespaces(NamespaceFilter::only([Namespace::ArticleTalk]))
        });
        assert_eq!(summary.records_filtered, 2);
        assert_eq!(summary.entry_count, 1);
    }

    #[test]
    fn empty_pages_are_skipped() {
        let output = TempOutput::new();
        let dump = DumpBuilder::new()
            .page(DumpPage::empty(1, "Blank"))
            .page(DumpPage::content(2, "Full", "text"))
            .build();

        let summary = output.build(&dump, |config| config.compress(false));
        assert_eq!(summary.writes.records_empty, 1);
        assert_eq!(summary.entry_count, 1);

        let reader = output.reader();
        assert!(reader.entry_by_title("Blank").is_err());
        let full = reader.entry_by_title("Full").unwrap();
        let total: u64 = reader.segment_sizes().unwrap().iter().map(|(_, s)| s).sum();
        assert_eq!(total, full.location.unwrap().length);
    }

    #[test]
    fn queue_depth_stays_bounded() {
        let output = TempOutput::new();
        let dump = DumpBuilder::new()
            .pages((1..=200).map(|id| DumpPage::content(id, format!("Page {id}"), "body text")))
            .build();

        let summary = output.build(&dump, |config| {
            config.workers(2).queue_capacity(2).batch_size(5)
        });
        assert!(summary.writes.max_in_flight <= 2 + 2);
        assert_eq!(summary.writes.batches_submitted, 40);
        assert_eq!(summary.writes.batches_completed, 40);
        assert_eq!(summary.entry_count, 200);
    }

    #[test]
    fn redirect_body_is_not_stored() {
        let output = TempOutput::new();
        let dump = DumpBuilder::new().page(DumpPage::redirect(1, "Dog", "Cat")).build();
        output.build(&dump, |config| config);

        let reader = output.reader();
        assert!(reader.entry_by_id(1).unwrap().is_redirect());
        assert!(reader.segment_sizes().unwrap().is_empty());
    }

    struct FailingOpener;

    impl SegmentOpener for FailingOpener {
        fn open(&self, _id: SegmentId) -> StorageResult<Arc<dyn StorageBackend>> {
            Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }
    }

    #[test]
    fn storage_failure_aborts_the_build() {
        let output = TempOutput::new();
        let err = output
            .try_build_with_opener(&cat_and_dog().build(), |config| config, Box::new(FailingOpener))
            .unwrap_err();
        assert!(matches!(err, CoreError::StorageWriteFailed { .. }));
        assert!(ArchiveReader::open(output.path()).is_err());
    }

    #[test]
    fn render_failure_skips_the_record() {
        let output = TempOutput::new();
        let dump = cat_and_dog()
            .page(DumpPage::content(3, "Broken", "{{unclosed template"))
            .build();

        let summary = output.build(&dump, |config| config);
        assert_eq!(summary.writes.records_failed, 1);
        assert_eq!(summary.entry_count, 2);
        check_archive(&output.reader());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn generated_dumps_round_trip(pages in page_set_strategy(25), compress in any::<bool>()) {
            let output = TempOutput::new();
            let dump = DumpBuilder::new().pages(pages.clone()).build();
            output.build(&dump, |config| {
                config.compress(compress).max_segment_size(512).batch_size(4).workers(3)
            });

            let reader = output.reader();
            check_archive(&reader);
            check_pages(&reader, &pages);
        }
    }
}
