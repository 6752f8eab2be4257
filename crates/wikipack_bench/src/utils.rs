//! Benchmark utilities.

use wikipack_testkit::{DumpBuilder, DumpPage};

const WORDS: [&str; 8] = [
    "the", "cat", "'''sat'''", "on", "[[mat]]", "and", "''purred''", "loudly",
];

/// Generate deterministic wikitext of roughly `size` bytes.
pub fn markup(size: usize) -> String {
    let mut out = String::with_capacity(size + 16);
    let mut i = 0;
    while out.len() < size {
        if i % 40 == 39 {
            out.push_str("\n\n");
        }
        out.push_str(WORDS[i % WORDS.len()]);
        out.push(' ');
        i += 1;
    }
    out
}

/// Generate payload bytes of the specified size.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Generate a dump with `count` pages, every tenth one a redirect.
pub fn dump(count: u64, body_size: usize) -> String {
    let body = markup(body_size);
    DumpBuilder::new()
        .pages((1..=count).map(|id| {
            if id % 10 == 0 {
                DumpPage::redirect(id, format!("Alias {id}"), format!("Page {}", id - 1))
            } else {
                DumpPage::content(id, format!("Page {id}"), body.clone())
            }
        }))
        .build()
}
