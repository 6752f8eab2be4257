//! Property-based test generators using proptest.
//!
//! Provides strategies for generating dumps that keep the invariants a
//! real export has: unique ids, non-empty titles.

use crate::fixtures::DumpPage;
use proptest::prelude::*;

/// Kind of page in a generated set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Article with a body.
    Content,
    /// Redirect to another generated title.
    Redirect,
    /// Neither redirect nor body.
    Empty,
}

/// Strategy for generating page titles, including non-ASCII ones.
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z0-9]{0,12}( [a-zäöüéñ東京&<>\"']{1,8}){0,3}")
        .expect("Invalid regex")
}

/// Strategy for generating wikitext bodies without templates.
pub fn markup_strategy() -> impl Strategy<Value = String> {
    let word = || prop::string::string_regex("[a-zA-Z0-9äöü]{1,10}").expect("Invalid regex");
    let piece = prop_oneof![
        word(),
        word().prop_map(|w| format!("'''{w}'''")),
        word().prop_map(|w| format!("''{w}''")),
        word().prop_map(|w| format!("[[{w}]]")),
        Just("\n\n".to_string()),
        Just(" & ".to_string()),
        word().prop_map(|w| format!("\n== {w} ==\n")),
    ];
    prop::collection::vec(piece, 0..40).prop_map(|pieces| pieces.join(" "))
}

/// Strategy for generating page kinds, mostly content.
pub fn page_kind_strategy() -> impl Strategy<Value = PageKind> {
    prop_oneof![
        6 => Just(PageKind::Content),
        3 => Just(PageKind::Redirect),
        1 => Just(PageKind::Empty),
    ]
}

/// Strategy for generating a set of pages with unique ids.
///
/// Redirects point at the title of another page in the set.
pub fn page_set_strategy(max_pages: usize) -> impl Strategy<Value = Vec<DumpPage>> {
    prop::collection::vec(
        (title_strategy(), markup_strategy(), page_kind_strategy(), any::<prop::sample::Index>()),
        1..=max_pages.max(1),
    )
    .prop_map(|specs| {
        let titles: Vec<String> = specs.iter().map(|(title, ..)| title.clone()).collect();
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (title, markup, kind, target))| {
                let id = i as u64 + 1;
                match kind {
                    PageKind::Content => DumpPage::content(id, title, markup),
                    PageKind::Redirect => DumpPage::redirect(id, title, target.get(&titles).clone()),
                    PageKind::Empty => DumpPage::empty(id, title),
                }
            })
            .collect()
    })
}
