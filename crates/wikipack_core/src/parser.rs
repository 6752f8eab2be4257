//! Streaming dump parser.
//!
//! [`RecordStream`] pulls tokens from a MediaWiki XML export one at a time
//! and yields a [`Record`] each time a `<page>` element closes. Memory use is
//! bounded by the largest single page, never by the document.
//!
//! ```text
//! <page>
//!   <title>Dog</title>          captured once
//!   <ns>0</ns>                  captured once, resolved via the namespace table
//!   <id>2</id>                  captured once, direct children of <page> only
//!   <redirect title="Cat" />    target read from the attribute
//!   <revision>
//!     <id>99</id>               ignored (not a direct child)
//!     <text>...</text>          every chunk appended
//!   </revision>
//! </page>
//! ```

use crate::error::{CoreError, CoreResult};
use crate::namespace::{Namespace, NamespaceFilter};
use crate::record::Record;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use tracing::{debug, warn};

const PAGE: &[u8] = b"page";
const TITLE: &[u8] = b"title";
const ID: &[u8] = b"id";
const NS: &[u8] = b"ns";
const REDIRECT: &[u8] = b"redirect";
const TEXT: &[u8] = b"text";

/// A lazy, non-restartable sequence of records parsed from a dump.
///
/// The stream ends at end of input or once `limit` records have been
/// yielded. After the first error it yields nothing more.
///
/// # Example
///
/// ```rust
/// use wikipack_core::{NamespaceFilter, RecordStream};
///
/// let xml = r#"<mediawiki><page><title>Cat</title><ns>0</ns><id>1</id>
///     <revision><text>fur</text></revision></page></mediawiki>"#;
/// let records: Vec<_> = RecordStream::new(xml.as_bytes(), NamespaceFilter::default())
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(records[0].title, "Cat");
/// ```
pub struct RecordStream<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    machine: PageMachine,
    limit: Option<u64>,
    yielded: u64,
    done: bool,
}

impl<R: BufRead> RecordStream<R> {
    /// Creates a stream over `input`, admitting records that pass `filter`.
    pub fn new(input: R, filter: NamespaceFilter) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().expand_empty_elements = true;

        Self {
            reader,
            buf: Vec::with_capacity(64 * 1024),
            machine: PageMachine::new(filter),
            limit: None,
            yielded: 0,
            done: false,
        }
    }

    /// Stops the stream after `limit` records.
    #[must_use]
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Returns the number of records yielded so far.
    #[must_use]
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    /// Returns the number of pages dropped by the namespace filter.
    #[must_use]
    pub fn filtered(&self) -> u64 {
        self.machine.filtered
    }

    /// Returns the byte position reached in the input.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn advance(&mut self) -> CoreResult<Option<Record>> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|source| CoreError::Xml {
                    position: self.reader.buffer_position() as u64,
                    source,
                })?;

            match event {
                Event::Start(start) => self.machine.start(&start).map_err(|source| {
                    CoreError::Xml {
                        position: self.reader.buffer_position() as u64,
                        source,
                    }
                })?,
                Event::End(_) => {
                    if let Some(record) = self.machine.end()? {
                        return Ok(Some(record));
                    }
                }
                Event::Text(text) if self.machine.is_capturing() => {
                    let text = text.unescape().map_err(|source| CoreError::Xml {
                        position: self.reader.buffer_position() as u64,
                        source,
                    })?;
                    self.machine.text(&text);
                }
                Event::CData(data) if self.machine.is_capturing() => {
                    self.machine.text(&String::from_utf8_lossy(&data));
                }
                Event::Eof => {
                    self.machine.eof();
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = CoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.limit.is_some_and(|limit| self.yielded >= limit) {
            self.done = true;
            return None;
        }

        match self.advance() {
            Ok(Some(record)) => {
                self.yielded += 1;
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for RecordStream<R> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Namespace,
    Body,
}

/// Per-page capture state.
#[derive(Debug, Default)]
struct PageScope {
    /// Element depth of the `<page>` start tag.
    depth: usize,
    id: Option<u64>,
    title: Option<String>,
    namespace: Option<Namespace>,
    captured_ns: bool,
    redirect: Option<String>,
    content: Option<String>,
    /// Field being captured and the depth of its element.
    capture: Option<(Field, usize)>,
    /// Text of the id/title/ns element being captured.
    field_text: String,
}

struct PageMachine {
    filter: NamespaceFilter,
    depth: usize,
    scope: Option<PageScope>,
    filtered: u64,
}

impl PageMachine {
    fn new(filter: NamespaceFilter) -> Self {
        Self {
            filter,
            depth: 0,
            scope: None,
            filtered: 0,
        }
    }

    fn is_capturing(&self) -> bool {
        self.scope
            .as_ref()
            .and_then(|scope| scope.capture)
            .is_some_and(|(_, depth)| depth == self.depth)
    }

    fn start(&mut self, start: &BytesStart<'_>) -> Result<(), quick_xml::Error> {
        self.depth += 1;
        let depth = self.depth;
        let name = start.local_name();
        let name = name.as_ref();

        if name == PAGE {
            if self.scope.is_some() {
                warn!(depth, "page opened inside an unfinished page; discarding the outer one");
            }
            self.scope = Some(PageScope {
                depth,
                ..PageScope::default()
            });
            return Ok(());
        }

        let Some(scope) = self.scope.as_mut() else {
            return Ok(());
        };
        if scope.capture.is_some() {
            return Ok(());
        }

        let direct_child = depth == scope.depth + 1;
        let field = match name {
            TITLE if direct_child && scope.title.is_none() => Some(Field::Title),
            ID if direct_child && scope.id.is_none() => Some(Field::Id),
            NS if direct_child && !scope.captured_ns => Some(Field::Namespace),
            TEXT => Some(Field::Body),
            REDIRECT => {
                if scope.redirect.is_none() {
                    for attr in start.attributes() {
                        let attr = attr?;
                        if attr.key.local_name().as_ref() == TITLE {
                            scope.redirect = Some(attr.unescape_value()?.into_owned());
                        }
                    }
                }
                None
            }
            _ => None,
        };

        if let Some(field) = field {
            scope.capture = Some((field, depth));
            scope.field_text.clear();
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let Some(scope) = self.scope.as_mut() else {
            return;
        };
        match scope.capture {
            Some((Field::Body, _)) => scope
                .content
                .get_or_insert_with(String::new)
                .push_str(text),
            Some(_) => scope.field_text.push_str(text),
            None => {}
        }
    }

    fn end(&mut self) -> CoreResult<Option<Record>> {
        let depth = self.depth;
        self.depth = self.depth.saturating_sub(1);

        let Some(scope) = self.scope.as_mut() else {
            return Ok(None);
        };

        if depth == scope.depth {
            let scope = self.scope.take().unwrap_or_default();
            return self.close_page(scope);
        }

        match scope.capture {
            Some((field, capture_depth)) if capture_depth == depth => {
                scope.capture = None;
                let text = std::mem::take(&mut scope.field_text);
                match field {
                    Field::Id => scope.id = Some(parse_id(&text)?),
                    Field::Title => {
                        if !text.is_empty() {
                            scope.title = Some(text);
                        }
                    }
                    Field::Namespace => {
                        scope.captured_ns = true;
                        scope.namespace = parse_namespace(&text)?;
                    }
                    Field::Body => {}
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn close_page(&mut self, scope: PageScope) -> CoreResult<Option<Record>> {
        if !self.filter.accepts(scope.namespace) {
            self.filtered += 1;
            debug!(
                title = scope.title.as_deref().unwrap_or_default(),
                namespace = ?scope.namespace,
                "page outside accepted namespaces"
            );
            return Ok(None);
        }

        let id = scope.id.ok_or_else(|| CoreError::malformed_field("id", ""))?;
        let title = scope
            .title
            .ok_or_else(|| CoreError::malformed_field("title", ""))?;

        Ok(Some(Record {
            id,
            title,
            namespace: scope.namespace,
            redirect: scope.redirect,
            content: scope.content,
        }))
    }

    fn eof(&mut self) {
        if let Some(scope) = self.scope.take() {
            warn!(
                title = scope.title.as_deref().unwrap_or_default(),
                "input ended inside a page; dropping it"
            );
        }
    }
}

fn parse_id(text: &str) -> CoreResult<u64> {
    text.trim()
        .parse()
        .map_err(|_| CoreError::malformed_field("id", text))
}

fn parse_namespace(text: &str) -> CoreResult<Option<Namespace>> {
    let code: i32 = text
        .trim()
        .parse()
        .map_err(|_| CoreError::malformed_field("ns", text))?;
    let namespace = Namespace::from_code(code);
    if namespace.is_none() {
        debug!(code, "unknown namespace code");
    }
    Ok(namespace)
}
