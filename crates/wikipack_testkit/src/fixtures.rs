//! Dump fixtures and scratch archives.
//!
//! [`DumpBuilder`] writes the subset of the MediaWiki export format the
//! parser reads; [`TempOutput`] builds it into a temporary directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use wikipack_core::{
    ArchiveReader, BuildConfig, BuildSummary, CoreResult, HtmlRenderer, Ingestor, Renderer,
    SegmentOpener,
};

/// One `<page>` of a generated dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpPage {
    /// Page id.
    pub id: u64,
    /// Page title.
    pub title: String,
    /// Namespace code written to `<ns>`.
    pub ns: i32,
    /// Redirect target, written as `<redirect title=".."/>`.
    pub redirect: Option<String>,
    /// Body written to `<text>`, omitted when `None`.
    pub text: Option<String>,
}

impl DumpPage {
    /// Creates an article with a body.
    pub fn content(id: u64, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ns: 0,
            redirect: None,
            text: Some(text.into()),
        }
    }

    /// Creates a redirect page. Like real dumps it also carries a body.
    pub fn redirect(id: u64, title: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            id,
            title: title.into(),
            ns: 0,
            text: Some(format!("#REDIRECT [[{target}]]")),
            redirect: Some(target),
        }
    }

    /// Creates a page with neither redirect nor body.
    pub fn empty(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ns: 0,
            redirect: None,
            text: None,
        }
    }

    /// Sets the namespace code.
    #[must_use]
    pub fn in_ns(mut self, ns: i32) -> Self {
        self.ns = ns;
        self
    }

    fn write_xml(&self, out: &mut String) {
        out.push_str("  <page>\n");
        out.push_str(&format!("    <title>{}</title>\n", escape_xml(&self.title)));
        out.push_str(&format!("    <ns>{}</ns>\n", self.ns));
        out.push_str(&format!("    <id>{}</id>\n", self.id));
        if let Some(target) = &self.redirect {
            out.push_str(&format!("    <redirect title=\"{}\" />\n", escape_xml(target)));
        }
        out.push_str("    <revision>\n");
        out.push_str(&format!("      <id>{}</id>\n", self.id + 1_000_000));
        out.push_str("      <contributor><username>Tester</username><id>7</id></contributor>\n");
        match &self.text {
            Some(text) => out.push_str(&format!(
                "      <text xml:space=\"preserve\">{}</text>\n",
                escape_xml(text)
            )),
            None => out.push_str("      <text />\n"),
        }
        out.push_str("    </revision>\n");
        out.push_str("  </page>\n");
    }
}

/// Builds a MediaWiki XML export.
#[derive(Debug, Default, Clone)]
pub struct DumpBuilder {
    pages: Vec<DumpPage>,
}

impl DumpBuilder {
    /// Creates an empty dump.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a page.
    #[must_use]
    pub fn page(mut self, page: DumpPage) -> Self {
        self.pages.push(page);
        self
    }

    /// Appends several pages.
    #[must_use]
    pub fn pages(mut self, pages: impl IntoIterator<Item = DumpPage>) -> Self {
        self.pages.extend(pages);
        self
    }

    /// Returns the pages added so far.
    pub fn entries(&self) -> &[DumpPage] {
        &self.pages
    }

    /// Renders the export document.
    pub fn build(&self) -> String {
        let mut out = String::from(
            "<mediawiki xmlns=\"http://www.mediawiki.org/xml/export-0.10/\" xml:lang=\"en\">\n\
             <siteinfo><sitename>Wikipedia</sitename><namespaces>\
             <namespace key=\"0\" case=\"first-letter\" /></namespaces></siteinfo>\n",
        );
        for page in &self.pages {
            page.write_xml(&mut out);
        }
        out.push_str("</mediawiki>\n");
        out
    }
}

/// Escapes text for XML content and attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// A scratch archive directory with automatic cleanup.
pub struct TempOutput {
    _temp_dir: TempDir,
    path: PathBuf,
}

impl TempOutput {
    /// Creates a temporary directory; the archive goes into `out/` inside it.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("out");
        Self {
            _temp_dir: temp_dir,
            path,
        }
    }

    /// Returns the archive directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a default configuration writing into this directory.
    pub fn config(&self) -> BuildConfig {
        BuildConfig::new(&self.path)
    }

    /// Builds `dump` with the HTML renderer, panicking on failure.
    pub fn build(&self, dump: &str, configure: impl FnOnce(BuildConfig) -> BuildConfig) -> BuildSummary {
        self.try_build(dump, configure, Arc::new(HtmlRenderer::new()))
            .expect("Failed to build archive")
    }

    /// Builds `dump` with `renderer`.
    pub fn try_build(
        &self,
        dump: &str,
        configure: impl FnOnce(BuildConfig) -> BuildConfig,
        renderer: Arc<dyn Renderer>,
    ) -> CoreResult<BuildSummary> {
        Ingestor::create(configure(self.config()), renderer)?.ingest(dump.as_bytes(), |_, _| {})
    }

    /// Builds `dump` with segments opened through `opener`.
    pub fn try_build_with_opener(
        &self,
        dump: &str,
        configure: impl FnOnce(BuildConfig) -> BuildConfig,
        opener: Box<dyn SegmentOpener>,
    ) -> CoreResult<BuildSummary> {
        Ingestor::create_with_opener(configure(self.config()), opener, Arc::new(HtmlRenderer::new()))?
            .ingest(dump.as_bytes(), |_, _| {})
    }

    /// Opens the finished archive.
    pub fn reader(&self) -> ArchiveReader {
        ArchiveReader::open(&self.path).expect("Failed to open archive")
    }
}

impl Default for TempOutput {
    fn default() -> Self {
        Self::new()
    }
}
