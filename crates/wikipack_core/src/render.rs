//! Markup rendering.
//!
//! Write workers call a [`Renderer`] on the raw markup of every content
//! record. [`HtmlRenderer`] handles the common subset of wikitext; any other
//! implementation can be plugged into the build, including a plain closure.
//!
//! ```rust
//! use wikipack_core::render::{HtmlRenderer, Renderer};
//!
//! let html = HtmlRenderer::new().render("'''Cats''' are [[mammal]]s.").unwrap();
//! assert_eq!(html, "<p><b>Cats</b> are <a href=\"mammal\">mammal</a>s.</p>");
//! ```

use crate::error::{CoreError, CoreResult};

/// Turns record markup into a stored document.
///
/// Called concurrently from every write worker, so implementations must not
/// rely on shared mutable state.
pub trait Renderer: Send + Sync {
    /// Renders `markup`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RenderFailed`] if the markup cannot be rendered;
    /// the record is then skipped.
    fn render(&self, markup: &str) -> CoreResult<String>;
}

impl<F> Renderer for F
where
    F: Fn(&str) -> CoreResult<String> + Send + Sync,
{
    fn render(&self, markup: &str) -> CoreResult<String> {
        self(markup)
    }
}

/// Link namespaces that render to nothing.
const HIDDEN_LINK_PREFIXES: [&str; 3] = ["category:", "file:", "image:"];

/// Minimal wikitext to HTML renderer.
///
/// Supports headings, paragraphs, bullet and numbered lists, bold and
/// italic, internal and external links. Templates and comments are removed
/// and all other text is HTML-escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    /// Creates a renderer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, markup: &str) -> CoreResult<String> {
        let text = strip_templates(&strip_comments(markup))?;
        let mut out = Blocks::default();

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                out.close_all();
            } else if let Some((level, title)) = heading(trimmed) {
                out.close_all();
                out.push(format!("<h{level}>{}</h{level}>", render_inline(title)));
            } else if let Some(item) = trimmed.strip_prefix('*') {
                out.list_item("ul", item);
            } else if let Some(item) = trimmed.strip_prefix('#') {
                out.list_item("ol", item);
            } else {
                out.paragraph_line(trimmed);
            }
        }
        out.close_all();
        Ok(out.finish())
    }
}

#[derive(Default)]
struct Blocks {
    html: Vec<String>,
    paragraph: Vec<String>,
    list: Option<(&'static str, Vec<String>)>,
}

impl Blocks {
    fn push(&mut self, block: String) {
        self.html.push(block);
    }

    fn paragraph_line(&mut self, line: &str) {
        self.close_list();
        self.paragraph.push(render_inline(line));
    }

    fn list_item(&mut self, tag: &'static str, item: &str) {
        self.close_paragraph();
        if self.list.as_ref().is_some_and(|(open, _)| *open != tag) {
            self.close_list();
        }
        let item = format!("<li>{}</li>", render_inline(item.trim_start_matches(['*', '#']).trim()));
        match &mut self.list {
            Some((_, items)) => items.push(item),
            None => self.list = Some((tag, vec![item])),
        }
    }

    fn close_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            let body = self.paragraph.join(" ");
            self.paragraph.clear();
            self.html.push(format!("<p>{body}</p>"));
        }
    }

    fn close_list(&mut self) {
        if let Some((tag, items)) = self.list.take() {
            self.html.push(format!("<{tag}>{}</{tag}>", items.concat()));
        }
    }

    fn close_all(&mut self) {
        self.close_paragraph();
        self.close_list();
    }

    fn finish(self) -> String {
        self.html.join("\n")
    }
}

/// Parses `== Title ==` style headings.
fn heading(line: &str) -> Option<(usize, &str)> {
    let open = line.len() - line.trim_start_matches('=').len();
    let close = line.len() - line.trim_end_matches('=').len();
    let level = open.min(close).min(6);
    if level == 0 || line.len() <= 2 * level {
        return None;
    }
    let title = line[level..line.len() - level].trim();
    if title.is_empty() {
        None
    } else {
        Some((level, title))
    }
}

fn strip_comments(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start + 4..].find("-->") {
            Some(end) => rest = &rest[start + 4 + end + 3..],
            // An unclosed comment hides the rest of the page.
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

fn strip_templates(markup: &str) -> CoreResult<String> {
    let mut out = String::with_capacity(markup.len());
    let mut depth = 0usize;
    let mut opened_at = 0usize;
    let mut i = 0;
    let bytes = markup.as_bytes();

    while i < bytes.len() {
        if bytes[i..].starts_with(b"{{") {
            if depth == 0 {
                opened_at = i;
            }
            depth += 1;
            i += 2;
        } else if depth > 0 && bytes[i..].starts_with(b"}}") {
            depth -= 1;
            i += 2;
        } else {
            let ch_len = utf8_len(bytes[i]);
            if depth == 0 {
                out.push_str(&markup[i..i + ch_len]);
            }
            i += ch_len;
        }
    }

    if depth > 0 {
        return Err(CoreError::render_failed(format!(
            "unterminated template at byte {opened_at}"
        )));
    }
    Ok(out)
}

fn utf8_len(first: u8) -> usize {
    match first {
        0xF0..=0xFF => 4,
        0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        _ => 1,
    }
}

fn render_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut open: Vec<&'static str> = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("'''''") {
            // Close the innermost of the two first.
            let order = if open.last() == Some(&"i") && open.contains(&"b") {
                ["i", "b"]
            } else {
                ["b", "i"]
            };
            for tag in order {
                toggle(&mut out, &mut open, tag);
            }
            rest = after;
        } else if let Some(after) = rest.strip_prefix("'''") {
            toggle(&mut out, &mut open, "b");
            rest = after;
        } else if let Some(after) = rest.strip_prefix("''") {
            toggle(&mut out, &mut open, "i");
            rest = after;
        } else if let Some((html, after)) = internal_link(rest) {
            out.push_str(&html);
            rest = after;
        } else if let Some((html, after)) = external_link(rest) {
            out.push_str(&html);
            rest = after;
        } else {
            let mut chars = rest.chars();
            if let Some(ch) = chars.next() {
                escape_char(&mut out, ch);
            }
            rest = chars.as_str();
        }
    }

    while let Some(tag) = open.pop() {
        out.push_str(&format!("</{tag}>"));
    }
    out
}

/// Opens or closes `tag`, keeping the emitted tags properly nested.
fn toggle(out: &mut String, open: &mut Vec<&'static str>, tag: &'static str) {
    let Some(pos) = open.iter().position(|t| *t == tag) else {
        out.push_str(&format!("<{tag}>"));
        open.push(tag);
        return;
    };
    let reopen: Vec<&'static str> = open.drain(pos + 1..).collect();
    for t in reopen.iter().rev() {
        out.push_str(&format!("</{t}>"));
    }
    open.pop();
    out.push_str(&format!("</{tag}>"));
    for t in reopen {
        out.push_str(&format!("<{t}>"));
        open.push(t);
    }
}

fn internal_link(text: &str) -> Option<(String, &str)> {
    let inner_start = text.strip_prefix("[[")?;
    let end = inner_start.find("]]")?;
    let inner = &inner_start[..end];
    let rest = &inner_start[end + 2..];

    let (target, label) = match inner.split_once('|') {
        Some((target, label)) => (target.trim(), label.trim()),
        None => (inner.trim(), inner.trim()),
    };
    let lowered = target.to_lowercase();
    if HIDDEN_LINK_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return Some((String::new(), rest));
    }
    if target.is_empty() {
        return None;
    }

    Some((
        format!("<a href=\"{}\">{}</a>", escape(target), escape(label)),
        rest,
    ))
}

fn external_link(text: &str) -> Option<(String, &str)> {
    let inner_start = text.strip_prefix('[')?;
    if !["http://", "https://", "//"]
        .iter()
        .any(|scheme| inner_start.starts_with(scheme))
    {
        return None;
    }
    let end = inner_start.find(']')?;
    let inner = &inner_start[..end];
    let (url, label) = inner.split_once(' ').unwrap_or((inner, inner));

    Some((
        format!("<a href=\"{}\">{}</a>", escape(url), escape(label.trim())),
        &inner_start[end + 1..],
    ))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        escape_char(&mut out, ch);
    }
    out
}

fn escape_char(out: &mut String, ch: char) {
    match ch {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        _ => out.push(ch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(markup: &str) -> String {
        HtmlRenderer::new().render(markup).unwrap()
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        assert_eq!(render("one\ntwo\n\nthree"), "<p>one two</p>\n<p>three</p>");
    }

    #[test]
    fn headings() {
        assert_eq!(render("== History =="), "<h2>History</h2>");
        assert_eq!(render("===Sub==="), "<h3>Sub</h3>");
        assert_eq!(render("=="), "<p>==</p>");
    }

    #[test]
    fn bold_and_italic() {
        assert_eq!(render("'''b''' ''i''"), "<p><b>b</b> <i>i</i></p>");
        assert_eq!(render("'''''both'''''"), "<p><b><i>both</i></b></p>");
        // Unclosed formatting ends with the line.
        assert_eq!(render("''open"), "<p><i>open</i></p>");
    }

    #[test]
    fn misnested_formatting_stays_well_formed() {
        assert_eq!(
            render("'''bold ''both''' italic''"),
            "<p><b>bold <i>both</i></b><i> italic</i></p>"
        );
    }

    #[test]
    fn lists() {
        assert_eq!(
            render("* a\n* b\n# c"),
            "<ul><li>a</li><li>b</li></ul>\n<ol><li>c</li></ol>"
        );
        assert_eq!(render("text\n* item"), "<p>text</p>\n<ul><li>item</li></ul>");
    }

    #[test]
    fn links() {
        assert_eq!(
            render("[[Cat|the cat]] and [https://example.org site]"),
            "<p><a href=\"Cat\">the cat</a> and <a href=\"https://example.org\">site</a></p>"
        );
        assert_eq!(render("[[Category:Felines]]x"), "<p>x</p>");
        assert_eq!(render("[[broken"), "<p>[[broken</p>");
        assert_eq!(render("[not a link]"), "<p>[not a link]</p>");
    }

    #[test]
    fn templates_and_comments_are_removed() {
        assert_eq!(render("a{{infobox|x={{nested}}}}b"), "<p>ab</p>");
        assert_eq!(render("a<!-- hidden -->b"), "<p>ab</p>");
        assert_eq!(render("a<!-- never closed"), "<p>a</p>");
    }

    #[test]
    fn unterminated_template_fails() {
        let err = HtmlRenderer::new().render("x {{infobox").unwrap_err();
        assert!(matches!(err, CoreError::RenderFailed { .. }));
        assert!(err.is_record_local());
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(
            render("<script>\"x\" & y</script>"),
            "<p>&lt;script&gt;&quot;x&quot; &amp; y&lt;/script&gt;</p>"
        );
    }

    #[test]
    fn unicode_passes_through() {
        assert_eq!(render("{{t}}Ünïcödé 東京"), "<p>Ünïcödé 東京</p>");
    }

    #[test]
    fn empty_markup_renders_empty_document() {
        assert_eq!(render(""), "");
        assert_eq!(render("\n\n"), "");
    }

    #[test]
    fn closures_are_renderers() {
        let upper = |markup: &str| -> CoreResult<String> { Ok(markup.to_uppercase()) };
        assert_eq!(upper.render("cat").unwrap(), "CAT");
    }
}
