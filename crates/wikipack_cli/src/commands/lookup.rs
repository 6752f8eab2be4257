//! Lookup command implementation.

use serde::Serialize;
use std::path::Path;
use wikipack_core::{ArchiveReader, IndexEntry};

/// What to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// A page id.
    Id(u64),
    /// An exact page title.
    Title(String),
}

/// Lookup result.
#[derive(Debug, Serialize)]
pub struct LookupResult {
    /// Page id.
    pub id: u64,
    /// Page title.
    pub title: String,
    /// Redirect target, when the entry is a redirect that was not followed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    /// Titles passed through while following redirects.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redirected_from: Vec<String>,
    /// Where the payload lives, as `seg:N@offset+length`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Rendered document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

/// Runs the lookup command.
pub fn run(path: &Path, key: &Key, follow: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reader = ArchiveReader::open(path)?;
    let result = lookup(&reader, key, follow)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Resolves `key` against an open archive.
pub fn lookup(reader: &ArchiveReader, key: &Key, follow: bool) -> Result<LookupResult, Box<dyn std::error::Error>> {
    let entry = match key {
        Key::Id(id) => reader.entry_by_id(*id)?,
        Key::Title(title) => reader.entry_by_title(title)?,
    };

    let (entry, redirected_from) = if follow && entry.is_redirect() {
        let resolved = reader.resolve(&entry.title)?;
        (resolved.entry, resolved.redirects)
    } else {
        (entry, Vec::new())
    };

    let document = match entry.location {
        Some(_) => Some(reader.read_page(&entry)?.document),
        None => None,
    };
    Ok(to_result(entry, redirected_from, document))
}

fn to_result(entry: IndexEntry, redirected_from: Vec<String>, document: Option<String>) -> LookupResult {
    LookupResult {
        id: entry.id,
        title: entry.title,
        redirect: entry.redirect,
        redirected_from,
        location: entry.location.map(|loc| loc.to_string()),
        document,
    }
}

fn print_text_output(result: &LookupResult) {
    for title in &result.redirected_from {
        println!("(redirected from {title})");
    }
    println!("[{}] {}", result.id, result.title);
    if let Some(target) = &result.redirect {
        println!("  redirect -> {target}");
    }
    if let Some(location) = &result.location {
        println!("  stored at {location}");
    }
    if let Some(document) = &result.document {
        println!();
        println!("{document}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;
    use wikipack_core::{BuildConfig, HtmlRenderer, Ingestor};

    fn archive() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let xml = "<mediawiki>\
            <page><title>Cat</title><ns>0</ns><id>1</id><revision><text>fur</text></revision></page>\
            <page><title>Dog</title><ns>0</ns><id>2</id><redirect title=\"Cat\"/></page>\
            </mediawiki>";
        Ingestor::create(BuildConfig::new(dir.path()), Arc::new(HtmlRenderer::new()))
            .unwrap()
            .ingest(xml.as_bytes(), |_, _| {})
            .unwrap();
        dir
    }

    #[test]
    fn by_id_reads_document() {
        let dir = archive();
        let reader = ArchiveReader::open(dir.path()).unwrap();
        let result = lookup(&reader, &Key::Id(1), false).unwrap();
        assert_eq!(result.title, "Cat");
        assert_eq!(result.document.as_deref(), Some("<p>fur</p>"));
        assert!(result.location.unwrap().starts_with("seg:0@"));
    }

    #[test]
    fn redirect_without_follow() {
        let dir = archive();
        let reader = ArchiveReader::open(dir.path()).unwrap();
        let result = lookup(&reader, &Key::Title("Dog".into()), false).unwrap();
        assert_eq!(result.redirect.as_deref(), Some("Cat"));
        assert!(result.document.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["redirect"], "Cat");
        assert!(json.get("document").is_none());
    }

    #[test]
    fn redirect_with_follow() {
        let dir = archive();
        let reader = ArchiveReader::open(dir.path()).unwrap();
        let result = lookup(&reader, &Key::Title("Dog".into()), true).unwrap();
        assert_eq!(result.title, "Cat");
        assert_eq!(result.redirected_from, vec!["Dog".to_string()]);
        assert_eq!(result.document.as_deref(), Some("<p>fur</p>"));
    }

    #[test]
    fn missing_key_is_an_error() {
        let dir = archive();
        let reader = ArchiveReader::open(dir.path()).unwrap();
        assert!(lookup(&reader, &Key::Id(99), false).is_err());
    }
}
