//! Parsed dump records.

use crate::namespace::Namespace;

/// One page parsed out of a dump.
///
/// Records live only between the parser and the write workers; once a
/// record's index row is written the record is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Page identifier, unique within a dump.
    pub id: u64,
    /// Page title.
    pub title: String,
    /// Namespace, when the dump carried a known code.
    pub namespace: Option<Namespace>,
    /// Title of the page this one redirects to.
    pub redirect: Option<String>,
    /// Raw markup of the page body.
    pub content: Option<String>,
}

impl Record {
    /// Creates a content record.
    pub fn page(id: u64, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            namespace: None,
            redirect: None,
            content: Some(content.into()),
        }
    }

    /// Creates a redirect record.
    pub fn redirect(id: u64, title: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            namespace: None,
            redirect: Some(target.into()),
            content: None,
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Returns true if this record redirects elsewhere.
    ///
    /// A redirect wins over body content: redirect pages in real dumps also
    /// carry a `#REDIRECT` body, which is never rendered.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        self.redirect.is_some()
    }

    /// Returns true if the record has neither a redirect nor content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.redirect.is_none() && self.content.is_none()
    }
}
