//! MediaWiki namespaces and the record namespace filter.
//!
//! Every page in a dump carries an `<ns>` code. The codes form a small
//! closed set; the filter decides which namespaces make it into the archive.

use std::fmt;

/// A MediaWiki namespace.
///
/// Codes follow the English Wikipedia namespace table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Namespace {
    /// Main article namespace (0).
    Article,
    /// Talk (1).
    ArticleTalk,
    /// User (2).
    User,
    /// User talk (3).
    UserTalk,
    /// Wikipedia project pages (4).
    Wikipedia,
    /// Wikipedia talk (5).
    WikipediaTalk,
    /// File description pages (6).
    File,
    /// File talk (7).
    FileTalk,
    /// MediaWiki interface messages (8).
    MediaWiki,
    /// MediaWiki talk (9).
    MediaWikiTalk,
    /// Templates (10).
    Template,
    /// Template talk (11).
    TemplateTalk,
    /// Help (12).
    Help,
    /// Help talk (13).
    HelpTalk,
    /// Categories (14).
    Category,
    /// Category talk (15).
    CategoryTalk,
    /// Portals (100).
    Portal,
    /// Portal talk (101).
    PortalTalk,
    /// Books (108).
    Book,
    /// Book talk (109).
    BookTalk,
    /// Drafts (118).
    Draft,
    /// Draft talk (119).
    DraftTalk,
    /// Education program (446).
    EducationProgram,
    /// Education program talk (447).
    EducationProgramTalk,
    /// Timed text (710).
    TimedText,
    /// Timed text talk (711).
    TimedTextTalk,
    /// Lua modules (828).
    Module,
    /// Module talk (829).
    ModuleTalk,
    /// Flow topics (2600).
    Topic,
    /// Special pages (-1).
    Special,
    /// Media (-2).
    Media,
}

/// Static code → namespace table.
const CODES: [(i32, Namespace); 31] = [
    (0, Namespace::Article),
    (1, Namespace::ArticleTalk),
    (2, Namespace::User),
    (3, Namespace::UserTalk),
    (4, Namespace::Wikipedia),
    (5, Namespace::WikipediaTalk),
    (6, Namespace::File),
    (7, Namespace::FileTalk),
    (8, Namespace::MediaWiki),
    (9, Namespace::MediaWikiTalk),
    (10, Namespace::Template),
    (11, Namespace::TemplateTalk),
    (12, Namespace::Help),
    (13, Namespace::HelpTalk),
    (14, Namespace::Category),
    (15, Namespace::CategoryTalk),
    (100, Namespace::Portal),
    (101, Namespace::PortalTalk),
    (108, Namespace::Book),
    (109, Namespace::BookTalk),
    (118, Namespace::Draft),
    (119, Namespace::DraftTalk),
    (446, Namespace::EducationProgram),
    (447, Namespace::EducationProgramTalk),
    (710, Namespace::TimedText),
    (711, Namespace::TimedTextTalk),
    (828, Namespace::Module),
    (829, Namespace::ModuleTalk),
    (2600, Namespace::Topic),
    (-1, Namespace::Special),
    (-2, Namespace::Media),
];

impl Namespace {
    /// Resolves a dump namespace code.
    ///
    /// Returns `None` for codes outside the table.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, namespace)| *namespace)
    }

    /// Returns the dump code of this namespace.
    #[must_use]
    pub fn code(self) -> i32 {
        CODES[self as usize].0
    }

    /// Returns true for discussion namespaces.
    #[must_use]
    pub fn is_talk(self) -> bool {
        matches!(
            self,
            Self::ArticleTalk
                | Self::UserTalk
                | Self::WikipediaTalk
                | Self::FileTalk
                | Self::MediaWikiTalk
                | Self::TemplateTalk
                | Self::HelpTalk
                | Self::CategoryTalk
                | Self::PortalTalk
                | Self::BookTalk
                | Self::DraftTalk
                | Self::EducationProgramTalk
                | Self::TimedTextTalk
                | Self::ModuleTalk
        )
    }

    /// Returns every namespace in table order.
    pub fn all() -> impl Iterator<Item = Namespace> {
        CODES.iter().map(|(_, namespace)| *namespace)
    }

    const fn bit(self) -> u64 {
        1 << (self as u8)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// The set of namespaces admitted into an archive.
///
/// Records without a namespace, or with a code outside the table, are
/// always admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceFilter {
    mask: u64,
}

impl Default for NamespaceFilter {
    fn default() -> Self {
        Self::only([Namespace::Article, Namespace::Category])
    }
}

impl NamespaceFilter {
    /// Creates a filter admitting exactly the given namespaces.
    pub fn only(namespaces: impl IntoIterator<Item = Namespace>) -> Self {
        let mask = namespaces
            .into_iter()
            .fold(0, |mask, namespace| mask | namespace.bit());
        Self { mask }
    }

    /// Creates a filter admitting every namespace.
    #[must_use]
    pub fn all() -> Self {
        Self::only(Namespace::all())
    }

    /// Adds a namespace to the filter.
    #[must_use]
    pub fn with(mut self, namespace: Namespace) -> Self {
        self.mask |= namespace.bit();
        self
    }

    /// Returns true if the namespace is in the set.
    #[must_use]
    pub fn contains(&self, namespace: Namespace) -> bool {
        self.mask & namespace.bit() != 0
    }

    /// Decides whether a record with this namespace is admitted.
    #[must_use]
    pub fn accepts(&self, namespace: Option<Namespace>) -> bool {
        namespace.map_or(true, |namespace| self.contains(namespace))
    }

    /// Returns the admitted namespaces in table order.
    pub fn namespaces(&self) -> impl Iterator<Item = Namespace> + '_ {
        Namespace::all().filter(|namespace| self.contains(*namespace))
    }
}
