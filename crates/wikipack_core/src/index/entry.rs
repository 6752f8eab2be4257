//! Index rows.

use crate::error::{CoreError, CoreResult};
use crate::types::Location;

/// One row of the metadata index.
///
/// Exactly one of `redirect` and `location` is set on a valid entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Record identifier, the primary key.
    pub id: u64,
    /// Record title.
    pub title: String,
    /// Target title when the record is a redirect.
    pub redirect: Option<String>,
    /// Where the payload is stored when the record has content.
    pub location: Option<Location>,
}

impl IndexEntry {
    /// Creates a redirect entry.
    pub fn redirect(id: u64, title: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            redirect: Some(target.into()),
            location: None,
        }
    }

    /// Creates an entry for a stored payload.
    pub fn stored(id: u64, title: impl Into<String>, location: Location) -> Self {
        Self {
            id,
            title: title.into(),
            redirect: None,
            location: Some(location),
        }
    }

    /// Returns true if this entry points at another title.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        self.redirect.is_some()
    }

    /// Checks the row invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIndexEntry`] if the title is empty, if
    /// both or neither of redirect and location are set, if the redirect
    /// target is empty, or if the id does not fit the store's integer key.
    pub fn validate(&self) -> CoreResult<()> {
        if self.title.is_empty() {
            return Err(CoreError::invalid_index_entry(self.id, "empty title"));
        }
        if i64::try_from(self.id).is_err() {
            return Err(CoreError::invalid_index_entry(
                self.id,
                "id exceeds the signed 64-bit key range",
            ));
        }
        match (&self.redirect, &self.location) {
            (Some(_), Some(_)) => Err(CoreError::invalid_index_entry(
                self.id,
                "both redirect and location are set",
            )),
            (None, None) => Err(CoreError::invalid_index_entry(
                self.id,
                "neither redirect nor location is set",
            )),
            (Some(target), None) if target.is_empty() => {
                Err(CoreError::invalid_index_entry(self.id, "empty redirect target"))
            }
            _ => Ok(()),
        }
    }
}
