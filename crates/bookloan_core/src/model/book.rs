//! Book catalog record.

use crate::model::validation::{normalize_isbn, require_text, ValidationError};
use serde::{Deserialize, Serialize};

/// Store-assigned book identity.
pub type BookId = i64;

/// Persisted book row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    /// Canonical digits-only ISBN, unique across the catalog.
    pub isbn: String,
    /// Derived flag: true iff no active loan references this book.
    pub available: bool,
}

/// Insert request for a catalog book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
}

impl NewBook {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        isbn: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            isbn: isbn.into(),
        }
    }

    /// Validates fields and returns the canonical ISBN to persist.
    pub fn validate(&self) -> Result<String, ValidationError> {
        require_text("title", &self.title)?;
        require_text("author", &self.author)?;
        normalize_isbn(&self.isbn)
    }
}
