//! Field validation for catalog records.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static ISBN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{9}[\dX]|\d{13})$").expect("valid isbn regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex")
});

/// Field-level validation failures for catalog writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required text field is blank after trim.
    BlankField(&'static str),
    /// ISBN is neither ISBN-10 nor ISBN-13 shaped.
    InvalidIsbn(String),
    /// Email does not look like `local@domain.tld`.
    InvalidEmail(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField(field) => write!(f, "`{field}` must not be blank"),
            Self::InvalidIsbn(value) => write!(f, "invalid isbn `{value}`"),
            Self::InvalidEmail(value) => write!(f, "invalid email `{value}`"),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    Ok(())
}

/// Strips hyphens/spaces and upper-cases a trailing `x`.
///
/// Returns the canonical digit string stored in `books.isbn`.
pub fn normalize_isbn(value: &str) -> Result<String, ValidationError> {
    let compact: String = value
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if !ISBN_RE.is_match(&compact) {
        return Err(ValidationError::InvalidIsbn(value.to_string()));
    }
    Ok(compact)
}

pub(crate) fn check_email(value: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(value.trim()) {
        return Err(ValidationError::InvalidEmail(value.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{check_email, normalize_isbn, ValidationError};

    #[test]
    fn isbn_accepts_hyphenated_isbn13() {
        assert_eq!(
            normalize_isbn("978-8535905959").expect("isbn13 should normalize"),
            "9788535905959"
        );
    }

    #[test]
    fn isbn_accepts_isbn10_with_check_x() {
        assert_eq!(
            normalize_isbn("0-8044-2957-x").expect("isbn10 should normalize"),
            "080442957X"
        );
    }

    #[test]
    fn isbn_rejects_wrong_length() {
        let err = normalize_isbn("12345").expect_err("short isbn must fail");
        assert_eq!(err, ValidationError::InvalidIsbn("12345".to_string()));
    }

    #[test]
    fn email_requires_domain_with_dot() {
        assert!(check_email("maria@example.com").is_ok());
        assert!(check_email("maria@localhost").is_err());
        assert!(check_email("not an email").is_err());
    }
}
