//! Post slug validation.
//!
//! Slugs arrive from the public action endpoint, so they are checked before
//! any persistence work happens. The accepted shape matches the catalog
//! convention: lowercase ASCII alphanumerics and single hyphens, no
//! leading or trailing hyphen.

use thiserror::Error;

pub const MAX_SLUG_LEN: usize = 200;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug is empty")]
    Empty,
    #[error("slug exceeds {MAX_SLUG_LEN} characters")]
    TooLong,
    #[error("slug `{0}` contains characters outside [a-z0-9-]")]
    InvalidChars(String),
    #[error("slug `{0}` must not start or end with a hyphen")]
    EdgeHyphen(String),
}

pub fn validate(input: &str) -> Result<(), SlugError> {
    if input.is_empty() {
        return Err(SlugError::Empty);
    }
    if input.len() > MAX_SLUG_LEN {
        return Err(SlugError::TooLong);
    }
    if !input
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(SlugError::InvalidChars(input.to_string()));
    }
    if input.starts_with('-') || input.ends_with('-') {
        return Err(SlugError::EdgeHyphen(input.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_catalog_slugs() {
        assert_eq!(validate("how-to-use-react-context-effectively"), Ok(()));
        assert_eq!(validate("2023-in-review"), Ok(()));
        assert_eq!(validate("a"), Ok(()));
    }

    #[test]
    fn rejects_empty_and_overlong() {
        assert_eq!(validate(""), Err(SlugError::Empty));
        let long = "a".repeat(MAX_SLUG_LEN + 1);
        assert_eq!(validate(&long), Err(SlugError::TooLong));
    }

    #[test]
    fn rejects_unexpected_characters() {
        assert!(matches!(
            validate("Hello-World"),
            Err(SlugError::InvalidChars(_))
        ));
        assert!(matches!(
            validate("path/traversal"),
            Err(SlugError::InvalidChars(_))
        ));
        assert!(matches!(validate("a b"), Err(SlugError::InvalidChars(_))));
    }

    #[test]
    fn rejects_edge_hyphens() {
        assert!(matches!(validate("-lead"), Err(SlugError::EdgeHyphen(_))));
        assert!(matches!(validate("trail-"), Err(SlugError::EdgeHyphen(_))));
    }
}
