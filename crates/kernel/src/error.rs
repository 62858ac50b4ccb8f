//! Page command error types.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::tree::TreeError;

/// Errors returned by page commands.
///
/// Every failed command reports exactly one of these, and nothing it did
/// before failing is kept.
#[derive(Debug, Error)]
pub enum PageError {
    /// Input or business-rule violation, detected before any mutation.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// An ancestor of the page has no published counterpart.
    #[error("page {page_id} has an unpublished parent")]
    UnpublishedParent { page_id: Uuid },

    /// A tree reposition would cross scopes or create a cycle.
    #[error("invalid move: {0}")]
    InvalidMove(String),

    /// Persistence failure; the transaction was rolled back.
    #[error("storage error")]
    Storage(#[from] anyhow::Error),
}

impl PageError {
    /// Shorthand for a validation error on a single field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    /// Validation messages, if this is a validation error.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<TreeError> for PageError {
    fn from(e: TreeError) -> Self {
        Self::InvalidMove(e.to_string())
    }
}

impl From<sqlx::Error> for PageError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.into())
    }
}

/// Validation messages keyed by input field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Messages recorded for `field`.
    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `Ok(())` when empty, otherwise a [`PageError::Validation`].
    pub fn into_result(self) -> Result<(), PageError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PageError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Result type alias using PageError.
pub type PageResult<T> = Result<T, PageError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn collects_messages_per_field() {
        let mut errors = ValidationErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.add("slug", "The slug is already in use.");
        errors.add("title", "The title is required.");
        errors.add("slug", "The slug format is invalid.");

        assert!(errors.has("slug"));
        assert_eq!(errors.get("slug").len(), 2);
        assert!(errors.get("layout_name").is_empty());
        assert_eq!(
            errors.to_string(),
            "slug: The slug is already in use.; slug: The slug format is invalid.; \
             title: The title is required."
        );

        let err = errors.into_result().unwrap_err();
        assert!(err.validation_errors().is_some());
    }

    #[test]
    fn tree_errors_become_invalid_moves() {
        let id = Uuid::now_v7();
        let err = PageError::from(TreeError::SelfReference(id));
        assert!(matches!(err, PageError::InvalidMove(_)));
    }

    #[test]
    fn serializes_as_field_map() {
        let err = PageError::field("id", "The page does not exist.");
        let json = serde_json::to_value(err.validation_errors().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "id": ["The page does not exist."] }));
    }
}
