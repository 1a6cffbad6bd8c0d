//! Error types for Switchyard Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected input; `field` names the offending attribute
    #[error("Validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    /// Unresolved group, alias, active group, key or batch target
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Persistence errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a validation error on `field`
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The offending field, if this is a validation error
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Whether re-issuing the same operation could succeed without changing the input.
    ///
    /// Validation and lookup failures need corrected input; persistence failures
    /// may clear up on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Store(_) | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// An alias that existed under both the old and the new name of a renamed group.
///
/// Renames resolve this by keeping the alias from the group being renamed, so the
/// conflict is reported back to the caller instead of failing the rename.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("alias '{alias}' already existed in group '{group}' and was overwritten")]
pub struct AliasConflict {
    /// Group the alias was merged into
    pub group: String,
    /// Alias name present on both sides
    pub alias: String,
}
