//! Error type for single-tag failures.

use thiserror::Error;

/// A single tag could not be derived, converted or stored.
///
/// Header synthesis logs these and carries on with the remaining tags.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Tag {tag}: {message}")]
pub struct TagConversionError {
    /// Tag keyword or `(gggg,eeee)` form
    pub tag: String,
    /// What went wrong
    pub message: String,
}

impl TagConversionError {
    pub fn new(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            message: message.into(),
        }
    }
}
