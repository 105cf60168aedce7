//! Common error types

use thiserror::Error;

/// Error parsing a stored or user-provided enum value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    /// What was being parsed (e.g. "subscription status")
    pub kind: &'static str,
    /// The rejected value
    pub value: String,
}

impl ParseEnumError {
    /// Create a new parse error
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
