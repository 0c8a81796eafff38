//! Domain errors for inbound validation and document transforms.

/// Errors raised while validating input or transforming a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// A required field is absent or blank
    #[error("{0} is required")]
    MissingField(String),

    /// Input could not be interpreted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transaction id or subscriber URL normalized to nothing
    #[error("invalid key")]
    InvalidKey,

    /// Stored document could not be transformed
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl DomainError {
    /// Create a missing field error
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
