use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("diagram validation failed: {message}")]
    Validation { message: String },
    #[error("no {entity} found in image")]
    MetadataNotFound { entity: &'static str },
    #[error("internal invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn metadata_not_found(entity: &'static str) -> Self {
        Self::MetadataNotFound { entity }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
