use thiserror::Error;

/// Failures raised while interpreting forum rows and settings.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("no {entity} with that identifier")]
    NotFound { entity: &'static str },
    #[error("invalid forum data: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
