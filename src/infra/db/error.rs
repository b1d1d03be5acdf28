use thiserror::Error;

/// Failures raised while building or running SQL through the data layer.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("database handle is not connected")]
    NotConnected,
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error("table `{table}` is not registered for snapshot caching")]
    Unregistered { table: String },
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error("failed to decode column `{column}`: {message}")]
    Decode { column: String, message: String },
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl DataError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn unregistered(table: impl Into<String>) -> Self {
        Self::Unregistered {
            table: table.into(),
        }
    }
}

/// Raised by the query builder before anything reaches the driver.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error("query string is empty")]
    Empty,
    #[error("query has no SELECT, UPDATE, DELETE or INSERT clause: `{query}`")]
    MissingStatement { query: String },
}
