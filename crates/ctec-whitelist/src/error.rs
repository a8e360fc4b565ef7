//! Error types for whitelist lookups.

/// Errors that can occur while reading whitelist records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing database could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// A query failed.
    #[error("Query error: {message}")]
    Query {
        /// Description of the query error.
        message: String,
    },

    /// A stored record could not be interpreted.
    #[error("Invalid record: {message}")]
    InvalidRecord {
        /// Description of why the record is invalid.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Query` error.
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Returns `true` if the store could not be reached at all.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Result type for whitelist store operations.
pub type StoreResult<T> = Result<T, StoreError>;
