//! Error types for the PostgreSQL whitelist backend.

use ctec_cache::CacheError;
use ctec_whitelist::StoreError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique constraint violations (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for foreign key violations (23503).
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Returns `true` if the error means the database could not be reached.
fn is_connection_failure(err: &SqlxError) -> bool {
    matches!(
        err,
        SqlxError::Io(_) | SqlxError::Tls(_) | SqlxError::PoolTimedOut | SqlxError::PoolClosed
    )
}

/// Errors from connecting to and reading the whitelist database.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) if is_connection_failure(&e) => {
                StoreError::connection(e.to_string())
            }
            PostgresError::Database(e) => StoreError::query(e.to_string()),
            PostgresError::Migration(e) => StoreError::query(format!("Migration error: {e}")),
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

/// Errors from whitelist mutations.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// The mutation itself failed; nothing was changed.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// The mutation referenced a record that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The mutation was committed but the cache could not be invalidated. Lookups
    /// may serve the previous state until the cached entries expire.
    #[error("Change to {table} committed but cache invalidation failed: {source}")]
    StaleCache {
        table: &'static str,
        #[source]
        source: CacheError,
    },
}

impl AdminError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Returns `true` if the change was committed and only invalidation failed.
    #[must_use]
    pub fn is_stale_cache(&self) -> bool {
        matches!(self, Self::StaleCache { .. })
    }

    /// Returns `true` if this is a constraint violation.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Database(e) => {
                has_pg_error_code(e, PG_UNIQUE_VIOLATION)
                    || has_pg_error_code(e, PG_FOREIGN_KEY_VIOLATION)
            }
            _ => false,
        }
    }
}

/// Result type alias for whitelist mutations.
pub type AdminResult<T> = std::result::Result<T, AdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_connection_error() {
        let err: StoreError = PostgresError::Database(SqlxError::PoolTimedOut).into();
        assert!(err.is_connection_error());

        let err: StoreError = PostgresError::Database(SqlxError::RowNotFound).into();
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_stale_cache_error() {
        let err = AdminError::StaleCache {
            table: "minecraft_players",
            source: CacheError::Timeout(std::time::Duration::from_millis(5)),
        };
        assert!(err.is_stale_cache());
        assert!(err.to_string().contains("minecraft_players"));
        assert!(!AdminError::not_found("server").is_stale_cache());
    }
}
