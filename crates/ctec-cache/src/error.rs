//! Cache error types.
//!
//! Reads never surface these to callers of [`QueryCache::get`](crate::QueryCache::get):
//! the cache is an optimization, so a failed read is reported as a miss. Writes and
//! invalidations return them so the calling mutation can report stale state.

use std::fmt;
use std::time::Duration;

/// Errors that can occur while talking to a cache store.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The store rejected a command or the connection failed mid-command.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// No pooled connection could be obtained.
    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// The connection pool could not be built from the configuration.
    #[error("Failed to create connection pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    /// A value could not be serialized for storage.
    #[error("Failed to encode cached value: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A stored value could not be deserialized.
    #[error("Failed to decode cached value: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The store did not answer within the configured read timeout.
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

impl CacheError {
    /// Returns `true` if the store itself could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Pool(_) | Self::CreatePool(_) | Self::Timeout(_)
        ) || matches!(self, Self::Redis(e) if e.is_io_error() || e.is_connection_dropped())
    }

    /// Returns `true` if this is a serialization error.
    #[must_use]
    pub fn is_codec_error(&self) -> bool {
        matches!(self, Self::Encode(_) | Self::Decode(_))
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Encode(_) | Self::Decode(_) => ErrorCategory::Codec,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Redis(_) | Self::Pool(_) | Self::CreatePool(_) => ErrorCategory::Infrastructure,
        }
    }
}

/// Categories of cache errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection, pool or command failure.
    Infrastructure,
    /// Serialization failure.
    Codec,
    /// Read timeout.
    Timeout,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Codec => write!(f, "codec"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
