//! Tag-indexed, table-scoped query result cache.
//!
//! Results are grouped by the set of tables they were computed from. Mutating a table
//! purges every group that includes it, so readers never see a value older than the
//! last invalidation of any of its tables. Entries may also carry a tag for direct
//! lookup and targeted invalidation.
//!
//! Two stores implement [`TagCacheStore`]:
//! - [`RedisStore`]: shared across processes, atomic invalidation via Lua scripts.
//! - [`MemoryStore`]: in-process, used when Redis is disabled or unreachable.
//!
//! [`QueryCache`] wraps either one with typed, fail-open reads.

pub mod cache;
pub mod codec;
pub mod error;
pub mod key;
pub mod memory;
pub mod params;
pub mod redis_store;
pub mod scripts;
pub mod store;

pub use cache::{CacheSettings, CacheStats, QueryCache};
pub use error::{CacheError, CacheResult, ErrorCategory};
pub use key::{CompositeKey, DEFAULT_NAMESPACE, DependencySet, Namespace};
pub use memory::{MemoryBackend, MemoryStore};
pub use params::{CacheParams, Invalidation};
pub use redis_store::{RedisSettings, RedisStore};
pub use store::TagCacheStore;
