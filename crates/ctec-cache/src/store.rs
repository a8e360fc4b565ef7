//! Store abstraction shared by the Redis and in-process backends.

use async_trait::async_trait;

use crate::error::CacheResult;
use crate::key::Namespace;
use crate::params::{CacheParams, Invalidation};

/// A physical store holding composite locations, the TagIndex and the TableIndex.
///
/// Implementations must be thread-safe (`Send + Sync`); one instance is shared by
/// every request task.
#[async_trait]
pub trait TagCacheStore: Send + Sync {
    /// Namespace every physical key of this store is scoped to.
    fn namespace(&self) -> &Namespace;

    /// Read the raw bytes stored under `key`.
    ///
    /// - `auto_invalidate == false`: look in the tag-only partition, ignoring dependencies.
    /// - tagged: resolve the tag through the TagIndex, then read `key` at that location.
    ///   A missing TagIndex entry is a miss.
    /// - otherwise: read `key` from the composite location of the dependency set.
    ///
    /// Returns `Ok(None)` on a miss.
    async fn get_raw(&self, key: &str, params: &CacheParams) -> CacheResult<Option<Vec<u8>>>;

    /// Write `value` under `key` together with its TagIndex and TableIndex records.
    ///
    /// The TTL in `params` is applied as-is; defaults are resolved by the caller.
    /// Value writes are issued before index writes in a single pipelined batch, so an
    /// interrupted batch can leave a value without its index, never an index pointing
    /// at nothing.
    async fn put_raw(&self, key: &str, value: Vec<u8>, params: &CacheParams) -> CacheResult<()>;

    /// Remove every entry written under `request.tags` and every composite location
    /// indexed under `request.tables`, as one atomic operation.
    ///
    /// A `put_raw` racing with an invalidation of one of its tables is not linearized
    /// against it: if the put lands after the invalidation, the entry stays alive until
    /// the next invalidation of that table or its TTL.
    async fn invalidate(&self, request: &Invalidation) -> CacheResult<()>;

    /// Delete every physical key under this store's namespace.
    ///
    /// Returns the number of keys removed.
    async fn clear_namespace(&self) -> CacheResult<u64>;

    /// Check that the store is reachable.
    async fn ping(&self) -> CacheResult<()>;

    /// Release the underlying connections. Later calls fail.
    async fn close(&self) {}
}
