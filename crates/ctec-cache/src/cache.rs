//! Typed cache facade used by query callers.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec;
use crate::error::{CacheError, CacheResult};
use crate::key::Namespace;
use crate::memory::MemoryStore;
use crate::params::{CacheParams, Invalidation};
use crate::store::TagCacheStore;

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "ctec_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "ctec_cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "ctec_cache_errors_total";
}

/// Behaviour shared by every call through a [`QueryCache`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL applied when a call does not set one. `None` or zero disables expiry.
    pub default_ttl: Option<Duration>,
    /// Reads slower than this are abandoned and treated as misses.
    pub read_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(120)),
            read_timeout: Duration::from_millis(250),
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Store or codec failures (each also counted as a miss on reads).
    pub errors: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Handle to a tag-indexed query cache.
///
/// Cheap to clone; all clones share one store and one set of counters. Reads fail
/// open: any store, timeout or decode failure is logged and reported as a miss.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<dyn TagCacheStore>,
    settings: CacheSettings,
    counters: Arc<Counters>,
}

impl QueryCache {
    pub fn new(store: Arc<dyn TagCacheStore>, settings: CacheSettings) -> Self {
        Self {
            store,
            settings,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Cache backed by a private in-process store.
    pub fn in_memory(namespace: Namespace, settings: CacheSettings) -> Self {
        Self::new(Arc::new(MemoryStore::new(namespace)), settings)
    }

    pub fn namespace(&self) -> &Namespace {
        self.store.namespace()
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn TagCacheStore> {
        &self.store
    }

    /// Look up `key`. Never fails: problems are logged and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, params: &CacheParams) -> Option<T> {
        let read = self.store.get_raw(key, params);
        let lookup = tokio::time::timeout(self.settings.read_timeout, read)
            .await
            .unwrap_or(Err(CacheError::Timeout(self.settings.read_timeout)));

        let bytes = match lookup {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(namespace = %self.namespace(), key = %key, "cache miss");
                self.record_miss();
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    namespace = %self.namespace(),
                    key = %key,
                    error = %e,
                    category = %e.category(),
                    "Cache read failed, treating as miss"
                );
                self.record_error();
                self.record_miss();
                return None;
            }
        };

        match codec::decode(&bytes) {
            Ok(value) => {
                tracing::debug!(namespace = %self.namespace(), key = %key, "cache hit");
                self.record_hit();
                Some(value)
            }
            Err(e) => {
                tracing::warn!(
                    namespace = %self.namespace(),
                    key = %key,
                    error = %e,
                    "Failed to decode cached value, treating as miss"
                );
                self.record_error();
                self.record_miss();
                None
            }
        }
    }

    /// Write `value` under `key` with the dependencies, tag and TTL in `params`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the store write fails.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        params: &CacheParams,
    ) -> CacheResult<()> {
        let bytes = codec::encode(value)?;
        let mut params = params.clone();
        params.ttl = params.effective_ttl(self.settings.default_ttl);
        self.store.put_raw(key, bytes, &params).await
    }

    /// Read-through lookup.
    ///
    /// On a miss `fetch` runs; a successful result is written back (a failed write is
    /// logged, not returned) and handed to the caller. Fetch errors are returned
    /// unchanged and nothing is cached.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        params: &CacheParams,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key, params).await {
            return Ok(cached);
        }

        let fresh = fetch().await?;
        if let Err(e) = self.put(key, &fresh, params).await {
            tracing::warn!(
                namespace = %self.namespace(),
                key = %key,
                error = %e,
                "Failed to write through cache"
            );
            self.record_error();
        }
        Ok(fresh)
    }

    /// Atomically purge everything written under `tags` or depending on `tables`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not run the invalidation. Entries that
    /// should have been purged may then be served until their TTL expires, so
    /// mutation paths must surface this error.
    pub async fn invalidate<I, J, S, U>(&self, tags: I, tables: J) -> CacheResult<()>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = U>,
        S: Into<String>,
        U: Into<String>,
    {
        let request = Invalidation::tags(tags).with_tables(tables);
        self.invalidate_request(&request).await
    }

    /// [`invalidate`](Self::invalidate) with a prepared request.
    pub async fn invalidate_request(&self, request: &Invalidation) -> CacheResult<()> {
        self.store.invalidate(request).await.inspect_err(|e| {
            tracing::error!(
                namespace = %self.namespace(),
                tags = ?request.tags,
                tables = ?request.tables,
                error = %e,
                "Cache invalidation failed; stale entries may persist until TTL expiry"
            );
            self.record_error();
        })
    }

    /// Delete every key under this cache's namespace. Returns the number removed.
    pub async fn clear_namespace(&self) -> CacheResult<u64> {
        self.store.clear_namespace().await
    }

    /// Check that the store is reachable.
    pub async fn ping(&self) -> CacheResult<()> {
        self.store.ping().await
    }

    /// Release the store's connections.
    pub async fn shutdown(&self) {
        self.store.close().await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    fn record_hit(&self) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::CACHE_HITS_TOTAL, "namespace" => self.namespace().to_string())
            .increment(1);
    }

    fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::CACHE_MISSES_TOTAL, "namespace" => self.namespace().to_string())
            .increment(1);
    }

    fn record_error(&self) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::CACHE_ERRORS_TOTAL, "namespace" => self.namespace().to_string())
            .increment(1);
    }
}
