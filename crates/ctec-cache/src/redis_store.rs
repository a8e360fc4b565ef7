//! Redis-backed store.
//!
//! Composite locations and the tag-only partition are hashes with per-field expiry
//! (`HPEXPIRE`, Redis 7.4+). Tag resolution and invalidation run as Lua scripts so
//! readers never observe a TagIndex pointer into a half-deleted location.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};

use crate::error::CacheResult;
use crate::key::{Namespace, TagPointer};
use crate::params::{CacheParams, Invalidation};
use crate::scripts::{self, RegisteredScript};
use crate::store::TagCacheStore;

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// Redis connection URL (e.g. `redis://localhost:6379`).
    pub url: String,
    /// Maximum pooled connections.
    pub pool_size: usize,
    /// Wait/create/recycle timeout for pooled connections.
    pub timeout: Duration,
    /// `COUNT` hint and delete batch size for namespace clearing.
    pub scan_batch_size: usize,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            timeout: Duration::from_millis(5000),
            scan_batch_size: 100,
        }
    }
}

/// Tag-indexed cache store on Redis.
pub struct RedisStore {
    pool: Pool,
    namespace: Namespace,
    scan_batch_size: usize,
    get_by_tag: RegisteredScript,
    invalidate: RegisteredScript,
}

impl RedisStore {
    /// Build the connection pool, verify connectivity and register the scripts.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created, no connection can be
    /// established, or script registration fails.
    pub async fn connect(settings: &RedisSettings, namespace: Namespace) -> CacheResult<Self> {
        let mut config = deadpool_redis::Config::from_url(&settings.url);
        let mut pool_config = deadpool_redis::PoolConfig::new(settings.pool_size.max(1));
        pool_config.timeouts.wait = Some(settings.timeout);
        pool_config.timeouts.create = Some(settings.timeout);
        pool_config.timeouts.recycle = Some(settings.timeout);
        config.pool = Some(pool_config);

        let pool = config.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
        let store = Self::from_pool(pool, namespace, settings.scan_batch_size);
        store.register_scripts().await?;

        tracing::info!(namespace = %store.namespace, "Redis cache store connected");
        Ok(store)
    }

    /// Wrap an existing pool. Scripts are not registered until first use.
    pub fn from_pool(pool: Pool, namespace: Namespace, scan_batch_size: usize) -> Self {
        Self {
            pool,
            namespace,
            scan_batch_size: scan_batch_size.max(1),
            get_by_tag: RegisteredScript::new(scripts::GET_BY_TAG),
            invalidate: RegisteredScript::new(scripts::INVALIDATE),
        }
    }

    /// Upload every script body to the server's script cache.
    pub async fn register_scripts(&self) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        for script in [&self.get_by_tag, &self.invalidate] {
            script.load(&mut conn).await?;
        }
        Ok(())
    }

    /// Close the pool; outstanding connections are dropped when returned.
    pub fn disconnect(self) {
        self.pool.close();
        tracing::info!(namespace = %self.namespace, "Redis cache store disconnected");
    }

    async fn conn(&self) -> CacheResult<Connection> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl TagCacheStore for RedisStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn get_raw(&self, key: &str, params: &CacheParams) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;

        if !params.auto_invalidate {
            let value: Option<Vec<u8>> = redis::cmd("HGET")
                .arg(self.namespace.tag_only_key())
                .arg(key)
                .query_async(&mut conn)
                .await?;
            return Ok(value);
        }

        if let Some(tag) = &params.tag {
            let keys = [self.namespace.tags_map_key()];
            let args = [tag.clone(), key.to_string()];
            let value: Option<Vec<u8>> = self.get_by_tag.invoke(&mut conn, &keys, &args).await?;
            return Ok(value);
        }

        let location = self.namespace.composite_key(&params.dependencies);
        let value: Option<Vec<u8>> = redis::cmd("HGET")
            .arg(location.as_str())
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn put_raw(&self, key: &str, value: Vec<u8>, params: &CacheParams) -> CacheResult<()> {
        let ttl_ms = params.ttl.map(|ttl| ttl.as_millis().max(1) as u64);
        let location = if params.dependencies.is_empty() {
            self.namespace.tag_only_key()
        } else {
            self.namespace
                .composite_key(&params.dependencies)
                .as_str()
                .to_string()
        };

        let mut pipe = redis::pipe();

        // Value first.
        pipe.hset(&location, key, value).ignore();
        if let Some(ms) = ttl_ms {
            pipe.cmd("HPEXPIRE")
                .arg(&location)
                .arg(ms)
                .arg("FIELDS")
                .arg(1)
                .arg(key)
                .ignore();
        }

        // Then the indexes that point at it.
        if let Some(tag) = &params.tag {
            let tags_map = self.namespace.tags_map_key();
            pipe.hset(&tags_map, tag, TagPointer::new(&location, key).encode())
                .ignore();
            if let Some(ms) = ttl_ms {
                pipe.cmd("HPEXPIRE")
                    .arg(&tags_map)
                    .arg(ms)
                    .arg("FIELDS")
                    .arg(1)
                    .arg(tag)
                    .ignore();
            }
        }
        for table in params.dependencies.iter() {
            pipe.sadd(self.namespace.table_set_key(table), &location)
                .ignore();
        }

        let mut conn = self.conn().await?;
        let () = pipe.query_async(&mut conn).await?;

        tracing::debug!(
            namespace = %self.namespace,
            key = %key,
            location = %location,
            tag = ?params.tag,
            "cache put"
        );
        Ok(())
    }

    async fn invalidate(&self, request: &Invalidation) -> CacheResult<()> {
        if request.is_empty() {
            return Ok(());
        }

        let mut keys = Vec::with_capacity(request.tables.len() + 1);
        keys.push(self.namespace.tags_map_key());
        keys.extend(
            request
                .tables
                .iter()
                .map(|table| self.namespace.table_set_key(table)),
        );
        let args: Vec<String> = request.tags.iter().cloned().collect();

        let mut conn = self.conn().await?;
        let deleted: i64 = self.invalidate.invoke(&mut conn, &keys, &args).await?;

        tracing::debug!(
            namespace = %self.namespace,
            tags = ?request.tags,
            tables = ?request.tables,
            deleted,
            "cache invalidated"
        );
        Ok(())
    }

    async fn clear_namespace(&self) -> CacheResult<u64> {
        let pattern = self.namespace.scan_pattern();
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_batch_size)
                .query_async(&mut conn)
                .await?;

            for chunk in keys.chunks(self.scan_batch_size) {
                let n: u64 = redis::cmd("UNLINK")
                    .arg(chunk)
                    .query_async(&mut conn)
                    .await?;
                removed += n;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        tracing::info!(namespace = %self.namespace, removed, "cache namespace cleared");
        Ok(removed)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}
