//! Wiring of the cache, the whitelist database and the cascade from [`AppConfig`].

use std::sync::Arc;

use anyhow::Context;
use ctec_cache::{QueryCache, RedisStore};
use ctec_whitelist::WhitelistCascade;
use ctec_whitelist_postgres::{PgPool, PgWhitelistStore, WhitelistAdmin, create_pool, migrations};

use crate::config::{AppConfig, CacheConfig, PostgresConfig, RedisConfig};

/// Create the query cache based on configuration.
///
/// - **Redis disabled**: in-process store
/// - **Redis enabled**: connects to Redis, falls back to the in-process store on failure
///
/// A fallback cache is private to this process, so invalidations issued by other
/// instances will not reach it.
pub async fn create_query_cache(redis: &RedisConfig, cache: &CacheConfig) -> QueryCache {
    let namespace = cache.namespace();

    if !redis.enabled {
        tracing::info!(namespace = %namespace, "Redis disabled, using in-process cache");
        return QueryCache::in_memory(namespace, cache.settings());
    }

    tracing::info!(url = %redis.url, namespace = %namespace, "Connecting to Redis");

    match RedisStore::connect(&redis.settings(cache.scan_batch_size), namespace.clone()).await {
        Ok(store) => QueryCache::new(Arc::new(store), cache.settings()),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-process cache."
            );
            QueryCache::in_memory(namespace, cache.settings())
        }
    }
}

/// Create the query cache for operator commands that act on the shared store.
///
/// Unlike [`create_query_cache`], a Redis connection failure is returned to the
/// caller instead of falling back to a private in-process store.
pub async fn connect_query_cache(
    redis: &RedisConfig,
    cache: &CacheConfig,
) -> anyhow::Result<QueryCache> {
    let namespace = cache.namespace();

    if !redis.enabled {
        tracing::warn!(
            namespace = %namespace,
            "Redis disabled, command only affects a private in-process cache"
        );
        return Ok(QueryCache::in_memory(namespace, cache.settings()));
    }

    tracing::info!(url = %redis.url, namespace = %namespace, "Connecting to Redis");
    let store = RedisStore::connect(&redis.settings(cache.scan_batch_size), namespace)
        .await
        .with_context(|| format!("failed to connect to Redis at {}", redis.url))?;
    Ok(QueryCache::new(Arc::new(store), cache.settings()))
}

/// Connect to the whitelist database.
pub async fn connect_postgres(config: &PostgresConfig) -> anyhow::Result<PgPool> {
    create_pool(&config.settings())
        .await
        .context("failed to connect to PostgreSQL")
}

/// Everything a whitelist check or mutation needs.
pub struct Services {
    pub cache: QueryCache,
    pub pool: PgPool,
    pub cascade: WhitelistCascade,
    pub admin: WhitelistAdmin,
}

impl Services {
    /// Build the cache and database pool, optionally applying pending migrations.
    pub async fn build(cfg: &AppConfig, migrate: bool) -> anyhow::Result<Self> {
        let cache = create_query_cache(&cfg.redis, &cfg.cache).await;
        let pool = connect_postgres(&cfg.postgres).await?;

        if migrate {
            migrations::run(&pool)
                .await
                .context("failed to apply migrations")?;
        }

        let store = Arc::new(PgWhitelistStore::new(pool.clone()));
        let cascade = WhitelistCascade::new(store, cache.clone(), cfg.whitelist.cascade_config());
        let admin = WhitelistAdmin::new(pool.clone(), cache.clone());

        Ok(Self {
            cache,
            pool,
            cascade,
            admin,
        })
    }

    /// Release the cache store and database connections.
    pub async fn shutdown(self) {
        self.cache.shutdown().await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_redis_disabled_uses_memory_store() {
        let redis = RedisConfig::default();
        let cache_config = CacheConfig {
            namespace: Some("bootstrap-test".into()),
            ..CacheConfig::default()
        };

        let cache = create_query_cache(&redis, &cache_config).await;
        assert_eq!(cache.namespace().as_str(), "bootstrap-test");
        assert!(cache.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back() {
        let redis = RedisConfig {
            enabled: true,
            // Nothing listens on the discard port.
            url: "redis://127.0.0.1:9".into(),
            timeout_ms: 200,
            ..RedisConfig::default()
        };

        let cache = create_query_cache(&redis, &CacheConfig::default()).await;
        assert!(cache.ping().await.is_ok());
        assert_eq!(cache.namespace(), &ctec_cache::Namespace::default());
    }

    #[tokio::test]
    async fn test_strict_connect_reports_unreachable_redis() {
        let redis = RedisConfig {
            enabled: true,
            url: "redis://127.0.0.1:9".into(),
            timeout_ms: 200,
            ..RedisConfig::default()
        };

        let err = connect_query_cache(&redis, &CacheConfig::default())
            .await
            .err()
            .expect("unreachable Redis must be reported");
        assert!(format!("{err:#}").contains("failed to connect to Redis"));
    }

    #[tokio::test]
    async fn test_strict_connect_without_redis_uses_memory_store() {
        let cache_config = CacheConfig {
            namespace: Some("strict-test".into()),
            ..CacheConfig::default()
        };

        let cache = connect_query_cache(&RedisConfig::default(), &cache_config)
            .await
            .unwrap();
        assert_eq!(cache.namespace().as_str(), "strict-test");
        assert!(cache.ping().await.is_ok());
    }
}
