//! Integration tests for the Redis cache store.
//!
//! Tests use testcontainers to spin up a real Redis instance. Per-field expiry needs
//! Redis 7.4 or newer, so the image tag is pinned.

use std::sync::Arc;
use std::time::Duration;

use ctec_cache::{
    CacheParams, CacheSettings, Invalidation, Namespace, QueryCache, RedisSettings, RedisStore,
    TagCacheStore,
};
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

/// Get or create the shared Redis container
async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .with_tag("7.4")
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

async fn store(namespace: &str) -> RedisStore {
    let settings = RedisSettings {
        url: get_redis_url().await,
        ..RedisSettings::default()
    };
    RedisStore::connect(&settings, Namespace::new(namespace))
        .await
        .expect("connect redis store")
}

async fn cache(namespace: &str) -> QueryCache {
    QueryCache::new(Arc::new(store(namespace).await), CacheSettings::default())
}

async fn raw_connection() -> redis::aio::MultiplexedConnection {
    redis::Client::open(get_redis_url().await)
        .expect("redis client")
        .get_multiplexed_async_connection()
        .await
        .expect("redis connection")
}

#[tokio::test]
async fn test_ping() {
    let cache = cache("it-ping").await;
    cache.ping().await.expect("ping");
}

#[tokio::test]
async fn test_round_trip_and_table_invalidation() {
    let cache = cache("it-tables").await;
    let players = CacheParams::tables(["minecraft_players"]);
    let servers = CacheParams::tables(["minecraft_servers", "minecraft_ip_blocklist"]);

    cache.put("player:steve", &Some(7_i32), &players).await.unwrap();
    cache.put("server:a", &"srv-a", &servers).await.unwrap();

    assert_eq!(
        cache.get::<Option<i32>>("player:steve", &players).await,
        Some(Some(7))
    );
    assert_eq!(
        cache.get::<String>("server:a", &servers).await.as_deref(),
        Some("srv-a")
    );

    cache
        .invalidate(Vec::<String>::new(), ["minecraft_ip_blocklist"])
        .await
        .unwrap();

    assert_eq!(cache.get::<String>("server:a", &servers).await, None);
    assert_eq!(
        cache.get::<Option<i32>>("player:steve", &players).await,
        Some(Some(7))
    );
}

#[tokio::test]
async fn test_tag_lookup_and_invalidation() {
    let cache = cache("it-tags").await;
    cache
        .put("k", &"v", &CacheParams::tables(["t"]).with_tag("x"))
        .await
        .unwrap();

    let by_tag = CacheParams::tables(Vec::<String>::new()).with_tag("x");
    assert_eq!(cache.get::<String>("k", &by_tag).await.as_deref(), Some("v"));

    cache.invalidate(["x"], Vec::<String>::new()).await.unwrap();

    assert_eq!(cache.get::<String>("k", &by_tag).await, None);
    assert_eq!(cache.get::<String>("k", &CacheParams::tables(["t"])).await, None);
}

#[tokio::test]
async fn test_tag_only_partition_survives_table_invalidation() {
    let cache = cache("it-tag-only").await;
    let params = CacheParams::tag_only().with_tag("feature-flags");
    cache.put("flags", &vec!["a", "b"], &params).await.unwrap();

    cache.invalidate(Vec::<String>::new(), ["t"]).await.unwrap();

    assert_eq!(
        cache.get::<Vec<String>>("flags", &params).await,
        Some(vec!["a".to_string(), "b".to_string()])
    );
}

#[tokio::test]
async fn test_field_expiry() {
    let cache = cache("it-ttl").await;
    let params = CacheParams::tables(["t"]).with_ttl(Duration::from_millis(200));
    cache.put("k", &1_u8, &params).await.unwrap();
    assert_eq!(cache.get::<u8>("k", &params).await, Some(1));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(cache.get::<u8>("k", &params).await, None);
}

#[tokio::test]
async fn test_namespace_isolation_and_clear() {
    let a = cache("it-ns-a").await;
    let b = cache("it-ns-b").await;
    let params = CacheParams::tables(["t"]).with_tag("x");

    a.put("k", &"from-a", &params).await.unwrap();
    b.put("k", &"from-b", &params).await.unwrap();

    b.invalidate(["x"], ["t"]).await.unwrap();
    assert_eq!(a.get::<String>("k", &params).await.as_deref(), Some("from-a"));

    b.put("k", &"again", &params).await.unwrap();
    let removed = b.clear_namespace().await.unwrap();
    assert!(removed >= 3, "expected at least 3 keys removed, got {removed}");
    assert_eq!(b.get::<String>("k", &params).await, None);
    assert_eq!(a.get::<String>("k", &params).await.as_deref(), Some("from-a"));
}

#[tokio::test]
async fn test_glob_characters_in_namespace_are_literal() {
    let wide = cache("it-glob*").await;
    let narrow = cache("it-glob-other").await;
    let params = CacheParams::tables(["t"]);

    wide.put("k", &1_u8, &params).await.unwrap();
    narrow.put("k", &2_u8, &params).await.unwrap();

    wide.clear_namespace().await.unwrap();
    assert_eq!(narrow.get::<u8>("k", &params).await, Some(2));
}

#[tokio::test]
async fn test_clearing_parent_namespace_keeps_nested_one() {
    let parent = cache("it-nest").await;
    let child = cache("it-nest:child").await;
    let params = CacheParams::tables(["t"]).with_tag("x");

    parent.put("k", &"parent", &params).await.unwrap();
    child.put("k", &"child", &params).await.unwrap();

    parent.invalidate(["x"], ["t"]).await.unwrap();
    assert_eq!(child.get::<String>("k", &params).await.as_deref(), Some("child"));

    parent.put("k", &"parent", &params).await.unwrap();
    parent.clear_namespace().await.unwrap();
    assert_eq!(parent.get::<String>("k", &params).await, None);
    assert_eq!(child.get::<String>("k", &params).await.as_deref(), Some("child"));
}

#[tokio::test]
async fn test_scripts_recover_after_flush() {
    let store = store("it-noscript").await;
    let params = CacheParams::tables(["t"]).with_tag("x");
    store.put_raw("k", b"v".to_vec(), &params).await.unwrap();

    let mut conn = raw_connection().await;
    let _: String = redis::cmd("SCRIPT")
        .arg("FLUSH")
        .query_async(&mut conn)
        .await
        .unwrap();

    let by_tag = CacheParams::tables(Vec::<String>::new()).with_tag("x");
    assert_eq!(
        store.get_raw("k", &by_tag).await.unwrap(),
        Some(b"v".to_vec())
    );

    let _: String = redis::cmd("SCRIPT")
        .arg("FLUSH")
        .query_async(&mut conn)
        .await
        .unwrap();

    store
        .invalidate(&Invalidation::tables(["t"]))
        .await
        .unwrap();
    assert_eq!(store.get_raw("k", &params).await.unwrap(), None);
}

#[tokio::test]
async fn test_invalidation_without_matches_is_ok() {
    let store = store("it-empty").await;
    store
        .invalidate(&Invalidation::tables(["never_written"]).with_tags(["nope"]))
        .await
        .unwrap();
    store.invalidate(&Invalidation::new()).await.unwrap();
}
