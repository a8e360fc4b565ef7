//! In-process store with the same layout and semantics as the Redis store.
//!
//! Used when Redis is disabled or unreachable, and in tests. A [`MemoryBackend`] plays
//! the role of the physical store; several [`MemoryStore`] handles with different
//! namespaces may share one backend. Every operation holds the backend lock for its
//! whole duration, so invalidation is atomic.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::CacheResult;
use crate::key::{Namespace, TagPointer};
use crate::params::{CacheParams, Invalidation};
use crate::store::TagCacheStore;

struct Field {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Field {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

enum Slot {
    Hash(HashMap<String, Field>),
    Set(BTreeSet<String>),
}

/// Puts between two sweeps of expired fields.
pub const SWEEP_EVERY_PUTS: u64 = 128;

#[derive(Default)]
struct Keyspace {
    slots: HashMap<String, Slot>,
    puts_since_sweep: u64,
}

impl Keyspace {
    /// Drop expired fields everywhere, and hashes left empty. Returns the number of
    /// fields removed.
    fn sweep_expired(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        self.slots.retain(|_, slot| match slot {
            Slot::Hash(hash) => {
                let before = hash.len();
                hash.retain(|_, field| field.is_live(now));
                removed += before - hash.len();
                !hash.is_empty()
            }
            Slot::Set(_) => true,
        });
        self.puts_since_sweep = 0;
        removed
    }

    fn record_put(&mut self, now: Instant) {
        self.puts_since_sweep += 1;
        if self.puts_since_sweep >= SWEEP_EVERY_PUTS {
            let removed = self.sweep_expired(now);
            if removed > 0 {
                tracing::debug!(removed, "Swept expired in-process cache fields");
            }
        }
    }

    fn hget(&mut self, key: &str, field: &str, now: Instant) -> Option<Vec<u8>> {
        let Some(Slot::Hash(hash)) = self.slots.get_mut(key) else {
            return None;
        };
        let live = hash.get(field)?.is_live(now);
        if live {
            return hash.get(field).map(|f| f.value.clone());
        }
        hash.remove(field);
        if hash.is_empty() {
            self.slots.remove(key);
        }
        None
    }

    fn hset(&mut self, key: &str, field: &str, value: Vec<u8>, expires_at: Option<Instant>) {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::Hash(HashMap::new()));
        if !matches!(slot, Slot::Hash(_)) {
            *slot = Slot::Hash(HashMap::new());
        }
        if let Slot::Hash(hash) = slot {
            hash.insert(field.to_string(), Field { value, expires_at });
        }
    }

    fn hdel(&mut self, key: &str, field: &str) {
        if let Some(Slot::Hash(hash)) = self.slots.get_mut(key) {
            hash.remove(field);
            if hash.is_empty() {
                self.slots.remove(key);
            }
        }
    }

    fn sadd(&mut self, key: &str, member: &str) {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::Set(BTreeSet::new()));
        if !matches!(slot, Slot::Set(_)) {
            *slot = Slot::Set(BTreeSet::new());
        }
        if let Slot::Set(set) = slot {
            set.insert(member.to_string());
        }
    }

    fn smembers(&self, key: &str) -> Vec<String> {
        match self.slots.get(key) {
            Some(Slot::Set(set)) => set.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn del(&mut self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }
}

/// Shared in-process physical store.
#[derive(Default)]
pub struct MemoryBackend {
    keyspace: Mutex<Keyspace>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of physical keys across all namespaces.
    pub fn key_count(&self) -> usize {
        self.keyspace.lock().slots.len()
    }

    /// Whether a physical key exists (expired fields are swept only periodically).
    pub fn contains_key(&self, key: &str) -> bool {
        self.keyspace.lock().slots.contains_key(key)
    }

    /// Remove expired fields across all namespaces now.
    ///
    /// Also runs every [`SWEEP_EVERY_PUTS`] writes. Returns the number of fields
    /// removed.
    pub fn cleanup_expired(&self) -> usize {
        self.keyspace.lock().sweep_expired(Instant::now())
    }
}

/// Tag-indexed cache store held in process memory.
pub struct MemoryStore {
    backend: Arc<MemoryBackend>,
    namespace: Namespace,
}

impl MemoryStore {
    /// Store with its own private backend.
    pub fn new(namespace: Namespace) -> Self {
        Self::shared(MemoryBackend::new(), namespace)
    }

    /// Store sharing `backend` with other namespaces.
    pub fn shared(backend: Arc<MemoryBackend>, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }

    pub fn backend(&self) -> &Arc<MemoryBackend> {
        &self.backend
    }
}

#[async_trait]
impl TagCacheStore for MemoryStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn get_raw(&self, key: &str, params: &CacheParams) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut ks = self.backend.keyspace.lock();

        if !params.auto_invalidate {
            return Ok(ks.hget(&self.namespace.tag_only_key(), key, now));
        }

        if let Some(tag) = &params.tag {
            let pointer = ks
                .hget(&self.namespace.tags_map_key(), tag, now)
                .and_then(|raw| String::from_utf8(raw).ok())
                .and_then(|raw| TagPointer::decode(&raw));
            return Ok(pointer.and_then(|p| ks.hget(&p.location, key, now)));
        }

        let location = self.namespace.composite_key(&params.dependencies);
        Ok(ks.hget(location.as_str(), key, now))
    }

    async fn put_raw(&self, key: &str, value: Vec<u8>, params: &CacheParams) -> CacheResult<()> {
        let now = Instant::now();
        let expires_at = params.ttl.map(|ttl| now + ttl);
        let location = if params.dependencies.is_empty() {
            self.namespace.tag_only_key()
        } else {
            self.namespace
                .composite_key(&params.dependencies)
                .as_str()
                .to_string()
        };

        let mut ks = self.backend.keyspace.lock();
        ks.hset(&location, key, value, expires_at);
        if let Some(tag) = &params.tag {
            let pointer = TagPointer::new(&location, key).encode().into_bytes();
            ks.hset(&self.namespace.tags_map_key(), tag, pointer, expires_at);
        }
        for table in params.dependencies.iter() {
            ks.sadd(&self.namespace.table_set_key(table), &location);
        }
        ks.record_put(now);
        Ok(())
    }

    async fn invalidate(&self, request: &Invalidation) -> CacheResult<()> {
        if request.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let tags_map = self.namespace.tags_map_key();
        let mut ks = self.backend.keyspace.lock();

        for tag in &request.tags {
            let pointer = ks
                .hget(&tags_map, tag, now)
                .and_then(|raw| String::from_utf8(raw).ok())
                .and_then(|raw| TagPointer::decode(&raw));
            if let Some(p) = pointer {
                ks.hdel(&p.location, &p.key);
            }
            ks.hdel(&tags_map, tag);
        }

        for table in &request.tables {
            let set_key = self.namespace.table_set_key(table);
            for location in ks.smembers(&set_key) {
                ks.del(&location);
            }
            ks.del(&set_key);
        }
        Ok(())
    }

    async fn clear_namespace(&self) -> CacheResult<u64> {
        let prefix = self.namespace.prefix();
        let mut ks = self.backend.keyspace.lock();
        let before = ks.slots.len();
        ks.slots.retain(|key, _| !key.starts_with(&prefix));
        Ok((before - ks.slots.len()) as u64)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(Namespace::new("mem-test"))
    }

    #[tokio::test]
    async fn test_put_writes_all_indexes() {
        let store = store();
        let params = CacheParams::tables(["players", "servers"]).with_tag("x");
        store.put_raw("k", b"v".to_vec(), &params).await.unwrap();

        let ns = store.namespace().clone();
        let location = ns.composite_key(&params.dependencies);
        let backend = store.backend();
        assert!(backend.contains_key(location.as_str()));
        assert!(backend.contains_key(&ns.tags_map_key()));
        assert!(backend.contains_key(&ns.table_set_key("players")));
        assert!(backend.contains_key(&ns.table_set_key("servers")));
        assert!(!backend.contains_key(&ns.tag_only_key()));
    }

    #[tokio::test]
    async fn test_table_invalidation_drops_index_set() {
        let store = store();
        let params = CacheParams::tables(["players"]);
        store.put_raw("k", b"v".to_vec(), &params).await.unwrap();
        store
            .invalidate(&Invalidation::tables(["players"]))
            .await
            .unwrap();

        assert_eq!(store.backend().key_count(), 0);
        assert_eq!(store.get_raw("k", &params).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_field_is_a_miss() {
        let store = store();
        let params =
            CacheParams::tables(["players"]).with_ttl(std::time::Duration::from_millis(20));
        store.put_raw("k", b"v".to_vec(), &params).await.unwrap();
        assert!(store.get_raw("k", &params).await.unwrap().is_some());

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        assert_eq!(store.get_raw("k", &params).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tag_invalidation_of_unknown_tag_is_noop() {
        let store = store();
        let params = CacheParams::tables(["players"]);
        store.put_raw("k", b"v".to_vec(), &params).await.unwrap();
        store
            .invalidate(&Invalidation::tags(["missing"]))
            .await
            .unwrap();
        assert!(store.get_raw("k", &params).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_later_puts_sweep_expired_fields() {
        let store = store();
        let ns = store.namespace().clone();
        let short = CacheParams::tables(["players"])
            .with_tag("stale")
            .with_ttl(std::time::Duration::from_millis(20));
        store.put_raw("old", b"v".to_vec(), &short).await.unwrap();
        let old_location = ns.composite_key(&short.dependencies);
        assert!(store.backend().contains_key(old_location.as_str()));

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;

        let long = CacheParams::tables(["servers"]);
        for i in 0..SWEEP_EVERY_PUTS {
            store
                .put_raw(&format!("k{i}"), b"v".to_vec(), &long)
                .await
                .unwrap();
        }

        let backend = store.backend();
        assert!(!backend.contains_key(old_location.as_str()));
        assert!(!backend.contains_key(&ns.tags_map_key()));
        assert!(store.get_raw("k0", &long).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_expired_keeps_live_fields() {
        let store = store();
        let short =
            CacheParams::tables(["players"]).with_ttl(std::time::Duration::from_millis(20));
        let live = CacheParams::tables(["players"]);
        store.put_raw("gone", b"v".to_vec(), &short).await.unwrap();
        store.put_raw("kept", b"v".to_vec(), &live).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;

        assert_eq!(store.backend().cleanup_expired(), 1);
        assert_eq!(store.backend().cleanup_expired(), 0);
        assert!(store.get_raw("kept", &live).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_namespace_leaves_nested_namespace() {
        let backend = MemoryBackend::new();
        let parent = MemoryStore::shared(backend.clone(), Namespace::new("test"));
        let child = MemoryStore::shared(backend.clone(), Namespace::new("test:run1"));
        let params = CacheParams::tables(["t"]);

        child.put_raw("k", b"child".to_vec(), &params).await.unwrap();
        parent.put_raw("k", b"parent".to_vec(), &params).await.unwrap();

        assert_eq!(parent.clear_namespace().await.unwrap(), 2);
        assert_eq!(
            child.get_raw("k", &params).await.unwrap().as_deref(),
            Some(&b"child"[..])
        );
        assert_eq!(parent.get_raw("k", &params).await.unwrap(), None);

        assert_eq!(child.clear_namespace().await.unwrap(), 2);
        assert_eq!(backend.key_count(), 0);
    }
}
