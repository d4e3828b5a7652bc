use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use fieldx::fxstruct;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use moka::Expiry;

use crate::entry::CacheEntry;
use crate::error::StoreError;
use crate::traits::CacheStore;

// Evicts every entry at its own TTL. Reads still check `expires_at` against the service clock, this only keeps the
// memory footprint honest.
struct EntryExpiry;

impl EntryExpiry {
    fn ttl_of(entry: &CacheEntry) -> Option<Duration> {
        entry.ttl().to_std().ok()
    }
}

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Self::ttl_of(value)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Self::ttl_of(value)
    }
}

/// Per-process tier over a moka cache. Not shared between instances.
#[fxstruct(sync, no_new, builder)]
pub struct MemoryStore {
    #[fieldx(get(copy), default(10_000))]
    max_capacity: u64,

    #[fieldx(optional, get(off))]
    name: &'static str,

    #[fieldx(lazy, get(clone), builder(off))]
    cache: Arc<Cache<String, CacheEntry>>,
}

impl MemoryStore {
    fn build_cache(&self) -> Arc<Cache<String, CacheEntry>> {
        Arc::new(
            Cache::builder()
                .max_capacity(self.max_capacity())
                .name(self.name.unwrap_or("lms-memory-cache"))
                .eviction_policy(EvictionPolicy::tiny_lfu())
                .expire_after(EntryExpiry)
                .build(),
        )
    }

    /// The entry as cached, without checking its expiry against any clock.
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.cache().get(key).await
    }

    pub async fn insert(&self, entry: CacheEntry) {
        self.cache().insert(entry.key.clone(), entry).await;
    }

    /// Returns `true` if the key was cached.
    pub async fn remove(&self, key: &str) -> bool {
        self.cache().remove(key).await.is_some()
    }

    /// Drop everything this process has cached.
    pub fn clear(&self) {
        self.cache().invalidate_all();
    }

    pub async fn len(&self) -> u64 {
        let cache = self.cache();
        cache.run_pending_tasks().await;
        cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// The memory tier never fails; the trait methods only wrap the inherent ones.
#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entry(key).await)
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), StoreError> {
        self.insert(entry).await;
        Ok(())
    }

    async fn purge(&self, key: Option<&str>) -> Result<u64, StoreError> {
        Ok(match key {
            Some(key) => self.remove(key).await as u64,
            None => {
                let count = self.len().await;
                self.clear();
                count
            }
        })
    }
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryStore {{ max_capacity: {} }}", self.max_capacity())
    }
}
