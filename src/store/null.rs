use async_trait::async_trait;

use crate::entry::CacheEntry;
use crate::error::StoreError;
use crate::traits::CacheStore;
use crate::traits::PersistentStore;

/// Stands in for the persistent tier when persistence is disabled: never hits, accepts and forgets every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl CacheStore for NullStore {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _entry: CacheEntry) -> Result<(), StoreError> {
        Ok(())
    }

    async fn purge(&self, _key: Option<&str>) -> Result<u64, StoreError> {
        Ok(0)
    }
}

#[async_trait]
impl PersistentStore for NullStore {
    async fn mark_stale(&self, _key: &str, _reason: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn queue_refresh(&self, _key: &str, _reason: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
