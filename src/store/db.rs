//! Persistent tier over a SQL database, shared by every server instance.
pub mod driver;
pub mod entity;
pub mod migrations;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveValue::NotSet;
use sea_orm::ActiveValue::Set;
use sea_orm::ColumnTrait;
use sea_orm::DatabaseConnection;
use sea_orm::EntityTrait;
use sea_orm::QueryFilter;
use sea_orm::QueryOrder;
use sea_orm::QuerySelect;
use sea_orm_migration::MigratorTrait;
use tracing::debug;
use tracing::instrument;

use self::driver::DatabaseDriver;
use self::entity::cache_entry;
use self::entity::refresh_request;
use self::entity::CacheEntries;
use self::entity::RefreshQueue;
use self::entity::RefreshRequest;
use self::migrations::Migrator;
use crate::entry::CacheEntry;
use crate::error::StoreError;
use crate::traits::CacheStore;
use crate::traits::PersistentStore;

pub struct DbStore {
    driver: Arc<dyn DatabaseDriver>,
}

impl DbStore {
    pub fn new(driver: Arc<dyn DatabaseDriver>) -> Self {
        Self { driver }
    }

    fn db(&self) -> DatabaseConnection {
        self.driver.connection()
    }

    /// Configure the connection and bring the schema up to date.
    pub async fn prepare(&self) -> Result<(), StoreError> {
        self.driver.configure().await?;
        Migrator::up(&self.db(), None).await?;
        Ok(())
    }

    /// Oldest first. This is what the refresh worker consumes.
    pub async fn pending_refreshes(&self, limit: u64) -> Result<Vec<RefreshRequest>, StoreError> {
        Ok(RefreshQueue::find()
            .order_by_asc(refresh_request::Column::Id)
            .limit(limit)
            .all(&self.db())
            .await?)
    }

    /// Stale reason recorded for a key, if it is flagged.
    pub async fn stale_reason(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(CacheEntries::find_by_id(key.to_string())
            .one(&self.db())
            .await?
            .and_then(|m| m.stale_reason))
    }
}

#[async_trait]
impl CacheStore for DbStore {
    fn name(&self) -> &'static str {
        self.driver.name()
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        CacheEntries::find_by_id(key.to_string())
            .one(&self.db())
            .await?
            .map(CacheEntry::try_from)
            .transpose()
    }

    #[instrument(level = "trace", skip(self, entry), fields(key = %entry.key))]
    async fn set(&self, entry: CacheEntry) -> Result<(), StoreError> {
        let am = cache_entry::ActiveModel::try_from(&entry)?;

        CacheEntries::insert(am)
            .on_conflict(
                OnConflict::column(cache_entry::Column::CacheKey)
                    .update_columns([
                        cache_entry::Column::Value,
                        cache_entry::Column::CreatedAt,
                        cache_entry::Column::ExpiresAt,
                        cache_entry::Column::IsStale,
                        cache_entry::Column::StaleReason,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db())
            .await?;

        Ok(())
    }

    async fn purge(&self, key: Option<&str>) -> Result<u64, StoreError> {
        let result = match key {
            Some(key) => CacheEntries::delete_by_id(key.to_string()).exec(&self.db()).await?,
            None => CacheEntries::delete_many().exec(&self.db()).await?,
        };
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl PersistentStore for DbStore {
    async fn mark_stale(&self, key: &str, reason: &str) -> Result<bool, StoreError> {
        let result = CacheEntries::update_many()
            .col_expr(cache_entry::Column::IsStale, Expr::value(true))
            .col_expr(cache_entry::Column::StaleReason, Expr::value(reason.to_string()))
            .filter(cache_entry::Column::CacheKey.eq(key))
            .exec(&self.db())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn queue_refresh(&self, key: &str, reason: &str) -> Result<(), StoreError> {
        debug!(key, reason, "queueing refresh");
        RefreshQueue::insert(refresh_request::ActiveModel {
            id:        NotSet,
            cache_key: Set(key.to_string()),
            reason:    Set(reason.to_string()),
            queued_at: Set(Utc::now()),
        })
        .exec_without_returning(&self.db())
        .await?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(err) = self.db().close().await {
            tracing::warn!("Closing {} connection: {err}", self.driver.name());
        }
    }
}

impl Debug for DbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DbStore {{ driver: {} }}", self.driver.name())
    }
}
