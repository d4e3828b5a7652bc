use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

use crate::entry::CacheEntry;
use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cache_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub cache_key:    String,
    /// JSON-encoded payload.
    #[sea_orm(column_type = "Text")]
    pub value:        String,
    pub created_at:   DateTimeUtc,
    pub expires_at:   DateTimeUtc,
    pub is_stale:     bool,
    /// Why the entry was flagged; cleared on every rewrite.
    pub stale_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for CacheEntry {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(CacheEntry {
            key:        model.cache_key,
            value:      serde_json::from_str(&model.value)?,
            created_at: model.created_at,
            expires_at: model.expires_at,
            is_stale:   model.is_stale,
        })
    }
}

impl TryFrom<&CacheEntry> for ActiveModel {
    type Error = StoreError;

    fn try_from(entry: &CacheEntry) -> Result<Self, Self::Error> {
        Ok(ActiveModel {
            cache_key:    Set(entry.key.clone()),
            value:        Set(serde_json::to_string(&entry.value)?),
            created_at:   Set(entry.created_at),
            expires_at:   Set(entry.expires_at),
            is_stale:     Set(entry.is_stale),
            stale_reason: Set(None),
        })
    }
}
