use sea_orm::entity::prelude::*;

/// A request for the background worker to rebuild a cache key. Rows are consumed by the worker, not by this crate.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "refresh_queue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id:        i32,
    pub cache_key: String,
    pub reason:    String,
    pub queued_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
