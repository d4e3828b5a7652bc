use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "cache_entry_migration"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CacheEntries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CacheEntries::CacheKey).string().not_null().primary_key())
                    .col(ColumnDef::new(CacheEntries::Value).text().not_null())
                    .col(ColumnDef::new(CacheEntries::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(CacheEntries::ExpiresAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(CacheEntries::IsStale).boolean().not_null().default(false))
                    .col(ColumnDef::new(CacheEntries::StaleReason).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-cache_entries-expires_at")
                    .table(CacheEntries::Table)
                    .col(CacheEntries::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CacheEntries::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum CacheEntries {
    Table,
    CacheKey,
    Value,
    CreatedAt,
    ExpiresAt,
    IsStale,
    StaleReason,
}
