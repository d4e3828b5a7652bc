use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "refresh_request_migration"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RefreshQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RefreshQueue::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RefreshQueue::CacheKey).string().not_null())
                    .col(ColumnDef::new(RefreshQueue::Reason).string().not_null())
                    .col(ColumnDef::new(RefreshQueue::QueuedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RefreshQueue::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum RefreshQueue {
    Table,
    Id,
    CacheKey,
    Reason,
    QueuedAt,
}
