use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DownloadLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DownloadLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DownloadLogs::FileId).uuid().not_null())
                    .col(
                        ColumnDef::new(DownloadLogs::DownloadDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DownloadLogs::IpAddress).string())
                    .to_owned(),
            )
            .await?;

        // Logs are deleted per file
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-download_logs-file_id")
                    .table(DownloadLogs::Table)
                    .col(DownloadLogs::FileId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DownloadLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DownloadLogs {
    Table,
    Id,
    FileId,
    DownloadDate,
    IpAddress,
}
