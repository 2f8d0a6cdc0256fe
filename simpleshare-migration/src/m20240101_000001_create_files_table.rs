use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Files::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Files::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Files::OriginalName).string().not_null())
                    .col(
                        ColumnDef::new(Files::StoredName)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Files::FileSize).big_integer().not_null())
                    .col(ColumnDef::new(Files::MimeType).string())
                    .col(
                        ColumnDef::new(Files::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Files::Uploader)
                            .string()
                            .not_null()
                            .default("Anonymous"),
                    )
                    .col(
                        ColumnDef::new(Files::UploadDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Files::DownloadCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Files::LastAccessed)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Listing is ordered by upload date
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-files-upload_date")
                    .table(Files::Table)
                    .col(Files::UploadDate)
                    .to_owned(),
            )
            .await?;

        // Expiry sweep filters on last access
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-files-last_accessed")
                    .table(Files::Table)
                    .col(Files::LastAccessed)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Files::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Files {
    Table,
    Id,
    OriginalName,
    StoredName,
    FileSize,
    MimeType,
    Description,
    Uploader,
    UploadDate,
    DownloadCount,
    LastAccessed,
}
