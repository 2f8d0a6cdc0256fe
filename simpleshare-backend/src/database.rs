use crate::error::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use simpleshare_migration::{Migrator, MigratorTrait};
use std::time::Duration;
use uuid::Uuid;

pub async fn setup_database(database_url: &str) -> Result<DatabaseConnection> {
    tracing::info!("🔗 Connecting to database: {}", database_url);

    // Configure connection options
    let mut opt = ConnectOptions::new(database_url.to_string());
    opt.max_connections(16)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    // Connect to database
    let db = Database::connect(opt).await?;

    // Run migrations
    tracing::info!("🔄 Running database migrations...");
    Migrator::up(&db, None).await?;
    tracing::info!("✅ Migrations completed successfully");

    Ok(db)
}

pub struct CreateFileParams {
    pub id: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub description: String,
    pub uploader: String,
}

// Helper functions for file operations. All of them take any connection so
// they can run inside a transaction.
pub mod file_ops {
    use super::*;
    use chrono::{DateTime, Utc};
    use sea_orm::sea_query::Expr;
    use sea_orm::*;
    use simpleshare_entity::{download_log, file, prelude::*};
    use uuid::Uuid;

    pub async fn create_file_record<C: ConnectionTrait>(
        db: &C,
        params: CreateFileParams,
    ) -> Result<file::Model> {
        let file_model = file::ActiveModel {
            id: Set(params.id),
            original_name: Set(params.original_name),
            stored_name: Set(params.stored_name),
            file_size: Set(params.file_size),
            mime_type: Set(params.mime_type),
            description: Set(params.description),
            uploader: Set(params.uploader),
            ..file::ActiveModel::new()
        };

        let file = file_model.insert(db).await?;
        Ok(file)
    }

    pub async fn get_file_by_id<C: ConnectionTrait>(
        db: &C,
        file_id: Uuid,
    ) -> Result<Option<file::Model>> {
        let file = File::find_by_id(file_id).one(db).await?;
        Ok(file)
    }

    /// Bump the download counter, touch `last_accessed` and append a log row.
    /// Returns `false` if the record no longer exists.
    pub async fn record_download<C: ConnectionTrait>(
        db: &C,
        file_id: Uuid,
        ip_address: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        // Increment in SQL so concurrent downloads are never lost
        let updated = File::update_many()
            .col_expr(
                file::Column::DownloadCount,
                Expr::col(file::Column::DownloadCount).add(1),
            )
            .col_expr(file::Column::LastAccessed, Expr::value(now))
            .filter(file::Column::Id.eq(file_id))
            .exec(db)
            .await?;

        if updated.rows_affected == 0 {
            return Ok(false);
        }

        download_log::ActiveModel {
            file_id: Set(file_id),
            download_date: Set(now),
            ip_address: Set(ip_address),
            ..download_log::ActiveModel::new()
        }
        .insert(db)
        .await?;

        Ok(true)
    }

    /// Delete a file record and its download log. Returns `false` if there was no record.
    pub async fn delete_file_record<C: ConnectionTrait>(db: &C, file_id: Uuid) -> Result<bool> {
        DownloadLog::delete_many()
            .filter(download_log::Column::FileId.eq(file_id))
            .exec(db)
            .await?;

        let result = File::delete_by_id(file_id).exec(db).await?;
        Ok(result.rows_affected > 0)
    }

    /// Delete several file records and their download logs at once
    pub async fn delete_file_records<C: ConnectionTrait>(db: &C, file_ids: &[Uuid]) -> Result<u64> {
        if file_ids.is_empty() {
            return Ok(0);
        }

        DownloadLog::delete_many()
            .filter(download_log::Column::FileId.is_in(file_ids.iter().copied()))
            .exec(db)
            .await?;

        let result = File::delete_many()
            .filter(file::Column::Id.is_in(file_ids.iter().copied()))
            .exec(db)
            .await?;

        Ok(result.rows_affected)
    }

    /// All files, most recent upload first
    pub async fn list_files<C: ConnectionTrait>(db: &C) -> Result<Vec<file::Model>> {
        let files = File::find()
            .order_by_desc(file::Column::UploadDate)
            .all(db)
            .await?;

        Ok(files)
    }

    /// Files whose upload date and last access both predate `cutoff`
    pub async fn find_expired<C: ConnectionTrait>(
        db: &C,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<file::Model>> {
        let files = File::find()
            .filter(file::Column::UploadDate.lt(cutoff))
            .filter(file::Column::LastAccessed.lt(cutoff))
            .all(db)
            .await?;

        Ok(files)
    }

    pub async fn count_files<C: ConnectionTrait>(db: &C) -> Result<u64> {
        Ok(File::find().count(db).await?)
    }

    /// Sum of `file_size` over all records, 0 when there are none
    pub async fn total_size<C: ConnectionTrait>(db: &C) -> Result<i64> {
        let total: Option<Option<i64>> = File::find()
            .select_only()
            .column_as(file::Column::FileSize.sum(), "total_size")
            .into_tuple::<Option<i64>>()
            .one(db)
            .await?;

        Ok(total.flatten().unwrap_or(0))
    }

    pub async fn count_uploaded_between<C: ConnectionTrait>(
        db: &C,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64> {
        let count = File::find()
            .filter(file::Column::UploadDate.gte(start))
            .filter(file::Column::UploadDate.lt(end))
            .count(db)
            .await?;

        Ok(count)
    }
}
