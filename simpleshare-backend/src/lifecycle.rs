//! File lifecycle: ingestion, retrieval, removal, listing, statistics and
//! the age-based expiry sweep.
//!
//! Bytes are always written (and synced) before the metadata record is
//! inserted; the insert is the commit point of an upload. Deletion goes the
//! other way round: physical file first, then the record.

use chrono::{DateTime, Duration, Local, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use simpleshare_entity::file;
use simpleshare_types::{FileSummary, StatsResponse};
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::database::{file_ops, CreateFileParams};
use crate::error::{AppError, Result};
use crate::storage::{sanitize_filename, FileStorage};

pub const DEFAULT_UPLOADER: &str = "Anonymous";

/// Bytes written to storage that do not have a metadata record yet
#[derive(Debug)]
pub struct StagedFile {
    pub id: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub file_size: i64,
    pub mime_type: String,
}

/// A file located for download. The record already reflects this download.
#[derive(Debug)]
pub struct RetrievedFile {
    pub record: file::Model,
    pub content: tokio::fs::File,
}

#[derive(Clone)]
pub struct FileManager {
    db: DatabaseConnection,
    storage: FileStorage,
    max_file_size: u64,
}

impl FileManager {
    pub fn new(db: DatabaseConnection, storage: FileStorage, max_file_size: u64) -> Self {
        Self {
            db,
            storage,
            max_file_size,
        }
    }

    /// Store an upload and record it
    pub async fn ingest<R>(
        &self,
        reader: R,
        original_name: &str,
        description: Option<&str>,
        uploader: Option<&str>,
    ) -> Result<file::Model>
    where
        R: AsyncRead + Unpin,
    {
        let staged = self.stage(original_name, reader).await?;
        self.commit(staged, description, uploader).await
    }

    /// Write the bytes of an upload to storage without recording it
    pub async fn stage<R>(&self, original_name: &str, reader: R) -> Result<StagedFile>
    where
        R: AsyncRead + Unpin,
    {
        if original_name.trim().is_empty() {
            return Err(AppError::BadRequest("Missing filename".to_string()));
        }

        let id = Uuid::new_v4();
        let original_name = sanitize_filename(original_name);
        let stored_name = format!("{}_{}", id, original_name);

        let file_size = self
            .storage
            .write_limited(&stored_name, reader, self.max_file_size)
            .await?;

        let mime_type = mime_guess::from_path(&original_name)
            .first_or_octet_stream()
            .to_string();

        Ok(StagedFile {
            id,
            original_name,
            stored_name,
            file_size: file_size as i64,
            mime_type,
        })
    }

    /// Create the metadata record for a staged file. The staged bytes are
    /// removed if the record cannot be written.
    pub async fn commit(
        &self,
        staged: StagedFile,
        description: Option<&str>,
        uploader: Option<&str>,
    ) -> Result<file::Model> {
        let uploader = uploader
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_UPLOADER);

        let params = CreateFileParams {
            id: staged.id,
            original_name: staged.original_name.clone(),
            stored_name: staged.stored_name.clone(),
            file_size: staged.file_size,
            mime_type: Some(staged.mime_type.clone()),
            description: description.unwrap_or_default().to_string(),
            uploader: uploader.to_string(),
        };

        match file_ops::create_file_record(&self.db, params).await {
            Ok(record) => {
                tracing::info!(
                    "📁 File uploaded: {} -> {} ({} bytes, {})",
                    record.original_name,
                    record.id,
                    record.file_size,
                    record.mime_type.as_deref().unwrap_or_default()
                );
                Ok(record)
            }
            Err(e) => {
                self.discard(staged).await;
                Err(e)
            }
        }
    }

    /// Remove the bytes of an upload that will not be committed
    pub async fn discard(&self, staged: StagedFile) {
        if let Err(e) = self.storage.delete(&staged.stored_name).await {
            tracing::warn!(
                "Failed to remove staged file {}: {}",
                staged.stored_name,
                e
            );
        }
    }

    /// Open a file for download and account for the access
    pub async fn retrieve(&self, file_id: Uuid, caller_address: &str) -> Result<RetrievedFile> {
        let record = file_ops::get_file_by_id(&self.db, file_id)
            .await?
            .ok_or(AppError::FileNotFound)?;

        // A record without its file is reported as missing and left as is
        let content = match self.storage.open(&record.stored_name).await {
            Ok(content) => content,
            Err(AppError::FileNotFound) => {
                tracing::warn!(
                    "File {} has a record but no data on disk ({})",
                    file_id,
                    record.stored_name
                );
                return Err(AppError::FileNotFound);
            }
            Err(e) => return Err(e),
        };

        let record = match self.record_download(file_id, caller_address).await {
            Ok(Some(updated)) => updated,
            Ok(None) => return Err(AppError::FileNotFound),
            Err(e) => {
                // Serve the file anyway, but never drop the audit entry silently
                tracing::error!("Failed to record download of {}: {}", file_id, e);
                record
            }
        };

        tracing::info!(
            "📥 File downloaded: {} -> {} (download #{})",
            file_id,
            record.original_name,
            record.download_count
        );

        Ok(RetrievedFile { record, content })
    }

    /// Counter, timestamp and log entry are written in one transaction.
    /// Returns `None` if the record disappeared in the meantime.
    async fn record_download(
        &self,
        file_id: Uuid,
        caller_address: &str,
    ) -> Result<Option<file::Model>> {
        let txn = self.db.begin().await?;

        let found = file_ops::record_download(
            &txn,
            file_id,
            Some(caller_address.to_string()),
            Utc::now(),
        )
        .await?;

        if !found {
            txn.rollback().await?;
            return Ok(None);
        }

        let updated = file_ops::get_file_by_id(&txn, file_id).await?;
        txn.commit().await?;

        Ok(updated)
    }

    /// Delete a file's data, its record and its download log
    pub async fn remove(&self, file_id: Uuid) -> Result<()> {
        let record = file_ops::get_file_by_id(&self.db, file_id)
            .await?
            .ok_or(AppError::FileNotFound)?;

        if !self.storage.delete(&record.stored_name).await? {
            tracing::warn!("Physical file not found: {}", record.stored_name);
        }

        let txn = self.db.begin().await?;
        let deleted = file_ops::delete_file_record(&txn, file_id).await?;
        txn.commit().await?;

        if !deleted {
            // Removed concurrently
            return Err(AppError::FileNotFound);
        }

        tracing::info!(
            "🗑️  File deleted: {} ({})",
            record.original_name,
            file_id
        );
        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<FileSummary>> {
        let files = file_ops::list_files(&self.db).await?;
        Ok(files.into_iter().map(FileSummary::from).collect())
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        let (today_start, tomorrow_start) = local_day_bounds(Local::now());

        Ok(StatsResponse {
            total_files: file_ops::count_files(&self.db).await?,
            total_size: file_ops::total_size(&self.db).await?,
            files_today: file_ops::count_uploaded_between(&self.db, today_start, tomorrow_start)
                .await?,
        })
    }

    /// Remove every file that was neither uploaded nor downloaded within
    /// `retention`. Returns the number of records removed.
    pub async fn expire_older_than(&self, retention: Duration) -> Result<u64> {
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .ok_or_else(|| AppError::BadRequest("Retention period out of range".to_string()))?;
        let expired = file_ops::find_expired(&self.db, cutoff).await?;

        let mut removable = Vec::with_capacity(expired.len());
        for file in &expired {
            match self.storage.delete(&file.stored_name).await {
                Ok(_) => removable.push(file.id),
                Err(e) => {
                    // Keep the record so the file is not orphaned
                    tracing::warn!(
                        "Failed to delete expired file from storage: {} - {}",
                        file.stored_name,
                        e
                    );
                }
            }
        }

        let txn = self.db.begin().await?;
        let removed = file_ops::delete_file_records(&txn, &removable).await?;
        txn.commit().await?;

        Ok(removed)
    }
}

/// Start of the given local day and of the next one, in UTC
fn local_day_bounds(now: DateTime<Local>) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = |date: chrono::NaiveDate| {
        date.and_hms_opt(0, 0, 0)
            .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
    };

    let today = now.date_naive();
    let start = local_midnight(today).unwrap_or(now);
    let end = today
        .succ_opt()
        .and_then(local_midnight)
        .unwrap_or(start + Duration::days(1));

    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::setup_database;
    use sea_orm::{
        ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
        Set,
    };
    use simpleshare_entity::download_log;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    const MAX_SIZE: u64 = 1024;

    async fn create_manager(temp_dir: &TempDir) -> FileManager {
        let db_path = temp_dir.path().join("test.db");
        let db = setup_database(&format!("sqlite:{}?mode=rwc", db_path.display()))
            .await
            .expect("Failed to set up database");

        let storage = FileStorage::new(temp_dir.path().join("uploads"));
        storage.init().await.unwrap();

        FileManager::new(db, storage, MAX_SIZE)
    }

    async fn read_all(mut file: tokio::fs::File) -> Vec<u8> {
        let mut data = Vec::new();
        file.read_to_end(&mut data).await.unwrap();
        data
    }

    async fn log_count(manager: &FileManager, file_id: Uuid) -> u64 {
        download_log::Entity::find()
            .filter(download_log::Column::FileId.eq(file_id))
            .count(&manager.db)
            .await
            .unwrap()
    }

    async fn backdate(
        manager: &FileManager,
        record: file::Model,
        upload_date: DateTime<Utc>,
        last_accessed: DateTime<Utc>,
    ) {
        let mut active: file::ActiveModel = record.into();
        active.upload_date = Set(upload_date);
        active.last_accessed = Set(last_accessed);
        active.update(&manager.db).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_download_delete_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        let content = b"0123456789";

        let record = manager
            .ingest(&content[..], "a.txt", None, Some("alice"))
            .await
            .unwrap();
        assert_eq!(record.original_name, "a.txt");
        assert_eq!(record.stored_name, format!("{}_a.txt", record.id));
        assert_eq!(record.file_size, 10);
        assert_eq!(record.download_count, 0);
        assert_eq!(record.uploader, "alice");
        assert_eq!(record.description, "");
        assert_eq!(record.mime_type.as_deref(), Some("text/plain"));

        let retrieved = manager.retrieve(record.id, "127.0.0.1").await.unwrap();
        assert_eq!(retrieved.record.download_count, 1);
        assert!(retrieved.record.last_accessed >= record.last_accessed);
        assert_eq!(read_all(retrieved.content).await, content);
        assert_eq!(log_count(&manager, record.id).await, 1);

        manager.remove(record.id).await.unwrap();
        assert!(manager.list_all().await.unwrap().is_empty());
        assert!(!manager.storage.exists(&record.stored_name).await);
        assert_eq!(log_count(&manager, record.id).await, 0);

        assert!(matches!(
            manager.remove(record.id).await,
            Err(AppError::FileNotFound)
        ));
        assert!(matches!(
            manager.retrieve(record.id, "127.0.0.1").await,
            Err(AppError::FileNotFound)
        ));
    }

    #[tokio::test]
    async fn test_file_size_matches_disk() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        let record = manager
            .ingest(&[42u8; 777][..], "blob", Some("raw bytes"), None)
            .await
            .unwrap();

        let path = manager.storage.resolve_path(&record.stored_name).unwrap();
        let on_disk = tokio::fs::metadata(path).await.unwrap().len();
        assert_eq!(record.file_size as u64, on_disk);
        assert_eq!(record.uploader, DEFAULT_UPLOADER);
        assert_eq!(record.description, "raw bytes");
        assert_eq!(
            record.mime_type.as_deref(),
            Some("application/octet-stream")
        );
    }

    #[tokio::test]
    async fn test_ingest_sanitizes_filename() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        let record = manager
            .ingest(&b"x"[..], "../../secret report.pdf", None, Some("  "))
            .await
            .unwrap();

        assert_eq!(record.original_name, "secret_report.pdf");
        assert_eq!(record.uploader, DEFAULT_UPLOADER);
        assert!(manager.storage.exists(&record.stored_name).await);
    }

    #[tokio::test]
    async fn test_ingest_rejects_empty_filename() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        let result = manager.ingest(&b"x"[..], "", None, None).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(manager.stats().await.unwrap().total_files, 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_leaves_no_trace() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        let payload = vec![1u8; MAX_SIZE as usize + 1];
        let result = manager.ingest(&payload[..], "big.bin", None, None).await;
        assert!(matches!(result, Err(AppError::PayloadTooLarge)));

        assert!(manager.list_all().await.unwrap().is_empty());
        let mut entries = tokio::fs::read_dir(manager.storage.root()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_name_uploads_get_distinct_storage() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        let first = manager.ingest(&b"one"[..], "same.txt", None, None).await.unwrap();
        let second = manager.ingest(&b"two"[..], "same.txt", None, None).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.stored_name, second.stored_name);

        let content = manager.retrieve(first.id, "10.0.0.1").await.unwrap().content;
        assert_eq!(read_all(content).await, b"one");
    }

    #[tokio::test]
    async fn test_retrieve_counts_every_download() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        let record = manager.ingest(&b"data"[..], "d.bin", None, None).await.unwrap();
        let mut previous = record.last_accessed;
        for n in 1..=3 {
            let retrieved = manager.retrieve(record.id, "10.0.0.2").await.unwrap();
            assert_eq!(retrieved.record.download_count, n);
            assert!(retrieved.record.last_accessed >= previous);
            previous = retrieved.record.last_accessed;
        }
        assert_eq!(log_count(&manager, record.id).await, 3);

        let logs = download_log::Entity::find().all(&manager.db).await.unwrap();
        assert!(logs.iter().all(|log| log.ip_address.as_deref() == Some("10.0.0.2")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_downloads_are_all_counted() {
        const DOWNLOADS: i32 = 32;

        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        let record = manager.ingest(&b"popular"[..], "p.txt", None, None).await.unwrap();

        let handles: Vec<_> = (0..DOWNLOADS)
            .map(|n| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    let caller = format!("10.0.1.{}", n);
                    manager.retrieve(record.id, &caller).await.map(|_| ())
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = file_ops::get_file_by_id(&manager.db, record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.download_count, DOWNLOADS);
        assert_eq!(log_count(&manager, record.id).await, DOWNLOADS as u64);
    }

    #[tokio::test]
    async fn test_retrieve_serves_file_when_accounting_fails() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        let record = manager.ingest(&b"still here"[..], "s.txt", None, None).await.unwrap();

        // Every log insert fails from now on
        manager
            .db
            .execute_unprepared("DROP TABLE download_logs")
            .await
            .unwrap();

        let retrieved = manager.retrieve(record.id, "10.0.0.5").await.unwrap();
        assert_eq!(read_all(retrieved.content).await, b"still here");

        // The counter update was rolled back with the failed log insert
        let stored = file_ops::get_file_by_id(&manager.db, record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.download_count, 0);
    }

    #[tokio::test]
    async fn test_retrieve_with_missing_data_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        let record = manager.ingest(&b"gone"[..], "g.txt", None, None).await.unwrap();
        manager.storage.delete(&record.stored_name).await.unwrap();

        assert!(matches!(
            manager.retrieve(record.id, "10.0.0.3").await,
            Err(AppError::FileNotFound)
        ));

        // The dangling record is left alone and not counted as a download
        let listed = manager.list_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].download_count, 0);
        assert_eq!(log_count(&manager, record.id).await, 0);

        // Removal still works without the physical file
        manager.remove(record.id).await.unwrap();
        assert!(manager.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_id_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        manager.ingest(&b"keep"[..], "keep.txt", None, None).await.unwrap();
        assert!(matches!(
            manager.remove(Uuid::new_v4()).await,
            Err(AppError::FileNotFound)
        ));
        assert_eq!(manager.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_all_most_recent_first() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        let older = manager.ingest(&b"1"[..], "old.txt", None, None).await.unwrap();
        let newer = manager.ingest(&b"2"[..], "new.txt", None, None).await.unwrap();
        let old_date = Utc::now() - Duration::hours(2);
        backdate(&manager, older.clone(), old_date, old_date).await;

        let listed = manager.list_all().await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_stats_match_listing() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        assert_eq!(manager.stats().await.unwrap(), StatsResponse::default());

        manager.ingest(&[0u8; 10][..], "a.bin", None, None).await.unwrap();
        manager.ingest(&[0u8; 25][..], "b.bin", None, None).await.unwrap();
        let old = manager.ingest(&[0u8; 5][..], "c.bin", None, None).await.unwrap();
        let long_ago = Utc::now() - Duration::days(3);
        backdate(&manager, old, long_ago, long_ago).await;

        let stats = manager.stats().await.unwrap();
        let listed = manager.list_all().await.unwrap();
        assert_eq!(stats.total_files, listed.len() as u64);
        assert_eq!(
            stats.total_size,
            listed.iter().map(|f| f.file_size).sum::<i64>()
        );
        assert_eq!(stats.total_size, 40);
        assert_eq!(stats.files_today, 2);
    }

    #[tokio::test]
    async fn test_stats_count_records_without_data() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;

        let dangling = manager.ingest(&[0u8; 12][..], "lost.bin", None, None).await.unwrap();
        manager.ingest(&[0u8; 3][..], "kept.bin", None, None).await.unwrap();
        manager.storage.delete(&dangling.stored_name).await.unwrap();

        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_size, 15);
        assert_eq!(stats.files_today, 2);
    }

    #[tokio::test]
    async fn test_expiry_rejects_unrepresentable_retention() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        manager.ingest(&b"x"[..], "x.txt", None, None).await.unwrap();

        let result = manager.expire_older_than(Duration::MAX).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(manager.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expiry_requires_both_timestamps_old() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_manager(&temp_dir).await;
        let retention = Duration::days(30);
        let long_ago = Utc::now() - Duration::days(45);

        let stale = manager.ingest(&b"stale"[..], "stale.txt", None, None).await.unwrap();
        let accessed = manager.ingest(&b"used"[..], "used.txt", None, None).await.unwrap();
        let fresh = manager.ingest(&b"new"[..], "new.txt", None, None).await.unwrap();

        // Downloaded once, long ago
        manager.retrieve(stale.id, "10.0.0.4").await.unwrap();
        let stale = file_ops::get_file_by_id(&manager.db, stale.id)
            .await
            .unwrap()
            .unwrap();
        backdate(&manager, stale.clone(), long_ago, long_ago).await;

        // Old upload, recent download
        backdate(&manager, accessed.clone(), long_ago, Utc::now()).await;

        let removed = manager.expire_older_than(retention).await.unwrap();
        assert_eq!(removed, 1);

        let remaining: Vec<Uuid> = manager
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert!(!remaining.contains(&stale.id));
        assert!(remaining.contains(&accessed.id));
        assert!(remaining.contains(&fresh.id));

        assert!(!manager.storage.exists(&stale.stored_name).await);
        assert!(manager.storage.exists(&accessed.stored_name).await);
        assert_eq!(log_count(&manager, stale.id).await, 0);

        // Nothing left to expire
        assert_eq!(manager.expire_older_than(retention).await.unwrap(), 0);
    }

    #[test]
    fn test_local_day_bounds() {
        let now = Local::now();
        let (start, end) = local_day_bounds(now);
        let now_utc = now.with_timezone(&Utc);

        assert!(start <= now_utc);
        assert!(now_utc < end);
        assert!(end - start >= Duration::hours(23));
        assert!(end - start <= Duration::hours(25));
    }
}
