use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use simpleshare_types::FileSummary;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    /// Unique identifier for the file (used in URLs)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Client-supplied filename after sanitization
    pub original_name: String,

    /// Name of the file inside the storage directory (`{id}_{original_name}`)
    #[sea_orm(unique)]
    pub stored_name: String,

    /// Size of the stored file in bytes
    pub file_size: i64,

    /// MIME type guessed from the filename
    pub mime_type: Option<String>,

    pub description: String,

    pub uploader: String,

    /// When the file was uploaded
    pub upload_date: ChronoDateTimeUtc,

    /// Download count
    #[sea_orm(default_value = 0)]
    pub download_count: i32,

    /// Last successful download, or the upload time if never downloaded
    pub last_accessed: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Set(Uuid::new_v4()),
            upload_date: Set(now),
            last_accessed: Set(now),
            download_count: Set(0),
            ..ActiveModelTrait::default()
        }
    }
}

impl From<Model> for FileSummary {
    fn from(file: Model) -> Self {
        FileSummary {
            id: file.id,
            original_name: file.original_name,
            description: file.description,
            uploader: file.uploader,
            upload_date: file.upload_date,
            file_size: file.file_size,
            download_count: file.download_count,
        }
    }
}
