use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Response types

/// Public metadata of a stored file, as listed by `GET /api/files`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct FileSummary {
    pub id: Uuid,
    pub original_name: String,
    pub description: String,
    pub uploader: String,
    pub upload_date: chrono::DateTime<chrono::Utc>,
    pub file_size: i64,
    pub download_count: i32,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct StatsResponse {
    pub total_files: u64,
    /// Sum of `file_size` over all records, in bytes
    pub total_size: i64,
    /// Files uploaded on the current calendar day, server-local time
    pub files_today: u64,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

impl DeleteResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "File deleted successfully".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
