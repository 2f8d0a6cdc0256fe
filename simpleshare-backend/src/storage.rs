use crate::error::{AppError, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Longest sanitized filename we keep, in bytes. Leaves room for the id prefix
/// within the usual 255-byte filesystem limit.
const MAX_FILENAME_BYTES: usize = 200;

/// File storage manager that maps stored names to files in a single flat directory
#[derive(Clone, Debug)]
pub struct FileStorage {
    storage_root: PathBuf,
}

impl FileStorage {
    /// Create a new file storage instance
    pub fn new(storage_root: impl AsRef<Path>) -> Self {
        Self {
            storage_root: storage_root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.storage_root
    }

    /// Initialize the storage directory
    pub async fn init(&self) -> Result<()> {
        if !self.storage_root.exists() {
            fs::create_dir_all(&self.storage_root).await.map_err(|e| {
                AppError::ServerError(format!("Failed to create storage directory: {}", e))
            })?;
            tracing::info!(
                "📁 Created storage directory: {}",
                self.storage_root.display()
            );
        }
        Ok(())
    }

    /// Resolve a stored name to its path inside the storage root.
    ///
    /// Only a single plain path component is accepted, so a stored name can never
    /// point outside the storage directory.
    pub fn resolve_path(&self, stored_name: &str) -> Result<PathBuf> {
        let has_separator = stored_name.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
        if stored_name.is_empty() || has_separator {
            return Err(AppError::InvalidFileName(stored_name.to_string()));
        }

        let mut components = Path::new(stored_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.storage_root.join(stored_name)),
            _ => Err(AppError::InvalidFileName(stored_name.to_string())),
        }
    }

    /// Stream `reader` into the file named `stored_name`, reading at most
    /// `max_size + 1` bytes. Returns the on-disk size once the data is synced.
    ///
    /// Nothing is left behind on failure.
    pub async fn write_limited<R>(
        &self,
        stored_name: &str,
        reader: R,
        max_size: u64,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let file_path = self.resolve_path(stored_name)?;

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await?;

        let result = Self::copy_limited(file, &file_path, reader, max_size).await;
        if result.is_err() {
            if let Err(e) = fs::remove_file(&file_path).await {
                tracing::warn!(
                    "Failed to remove partial file {}: {}",
                    file_path.display(),
                    e
                );
            }
        }

        let size = result?;
        tracing::debug!("💾 Stored file: {} ({} bytes)", stored_name, size);
        Ok(size)
    }

    async fn copy_limited<R>(
        mut file: fs::File,
        file_path: &Path,
        reader: R,
        max_size: u64,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut limited = reader.take(max_size.saturating_add(1));
        let written = tokio::io::copy(&mut limited, &mut file).await?;
        if written > max_size {
            return Err(AppError::PayloadTooLarge);
        }

        // The record must never point at a partially written file
        file.sync_all().await?;

        Ok(fs::metadata(file_path).await?.len())
    }

    /// Open a stored file for reading
    pub async fn open(&self, stored_name: &str) -> Result<fs::File> {
        let file_path = self.resolve_path(stored_name)?;

        fs::File::open(&file_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AppError::FileNotFound,
            _ => AppError::IoError(e),
        })
    }

    /// Delete a file from disk. Returns `false` if it was already gone.
    pub async fn delete(&self, stored_name: &str) -> Result<bool> {
        let file_path = self.resolve_path(stored_name)?;

        match fs::remove_file(&file_path).await {
            Ok(_) => {
                tracing::debug!("🗑️  Deleted file: {}", stored_name);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::IoError(e)),
        }
    }

    pub async fn exists(&self, stored_name: &str) -> bool {
        match self.resolve_path(stored_name) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Reduce a client-supplied filename to something safe to store and echo back.
///
/// Directory components are dropped, whitespace becomes `_` and anything other
/// than alphanumerics, `.`, `-` and `_` is removed. Leading and trailing dots and
/// underscores are trimmed so the result is never hidden or a relative path.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    let mut trimmed = cleaned.trim_matches(|c: char| c == '.' || c == '_').to_string();

    if trimmed.len() > MAX_FILENAME_BYTES {
        let mut cut = MAX_FILENAME_BYTES;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        trimmed.truncate(cut);
    }

    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}
