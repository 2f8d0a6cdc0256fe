use crate::error::{AppError, Result};
use std::env;

/// Longest retention we accept, roughly a century
const MAX_RETENTION_DAYS: i64 = 36_500;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_address: String,
    pub storage_dir: String,
    pub static_dir: String,
    pub max_file_size: u64,
    pub retention_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let retention_days = var("RETENTION_DAYS", "30")
            .parse::<i64>()
            .map_err(|_| AppError::ConfigError("Invalid RETENTION_DAYS".to_string()))?;

        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            return Err(AppError::ConfigError(format!(
                "RETENTION_DAYS must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }

        // Given in MB, default 1GB
        let max_file_size = var("MAX_FILE_SIZE", "1024")
            .parse::<u64>()
            .map_err(|_| AppError::ConfigError("Invalid MAX_FILE_SIZE".to_string()))?
            .checked_mul(1024 * 1024)
            .ok_or_else(|| AppError::ConfigError("MAX_FILE_SIZE is too large".to_string()))?;

        Ok(Config {
            database_url: var("DATABASE_URL", "sqlite://simpleshare.db?mode=rwc"),
            server_address: var("SERVER_ADDRESS", "0.0.0.0:5000"),
            storage_dir: var("STORAGE_DIR", "./uploads"),
            static_dir: var("STATIC_DIR", "./static"),
            max_file_size,
            retention_days,
        })
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}
