pub use super::download_log::Entity as DownloadLog;
pub use super::file::Entity as File;
