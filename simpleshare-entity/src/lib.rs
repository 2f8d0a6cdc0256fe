pub mod download_log;
pub mod file;
pub mod prelude;

pub use download_log::Entity as DownloadLog;
pub use file::Entity as File;
