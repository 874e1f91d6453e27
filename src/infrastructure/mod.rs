//! Infrastructure layer
//!
//! Browser automation, page extraction, persistence and export. The
//! application layer talks to this layer through `BrowserDriver` and the
//! repository types; nothing above it touches CDP or SQL directly.

pub mod browser;
pub mod channel_enumerator;
pub mod config;
pub mod database_connection;
pub mod export;
pub mod field_extractor;
pub mod logging;
pub mod product_extractor;
pub mod video_extractor;
pub mod video_repository;

pub use browser::{with_session, BrowserDriver, BrowserError, ChromiumSession};
pub use channel_enumerator::ChannelEnumerator;
pub use config::{AppConfig, CrawlingConfig, SelectorConfig};
pub use database_connection::DatabaseConnection;
pub use export::CsvExporter;
pub use field_extractor::FieldExtractor;
pub use logging::init_logging;
pub use product_extractor::ProductExtractor;
pub use video_extractor::VideoExtractor;
pub use video_repository::{VideoPatch, VideoRepository};
