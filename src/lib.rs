//! ytshelf - YouTube merch-shelf crawler
//!
//! Crawls a channel's video listing with a headless browser, extracts
//! video metadata and the sponsored products shown on each watch page,
//! normalizes the Korean display strings into typed values and stores
//! everything in SQLite, with a per-channel CSV export on top.
//!
//! Layered the usual way: `domain` holds pure types and normalizers,
//! `infrastructure` does browser/DB/file IO, `application` wires the
//! two into use cases.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{ChannelCrawlSummary, CrawlService};
pub use domain::{ExportRow, ProductRecord, VideoCrawlResult, VideoRecord};
pub use infrastructure::{AppConfig, DatabaseConnection, VideoRepository};
