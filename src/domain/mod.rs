//! Domain module - record types and pure normalization logic
//!
//! Everything in here is side-effect free: the crawl pipeline's value
//! types plus the text normalizers that turn locale-specific page text
//! into canonical scalars.

pub mod normalize;
pub mod video;

// Re-export commonly used items
pub use video::{ExportRow, ProductRecord, RawProduct, VideoCrawlResult, VideoRecord};
