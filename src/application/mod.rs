//! Application layer use cases

pub mod crawl_service;

pub use crawl_service::{ChannelCrawlSummary, CrawlService};
