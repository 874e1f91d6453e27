//! Application configuration
//!
//! Selector candidate lists live here as data rather than code: when the
//! target markup shifts again, the fix is a config edit, not a control
//! flow change. Each list is ordered most-specific first; later entries
//! are degraded fallbacks for older page layouts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite connection string, e.g. `sqlite:data/ytshelf.db`.
    pub database_url: String,
    /// Directory that receives per-channel CSV exports.
    pub export_dir: String,
    pub crawling: CrawlingConfig,
    pub selectors: SelectorConfig,
}

/// Timing and retry knobs for the crawl loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlingConfig {
    /// Navigation / element-readiness timeout in milliseconds.
    pub wait_timeout_ms: u64,
    /// Attempts per selector candidate before moving to the next one.
    pub field_retry_count: u32,
    /// Delay between candidate retries in milliseconds.
    pub field_retry_delay_ms: u64,
    /// Programmatic scroll steps on a video page to reveal lazy content.
    pub video_scroll_steps: u32,
    /// Pause after each scroll in milliseconds.
    pub scroll_pause_ms: u64,
    /// Consecutive no-growth scroll iterations tolerated before the
    /// channel enumerator concludes the listing is exhausted.
    pub stall_threshold: u32,
    /// Hard cap on enumeration scroll iterations.
    pub max_scroll_iterations: u32,
    /// Bounded clicks of the merch-shelf "next" pagination control.
    pub max_shelf_pages: u32,
    /// Thumbnail variant width preferred by the structured-data strategy.
    pub preferred_thumbnail_width: u32,
}

impl Default for CrawlingConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 10_000,
            field_retry_count: 3,
            field_retry_delay_ms: 500,
            video_scroll_steps: 5,
            scroll_pause_ms: 2_000,
            stall_threshold: 5,
            max_scroll_iterations: 200,
            max_shelf_pages: 5,
            preferred_thumbnail_width: 240,
        }
    }
}

/// Ordered CSS selector candidates per logical field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub title: Vec<String>,
    pub channel_name: Vec<String>,
    pub subscriber_count: Vec<String>,
    pub view_count: Vec<String>,
    pub upload_date: Vec<String>,
    pub description: Vec<String>,
    /// Readiness signal awaited after navigation.
    pub description_container: Vec<String>,
    /// The "show more" control expanding the description.
    pub expand_button: Vec<String>,
    /// The on-page "N개 제품" counter badge.
    pub product_count_badge: Vec<String>,
    /// Merch-shelf item containers (DOM-renderer strategy).
    pub shelf_item: Vec<String>,
    /// Shelf pagination "next" control.
    pub shelf_next_button: Vec<String>,
    /// Per-item fields inside one shelf item.
    pub product_title: Vec<String>,
    pub product_price: Vec<String>,
    pub product_link: Vec<String>,
    pub product_merchant: Vec<String>,
    /// Sibling description nodes used as the merchant-link fallback for
    /// the structured-data strategy.
    pub product_description: Vec<String>,
    /// Video anchors on a channel's /videos listing.
    pub channel_video_anchor: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(ToString::to_string).collect();
        Self {
            title: list(&[
                "#title yt-formatted-string",
                "yt-formatted-string[class*='ytd-watch-metadata']",
                "h1.title",
            ]),
            channel_name: list(&["ytd-channel-name a", "#channel-name a", "#channel-name"]),
            subscriber_count: list(&[
                "yt-formatted-string#owner-sub-count",
                "#subscriber-count",
                "#owner-sub-count",
            ]),
            view_count: list(&["span.view-count", "#view-count", ".view-count"]),
            upload_date: list(&["#info-strings yt-formatted-string", "#upload-info .date"]),
            description: list(&[
                "#description-inline-expander yt-attributed-string",
                "ytd-expander#description yt-formatted-string",
                "yt-formatted-string#description",
                "#description",
            ]),
            description_container: list(&["#description-inline-expander", "#description"]),
            expand_button: list(&["tp-yt-paper-button#expand", "#expand"]),
            product_count_badge: list(&["yt-formatted-string#info"]),
            shelf_item: list(&[
                "#items > ytd-merch-shelf-item-renderer",
                "ytd-merch-shelf-renderer ytd-merch-shelf-item-renderer",
            ]),
            shelf_next_button: list(&[
                "ytd-merch-shelf-renderer #next-button button",
                "ytd-merch-shelf-renderer yt-button-renderer#next",
            ]),
            product_title: list(&[".product-item-title", ".title"]),
            product_price: list(&[".product-item-price", ".price"]),
            product_link: list(&["a.yt-simple-endpoint", "a[href]"]),
            product_merchant: list(&[".product-item-merchant-text", ".merchant"]),
            product_description: list(&[".product-item-description", ".description"]),
            channel_video_anchor: list(&["a#video-title-link", "a#video-title"]),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/ytshelf.db".to_string(),
            export_dir: "exports".to_string(),
            crawling: CrawlingConfig::default(),
            selectors: SelectorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file, falling back to defaults
    /// when the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Write the current configuration back out as pretty JSON.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)
            .await
            .with_context(|| format!("failed to write config file {}", path.display()))
    }
}
