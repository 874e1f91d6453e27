//! Channel video enumeration
//!
//! Scrolls a channel's /videos listing until the page stops growing and
//! collects the watch URLs in first-seen order. The listing lazy-loads,
//! so "done" is observed as the scroll height staying flat for a number
//! of consecutive passes rather than any explicit end marker.

use std::collections::HashSet;
use std::time::Duration;

use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::browser::BrowserDriver;
use super::config::AppConfig;
use crate::domain::normalize::canonical_video_url;

pub struct ChannelEnumerator<'a> {
    config: &'a AppConfig,
    cancel: CancellationToken,
}

impl<'a> ChannelEnumerator<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe an external token between scroll cycles.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Enumerate watch URLs on a channel's video listing, deduplicated,
    /// in the order the listing first rendered them.
    ///
    /// Any failure, the initial navigation included, is logged as a
    /// warning and yields whatever was collected up to that point.
    pub async fn enumerate<D: BrowserDriver + ?Sized>(
        &self,
        driver: &D,
        channel_url: &str,
    ) -> Vec<String> {
        let listing_url = format!("{}/videos", channel_url.trim_end_matches('/'));
        if let Err(e) = driver.navigate(&listing_url).await {
            warn!("could not open listing '{listing_url}': {e}");
            return Vec::new();
        }

        let crawling = &self.config.crawling;
        let mut urls: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut last_height: i64 = -1;
        let mut stalled: u32 = 0;

        for iteration in 0..crawling.max_scroll_iterations {
            if self.cancel.is_cancelled() {
                info!("enumeration cancelled on '{listing_url}' at pass {iteration}");
                break;
            }
            let height = match self.scroll_to_bottom(driver).await {
                Ok(height) => height,
                Err(e) => {
                    warn!("scroll failed on '{listing_url}' at pass {iteration}: {e}");
                    break;
                }
            };
            tokio::time::sleep(Duration::from_millis(crawling.scroll_pause_ms)).await;

            match self.collect_anchors(driver).await {
                Ok(anchors) => {
                    for url in anchors {
                        if seen.insert(url.clone()) {
                            urls.push(url);
                        }
                    }
                }
                Err(e) => {
                    warn!("anchor collection failed on '{listing_url}': {e}");
                    break;
                }
            }

            if height == last_height {
                stalled += 1;
                if stalled >= crawling.stall_threshold {
                    debug!("listing height flat for {stalled} passes, enumeration complete");
                    break;
                }
            } else {
                stalled = 0;
                last_height = height;
            }
        }

        info!("enumerated {} videos from '{listing_url}'", urls.len());
        urls
    }

    /// Scroll to the bottom and report the document height afterwards.
    async fn scroll_to_bottom<D: BrowserDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> Result<i64, super::browser::BrowserError> {
        let value = driver
            .execute_script(
                "window.scrollTo(0, document.documentElement.scrollHeight); \
                 document.documentElement.scrollHeight;",
            )
            .await?;
        Ok(value.as_i64().unwrap_or(0))
    }

    async fn collect_anchors<D: BrowserDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> Result<Vec<String>, super::browser::BrowserError> {
        let mut urls = Vec::new();
        for selector in &self.config.selectors.channel_video_anchor {
            let elements = driver.find_elements(selector).await?;
            if elements.is_empty() {
                continue;
            }
            for outer in &elements {
                if let Some(url) = watch_href(outer) {
                    urls.push(url);
                }
            }
            break;
        }
        Ok(urls)
    }
}

/// Pull the watch URL out of an anchor's outer HTML.
fn watch_href(outer_html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(outer_html);
    let anchor = Selector::parse("a").ok()?;
    let href = fragment
        .select(&anchor)
        .filter_map(|el| el.value().attr("href"))
        .find(|href| href.contains("watch?v="))?;
    let absolute = if href.starts_with('/') {
        format!("https://www.youtube.com{href}")
    } else {
        href.to_string()
    };
    Some(canonical_video_url(&absolute))
}
