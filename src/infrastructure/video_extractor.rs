//! Per-video extraction pipeline
//!
//! Navigates to a watch page, settles the layout (container wait, scroll
//! passes, description expansion), then collects scalar metadata through
//! the retrying field extractor and products through the two-strategy
//! product extractor. Raw display strings are normalized at the edge so
//! everything downstream carries typed values.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::browser::BrowserDriver;
use super::config::AppConfig;
use super::field_extractor::FieldExtractor;
use super::product_extractor::ProductExtractor;
use crate::domain::normalize::{
    canonical_video_url, clean_description, parse_price, parse_product_count,
    parse_subscriber_count, parse_upload_date, parse_view_count, video_id_from_url,
};
use crate::domain::{ProductRecord, VideoCrawlResult, VideoRecord};

pub struct VideoExtractor<'a> {
    config: &'a AppConfig,
}

impl<'a> VideoExtractor<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    /// Crawl one watch page into a typed result.
    ///
    /// Failures that make the page unusable (navigation, missing video
    /// id) return `None` after a warning; a missing individual field
    /// degrades to its empty value instead.
    pub async fn extract<D: BrowserDriver + ?Sized>(
        &self,
        driver: &D,
        video_url: &str,
        source_url: &str,
    ) -> Option<VideoCrawlResult> {
        let video_url = canonical_video_url(video_url);
        let Some(video_id) = video_id_from_url(&video_url) else {
            warn!("no video id in url '{video_url}', skipping");
            return None;
        };

        if let Err(e) = driver.navigate(&video_url).await {
            warn!("navigation failed for video {video_id}: {e}");
            return None;
        }
        self.settle_page(driver, &video_id).await;

        let crawling = &self.config.crawling;
        let selectors = &self.config.selectors;
        let fields = FieldExtractor::new(crawling.field_retry_count, crawling.field_retry_delay_ms);

        let title = fields
            .extract(driver, "title", &selectors.title)
            .await
            .unwrap_or_default();
        let channel_name = fields
            .extract(driver, "channel_name", &selectors.channel_name)
            .await
            .unwrap_or_default();
        let subscriber_count = fields
            .extract(driver, "subscriber_count", &selectors.subscriber_count)
            .await
            .map(|text| parse_subscriber_count(&text))
            .unwrap_or(0);
        let view_count = fields
            .extract(driver, "view_count", &selectors.view_count)
            .await
            .map(|text| parse_view_count(&text))
            .unwrap_or(0);
        let upload_date = fields
            .extract(driver, "upload_date", &selectors.upload_date)
            .await
            .and_then(|text| parse_upload_date(&text));
        let description = fields
            .extract(driver, "description", &selectors.description)
            .await
            .map(|text| clean_description(&text))
            .unwrap_or_default();

        let raw_products =
            ProductExtractor::new(selectors, crawling).extract(driver).await;
        let products: Vec<ProductRecord> = raw_products
            .into_iter()
            .map(|raw| ProductRecord {
                video_id: video_id.clone(),
                product_name: raw.name,
                price: raw.price_text.as_deref().map(parse_price).unwrap_or(0),
                image_url: raw.image_url,
                merchant_name: raw.merchant_name,
                merchant_link: raw.merchant_link,
            })
            .collect();

        // The on-page counter badge is authoritative when it parses to a
        // positive number; otherwise count what was actually extracted.
        let product_count = fields
            .extract(driver, "product_count", &selectors.product_count_badge)
            .await
            .and_then(|text| parse_product_count(&text))
            .filter(|n| *n > 0)
            .unwrap_or(products.len() as i64);

        let now = Utc::now();
        info!(
            "extracted video {video_id}: '{title}' with {} products",
            products.len()
        );
        Some(VideoCrawlResult {
            video: VideoRecord {
                video_id,
                title,
                channel_name,
                subscriber_count,
                view_count,
                upload_date,
                extracted_date: now.date_naive(),
                video_url,
                description,
                product_count,
                source_url: source_url.to_string(),
                created_at: now,
                updated_at: now,
            },
            products,
        })
    }

    /// Give the page a chance to render everything we read: wait for the
    /// description area, run the configured scroll passes and expand the
    /// collapsed description. All of it is best effort.
    async fn settle_page<D: BrowserDriver + ?Sized>(&self, driver: &D, video_id: &str) {
        let crawling = &self.config.crawling;
        let wait = Duration::from_millis(crawling.wait_timeout_ms);

        let mut container_found = false;
        for selector in &self.config.selectors.description_container {
            if driver.wait_for_element(selector, wait).await.is_ok() {
                container_found = true;
                break;
            }
        }
        if !container_found {
            debug!("description container never appeared for video {video_id}");
        }

        for _ in 0..crawling.video_scroll_steps {
            if let Err(e) = driver
                .execute_script("window.scrollTo(0, document.documentElement.scrollHeight);")
                .await
            {
                debug!("scroll step failed for video {video_id}: {e}");
                break;
            }
            tokio::time::sleep(Duration::from_millis(crawling.scroll_pause_ms)).await;
        }

        for selector in &self.config.selectors.expand_button {
            let quoted = match serde_json::to_string(selector) {
                Ok(quoted) => quoted,
                Err(_) => continue,
            };
            let script = format!(
                "(function() {{ var b = document.querySelector({quoted}); \
                 if (b) {{ b.click(); return true; }} return false; }})()"
            );
            match driver.execute_script(&script).await {
                Ok(serde_json::Value::Bool(true)) => break,
                Ok(_) => {}
                Err(e) => debug!("description expand failed for video {video_id}: {e}"),
            }
        }
    }
}
