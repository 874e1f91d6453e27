//! Crawl record types
//!
//! One video observation is a `VideoRecord` plus zero-or-more owned
//! `ProductRecord`s keyed by `(video_id, product_name)`. The flat
//! `ExportRow` shape used by the CSV export is a derived view produced
//! by [`VideoCrawlResult::export_rows`]; the relational pair stays the
//! source of truth.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Video-level metadata for one crawl observation.
///
/// `video_id` uniquely identifies a record; re-crawling the same id
/// updates the stored row in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub channel_name: String,
    pub subscriber_count: i64,
    pub view_count: i64,
    /// None when the on-page date text could not be resolved.
    pub upload_date: Option<NaiveDate>,
    /// Date of the crawl run that produced this observation.
    pub extracted_date: NaiveDate,
    /// Canonical `watch?v=<id>` form.
    pub video_url: String,
    pub description: String,
    /// On-page counter when extractable, else the number of products found.
    pub product_count: i64,
    /// Channel URL this record was crawled from.
    pub source_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One sponsored/merch product owned by a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductRecord {
    pub video_id: String,
    pub product_name: String,
    /// Normalized integer amount, 0 when the price text was absent.
    pub price: i64,
    pub image_url: Option<String>,
    pub merchant_name: Option<String>,
    pub merchant_link: Option<String>,
}

/// Product fields as pulled off the page, before normalization.
///
/// Either extraction strategy produces this shape; any field may be
/// missing except that accepted items carry a non-empty name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProduct {
    pub name: String,
    pub price_text: Option<String>,
    pub image_url: Option<String>,
    pub merchant_name: Option<String>,
    pub merchant_link: Option<String>,
}

impl RawProduct {
    /// Identity key used for in-extraction deduplication: the name, or
    /// name + merchant link when a link is available.
    pub fn identity_key(&self) -> String {
        match &self.merchant_link {
            Some(link) if !link.is_empty() => format!("{}|{}", self.name.trim(), link),
            _ => self.name.trim().to_string(),
        }
    }
}

/// The assembled result of crawling one video page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoCrawlResult {
    pub video: VideoRecord,
    pub products: Vec<ProductRecord>,
}

/// One row of the flattened tabular export: video columns repeated per
/// product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub video_id: String,
    pub title: String,
    pub channel_name: String,
    pub subscriber_count: i64,
    pub view_count: i64,
    pub upload_date: String,
    pub extracted_date: String,
    pub video_url: String,
    pub description: String,
    pub product_count: i64,
    pub product_name: String,
    pub product_price: String,
    pub product_image_url: String,
    pub product_merchant: String,
    pub product_merchant_link: String,
}

impl VideoCrawlResult {
    /// Project into flat export rows. A video with N products yields N
    /// rows sharing the video-level columns; a video with none still
    /// yields one row with empty product columns so it appears in the
    /// export.
    pub fn export_rows(&self) -> Vec<ExportRow> {
        let base = |product: Option<&ProductRecord>| ExportRow {
            video_id: self.video.video_id.clone(),
            title: self.video.title.clone(),
            channel_name: self.video.channel_name.clone(),
            subscriber_count: self.video.subscriber_count,
            view_count: self.video.view_count,
            upload_date: self
                .video
                .upload_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            extracted_date: self.video.extracted_date.to_string(),
            video_url: self.video.video_url.clone(),
            description: self.video.description.clone(),
            product_count: self.video.product_count,
            product_name: product.map(|p| p.product_name.clone()).unwrap_or_default(),
            product_price: product.map(|p| p.price.to_string()).unwrap_or_default(),
            product_image_url: product
                .and_then(|p| p.image_url.clone())
                .unwrap_or_default(),
            product_merchant: product
                .and_then(|p| p.merchant_name.clone())
                .unwrap_or_default(),
            product_merchant_link: product
                .and_then(|p| p.merchant_link.clone())
                .unwrap_or_default(),
        };

        if self.products.is_empty() {
            vec![base(None)]
        } else {
            self.products.iter().map(|p| base(Some(p))).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_video() -> VideoRecord {
        let now = Utc::now();
        VideoRecord {
            video_id: "vid1".into(),
            title: "title".into(),
            channel_name: "channel".into(),
            subscriber_count: 1000,
            view_count: 50_000,
            upload_date: NaiveDate::from_ymd_opt(2024, 3, 9),
            extracted_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            video_url: "https://www.youtube.com/watch?v=vid1".into(),
            description: "desc".into(),
            product_count: 2,
            source_url: "https://www.youtube.com/@channel".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn export_rows_one_per_product() {
        let result = VideoCrawlResult {
            video: sample_video(),
            products: vec![
                ProductRecord {
                    video_id: "vid1".into(),
                    product_name: "hoodie".into(),
                    price: 39000,
                    image_url: Some("https://img/1".into()),
                    merchant_name: Some("Store".into()),
                    merchant_link: Some("https://shop/1".into()),
                },
                ProductRecord {
                    video_id: "vid1".into(),
                    product_name: "mug".into(),
                    price: 12000,
                    image_url: None,
                    merchant_name: None,
                    merchant_link: None,
                },
            ],
        };

        let rows = result.export_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].product_name, "hoodie");
        assert_eq!(rows[0].product_price, "39000");
        assert_eq!(rows[1].product_name, "mug");
        assert!(rows.iter().all(|r| r.video_id == "vid1"));
        assert!(rows.iter().all(|r| r.product_count == 2));
    }

    #[test]
    fn export_rows_zero_products_still_one_row() {
        let mut video = sample_video();
        video.product_count = 0;
        let result = VideoCrawlResult {
            video,
            products: vec![],
        };
        let rows = result.export_rows();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].product_name.is_empty());
        assert!(rows[0].product_price.is_empty());
    }

    #[test]
    fn identity_key_prefers_link_when_present() {
        let with_link = RawProduct {
            name: "hoodie".into(),
            merchant_link: Some("https://shop/1".into()),
            ..Default::default()
        };
        let without = RawProduct {
            name: " hoodie ".into(),
            ..Default::default()
        };
        assert_eq!(with_link.identity_key(), "hoodie|https://shop/1");
        assert_eq!(without.identity_key(), "hoodie");
    }
}
