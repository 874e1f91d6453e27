//! Repository for crawled video records and their owned products
//!
//! Writes go through `upsert_video_with_products`: one transaction that
//! upserts the video row and replaces its product set wholesale, so a
//! re-crawl converges on the latest observation without leaving removed
//! products behind.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::domain::{ProductRecord, VideoCrawlResult, VideoRecord};

/// Partial update for an existing video row. Only populated fields are
/// written.
#[derive(Debug, Clone, Default)]
pub struct VideoPatch {
    pub title: Option<String>,
    pub channel_name: Option<String>,
    pub subscriber_count: Option<i64>,
    pub view_count: Option<i64>,
    pub upload_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub product_count: Option<i64>,
}

#[derive(Clone)]
pub struct VideoRepository {
    pool: Arc<SqlitePool>,
}

impl VideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Persist one crawl observation.
    ///
    /// The video row is inserted or updated in place (`created_at` of an
    /// existing row survives), then the old product set is replaced with
    /// the new one. Products with an empty name are dropped before the
    /// insert. All of it commits atomically.
    pub async fn upsert_video_with_products(&self, result: &VideoCrawlResult) -> Result<()> {
        let video = &result.video;
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open transaction")?;

        sqlx::query(
            r#"
            INSERT INTO youtube_videos
            (video_id, title, channel_name, subscriber_count, view_count, upload_date,
             extracted_date, video_url, description, product_count, source_url,
             created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (video_id) DO UPDATE SET
                title = excluded.title,
                channel_name = excluded.channel_name,
                subscriber_count = excluded.subscriber_count,
                view_count = excluded.view_count,
                upload_date = excluded.upload_date,
                extracted_date = excluded.extracted_date,
                video_url = excluded.video_url,
                description = excluded.description,
                product_count = excluded.product_count,
                source_url = excluded.source_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&video.video_id)
        .bind(&video.title)
        .bind(&video.channel_name)
        .bind(video.subscriber_count)
        .bind(video.view_count)
        .bind(video.upload_date)
        .bind(video.extracted_date)
        .bind(&video.video_url)
        .bind(&video.description)
        .bind(video.product_count)
        .bind(&video.source_url)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&mut *tx)
        .await
        .context("failed to upsert video row")?;

        sqlx::query("DELETE FROM youtube_products WHERE video_id = ?")
            .bind(&video.video_id)
            .execute(&mut *tx)
            .await
            .context("failed to clear previous products")?;

        for product in &result.products {
            if product.product_name.trim().is_empty() {
                continue;
            }
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO youtube_products
                (video_id, product_name, price, image_url, merchant_name, merchant_link)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&video.video_id)
            .bind(&product.product_name)
            .bind(product.price)
            .bind(&product.image_url)
            .bind(&product.merchant_name)
            .bind(&product.merchant_link)
            .execute(&mut *tx)
            .await
            .context("failed to insert product row")?;
        }

        tx.commit().await.context("failed to commit observation")?;
        Ok(())
    }

    /// All stored videos with their products, newest crawl first.
    pub async fn list_videos_with_products(&self) -> Result<Vec<VideoCrawlResult>> {
        let videos: Vec<VideoRecord> = sqlx::query_as(
            "SELECT * FROM youtube_videos ORDER BY extracted_date DESC, video_id ASC",
        )
        .fetch_all(&*self.pool)
        .await
        .context("failed to list videos")?;

        let mut results = Vec::with_capacity(videos.len());
        for video in videos {
            let products = self.products_of(&video.video_id).await?;
            results.push(VideoCrawlResult { video, products });
        }
        Ok(results)
    }

    pub async fn get_video(&self, video_id: &str) -> Result<Option<VideoCrawlResult>> {
        let video: Option<VideoRecord> =
            sqlx::query_as("SELECT * FROM youtube_videos WHERE video_id = ?")
                .bind(video_id)
                .fetch_optional(&*self.pool)
                .await
                .context("failed to fetch video")?;

        match video {
            Some(video) => {
                let products = self.products_of(&video.video_id).await?;
                Ok(Some(VideoCrawlResult { video, products }))
            }
            None => Ok(None),
        }
    }

    /// Apply a partial update. Returns false when the video is unknown.
    pub async fn patch_video(&self, video_id: &str, patch: &VideoPatch) -> Result<bool> {
        let Some(current) = self.get_video(video_id).await? else {
            return Ok(false);
        };
        let video = current.video;

        sqlx::query(
            r#"
            UPDATE youtube_videos SET
                title = ?, channel_name = ?, subscriber_count = ?, view_count = ?,
                upload_date = ?, description = ?, product_count = ?, updated_at = ?
            WHERE video_id = ?
            "#,
        )
        .bind(patch.title.as_ref().unwrap_or(&video.title))
        .bind(patch.channel_name.as_ref().unwrap_or(&video.channel_name))
        .bind(patch.subscriber_count.unwrap_or(video.subscriber_count))
        .bind(patch.view_count.unwrap_or(video.view_count))
        .bind(patch.upload_date.or(video.upload_date))
        .bind(patch.description.as_ref().unwrap_or(&video.description))
        .bind(patch.product_count.unwrap_or(video.product_count))
        .bind(Utc::now())
        .bind(video_id)
        .execute(&*self.pool)
        .await
        .context("failed to patch video")?;
        Ok(true)
    }

    /// Delete one video; its products go with it via the cascade.
    pub async fn delete_video(&self, video_id: &str) -> Result<bool> {
        let done = sqlx::query("DELETE FROM youtube_videos WHERE video_id = ?")
            .bind(video_id)
            .execute(&*self.pool)
            .await
            .context("failed to delete video")?;
        Ok(done.rows_affected() > 0)
    }

    /// Delete every video crawled from one source channel URL. Returns
    /// the number of removed videos.
    pub async fn delete_by_source_url(&self, source_url: &str) -> Result<u64> {
        let done = sqlx::query("DELETE FROM youtube_videos WHERE source_url = ?")
            .bind(source_url)
            .execute(&*self.pool)
            .await
            .context("failed to delete videos by source")?;
        Ok(done.rows_affected())
    }

    async fn products_of(&self, video_id: &str) -> Result<Vec<ProductRecord>> {
        sqlx::query_as(
            r#"
            SELECT video_id, product_name, price, image_url, merchant_name, merchant_link
            FROM youtube_products WHERE video_id = ? ORDER BY id ASC
            "#,
        )
        .bind(video_id)
        .fetch_all(&*self.pool)
        .await
        .context("failed to fetch products")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::tempdir;

    async fn repo() -> (VideoRepository, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let url = format!("sqlite:{}", temp_dir.path().join("repo.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        (VideoRepository::new(db.pool().clone()), temp_dir)
    }

    fn observation(video_id: &str, products: &[(&str, i64)]) -> VideoCrawlResult {
        let now = Utc::now();
        VideoCrawlResult {
            video: VideoRecord {
                video_id: video_id.into(),
                title: format!("title {video_id}"),
                channel_name: "channel".into(),
                subscriber_count: 1000,
                view_count: 2000,
                upload_date: NaiveDate::from_ymd_opt(2024, 3, 9),
                extracted_date: now.date_naive(),
                video_url: format!("https://www.youtube.com/watch?v={video_id}"),
                description: "desc".into(),
                product_count: products.len() as i64,
                source_url: "https://www.youtube.com/@channel".into(),
                created_at: now,
                updated_at: now,
            },
            products: products
                .iter()
                .map(|(name, price)| ProductRecord {
                    video_id: video_id.into(),
                    product_name: (*name).to_string(),
                    price: *price,
                    image_url: None,
                    merchant_name: None,
                    merchant_link: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn upsert_then_read_back() {
        let (repo, _dir) = repo().await;
        let obs = observation("v1", &[("hoodie", 39_000), ("mug", 12_000)]);
        repo.upsert_video_with_products(&obs).await.unwrap();

        let stored = repo.get_video("v1").await.unwrap().unwrap();
        assert_eq!(stored.video.title, "title v1");
        assert_eq!(stored.products.len(), 2);
        assert_eq!(stored.products[0].product_name, "hoodie");
        assert_eq!(stored.products[0].price, 39_000);
    }

    #[tokio::test]
    async fn recrawl_replaces_the_product_set() {
        let (repo, _dir) = repo().await;
        repo.upsert_video_with_products(&observation("v1", &[("old-a", 1), ("old-b", 2)]))
            .await
            .unwrap();

        let first = repo.get_video("v1").await.unwrap().unwrap();
        let created_at = first.video.created_at;

        let mut second = observation("v1", &[("new-only", 3)]);
        second.video.view_count = 9999;
        repo.upsert_video_with_products(&second).await.unwrap();

        let stored = repo.get_video("v1").await.unwrap().unwrap();
        assert_eq!(stored.video.view_count, 9999);
        assert_eq!(stored.products.len(), 1);
        assert_eq!(stored.products[0].product_name, "new-only");
        // first-crawl timestamp survives the upsert
        assert_eq!(
            stored.video.created_at.timestamp(),
            created_at.timestamp()
        );
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (repo, _dir) = repo().await;
        let obs = observation("v1", &[("hoodie", 39_000)]);
        repo.upsert_video_with_products(&obs).await.unwrap();
        repo.upsert_video_with_products(&obs).await.unwrap();

        let all = repo.list_videos_with_products().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].products.len(), 1);
    }

    #[tokio::test]
    async fn nameless_products_dropped_at_persistence() {
        let (repo, _dir) = repo().await;
        let obs = observation("v1", &[("   ", 5), ("named", 7)]);
        repo.upsert_video_with_products(&obs).await.unwrap();

        let stored = repo.get_video("v1").await.unwrap().unwrap();
        assert_eq!(stored.products.len(), 1);
        assert_eq!(stored.products[0].product_name, "named");
    }

    #[tokio::test]
    async fn delete_cascades_to_products() {
        let (repo, _dir) = repo().await;
        repo.upsert_video_with_products(&observation("v1", &[("hoodie", 1)]))
            .await
            .unwrap();

        assert!(repo.delete_video("v1").await.unwrap());
        assert!(!repo.delete_video("v1").await.unwrap());

        let orphans = repo.products_of("v1").await.unwrap();
        assert!(orphans.is_empty());
    }

    #[tokio::test]
    async fn delete_by_source_removes_only_that_channel() {
        let (repo, _dir) = repo().await;
        repo.upsert_video_with_products(&observation("v1", &[]))
            .await
            .unwrap();
        let mut other = observation("v2", &[]);
        other.video.source_url = "https://www.youtube.com/@other".into();
        repo.upsert_video_with_products(&other).await.unwrap();

        let removed = repo
            .delete_by_source_url("https://www.youtube.com/@channel")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get_video("v1").await.unwrap().is_none());
        assert!(repo.get_video("v2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn patch_updates_only_populated_fields() {
        let (repo, _dir) = repo().await;
        repo.upsert_video_with_products(&observation("v1", &[]))
            .await
            .unwrap();

        let patched = repo
            .patch_video(
                "v1",
                &VideoPatch {
                    title: Some("edited".into()),
                    view_count: Some(777),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(patched);

        let stored = repo.get_video("v1").await.unwrap().unwrap();
        assert_eq!(stored.video.title, "edited");
        assert_eq!(stored.video.view_count, 777);
        assert_eq!(stored.video.channel_name, "channel");

        assert!(!repo
            .patch_video("missing", &VideoPatch::default())
            .await
            .unwrap());
    }
}
