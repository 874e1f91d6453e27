//! Crawl orchestration use cases
//!
//! `CrawlService` owns the batch workflow: validate the requested
//! channel URLs, enumerate each channel, crawl every video, persist each
//! observation as it completes and export the channel's CSV at the end.
//! Per-video failures are counted and skipped; a batch only fails as a
//! whole when nothing can run at all.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::domain::VideoCrawlResult;
use crate::infrastructure::{
    with_session, AppConfig, BrowserDriver, ChannelEnumerator, CsvExporter, VideoExtractor,
    VideoPatch, VideoRepository,
};

/// Outcome of crawling one channel.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelCrawlSummary {
    pub channel_url: String,
    pub videos_found: usize,
    pub videos_crawled: usize,
    pub videos_failed: usize,
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct CrawlService {
    config: Arc<AppConfig>,
    repository: VideoRepository,
    exporter: Arc<CsvExporter>,
    cancel: CancellationToken,
}

impl CrawlService {
    pub fn new(config: AppConfig, repository: VideoRepository) -> Self {
        let exporter = Arc::new(CsvExporter::new(config.export_dir.clone()));
        Self {
            config: Arc::new(config),
            repository,
            exporter,
            cancel: CancellationToken::new(),
        }
    }

    /// Token observed between videos; cancelling it stops the batch at
    /// the next video boundary without losing completed work.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Validate a batch of channel URLs. The whole batch is rejected
    /// when any entry is not an http(s) YouTube URL, and the error names
    /// every offending entry.
    pub fn validate_channel_urls(channel_urls: &[String]) -> Result<()> {
        if channel_urls.is_empty() {
            bail!("no channel urls given");
        }
        let invalid: Vec<&str> = channel_urls
            .iter()
            .filter(|candidate| !is_youtube_channel_url(candidate))
            .map(String::as_str)
            .collect();
        if !invalid.is_empty() {
            bail!("invalid channel urls: {}", invalid.join(", "));
        }
        Ok(())
    }

    /// Crawl a batch of channels in one browser session.
    pub async fn crawl_channels(&self, channel_urls: &[String]) -> Result<Vec<ChannelCrawlSummary>> {
        Self::validate_channel_urls(channel_urls)?;

        let service = self.clone();
        let urls: Vec<String> = channel_urls.to_vec();
        with_session(self.config.crawling.wait_timeout_ms, move |session| async move {
            service.crawl_channels_with_driver(session.as_ref(), &urls).await
        })
        .await
    }

    /// Same batch workflow against any driver. The browser-session
    /// plumbing above exists only to feed this.
    pub async fn crawl_channels_with_driver<D: BrowserDriver + ?Sized>(
        &self,
        driver: &D,
        channel_urls: &[String],
    ) -> Result<Vec<ChannelCrawlSummary>> {
        let mut summaries = Vec::with_capacity(channel_urls.len());
        for channel_url in channel_urls {
            if self.cancel.is_cancelled() {
                info!("crawl batch cancelled before '{channel_url}'");
                break;
            }
            summaries.push(self.crawl_channel(driver, channel_url).await);
        }
        Ok(summaries)
    }

    async fn crawl_channel<D: BrowserDriver + ?Sized>(
        &self,
        driver: &D,
        channel_url: &str,
    ) -> ChannelCrawlSummary {
        let mut summary = ChannelCrawlSummary {
            channel_url: channel_url.to_string(),
            videos_found: 0,
            videos_crawled: 0,
            videos_failed: 0,
            cancelled: false,
        };

        let video_urls = ChannelEnumerator::new(&self.config)
            .with_cancellation(self.cancel.clone())
            .enumerate(driver, channel_url)
            .await;
        if video_urls.is_empty() {
            warn!("no videos enumerated for '{channel_url}'");
            return summary;
        }
        summary.videos_found = video_urls.len();

        let extractor = VideoExtractor::new(&self.config);
        let mut crawled: Vec<VideoCrawlResult> = Vec::new();
        for video_url in &video_urls {
            if self.cancel.is_cancelled() {
                info!("crawl cancelled mid-channel for '{channel_url}'");
                summary.cancelled = true;
                break;
            }

            let Some(result) = extractor.extract(driver, video_url, channel_url).await else {
                summary.videos_failed += 1;
                continue;
            };
            if let Err(e) = self.repository.upsert_video_with_products(&result).await {
                error!("failed to persist video {}: {e:#}", result.video.video_id);
                summary.videos_failed += 1;
                continue;
            }
            summary.videos_crawled += 1;
            crawled.push(result);
        }

        if let Some(channel_name) = crawled
            .iter()
            .map(|r| r.video.channel_name.as_str())
            .find(|name| !name.is_empty())
        {
            if let Err(e) = self.exporter.export_channel(channel_name, &crawled).await {
                error!("csv export failed for '{channel_url}': {e:#}");
            }
        } else if !crawled.is_empty() {
            warn!("no channel name extracted for '{channel_url}', skipping csv export");
        }

        info!(
            "channel '{channel_url}' done: {}/{} videos crawled, {} failed",
            summary.videos_crawled, summary.videos_found, summary.videos_failed
        );
        summary
    }

    /// Validate and launch a crawl in the background. Returns the task
    /// handle once the batch has been accepted.
    pub fn trigger_crawl(
        &self,
        channel_urls: Vec<String>,
    ) -> Result<tokio::task::JoinHandle<Result<Vec<ChannelCrawlSummary>>>> {
        Self::validate_channel_urls(&channel_urls)?;
        let service = self.clone();
        Ok(tokio::spawn(async move {
            service.crawl_channels(&channel_urls).await
        }))
    }

    pub async fn list_videos(&self) -> Result<Vec<VideoCrawlResult>> {
        self.repository.list_videos_with_products().await
    }

    pub async fn get_video(&self, video_id: &str) -> Result<Option<VideoCrawlResult>> {
        self.repository.get_video(video_id).await
    }

    pub async fn patch_video(&self, video_id: &str, patch: &VideoPatch) -> Result<bool> {
        self.repository.patch_video(video_id, patch).await
    }

    pub async fn delete_video(&self, video_id: &str) -> Result<bool> {
        self.repository.delete_video(video_id).await
    }

    /// Remove every stored video crawled from a channel URL.
    pub async fn delete_channel_data(&self, channel_url: &str) -> Result<u64> {
        self.repository
            .delete_by_source_url(channel_url)
            .await
            .with_context(|| format!("failed to delete data for '{channel_url}'"))
    }
}

fn is_youtube_channel_url(candidate: &str) -> bool {
    let Ok(parsed) = Url::parse(candidate) else {
        return false;
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    match parsed.host_str() {
        Some(host) => host == "youtube.com" || host.ends_with(".youtube.com"),
        None => false,
    }
}
