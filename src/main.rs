use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::info;

use ytshelf::infrastructure::init_logging;
use ytshelf::{AppConfig, CrawlService, DatabaseConnection, VideoRepository};

const DEFAULT_CONFIG_PATH: &str = "ytshelf.json";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut channel_urls: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => match args.next() {
                Some(path) => config_path = PathBuf::from(path),
                None => bail!("--config requires a file path"),
            },
            "--help" | "-h" => {
                println!("usage: ytshelf [--config <file>] <channel-url>...");
                return Ok(());
            }
            _ => channel_urls.push(arg),
        }
    }
    if channel_urls.is_empty() {
        bail!("usage: ytshelf [--config <file>] <channel-url>...");
    }
    CrawlService::validate_channel_urls(&channel_urls)?;

    let config = AppConfig::load(&config_path).await?;
    let db = DatabaseConnection::new(&config.database_url).await?;
    db.migrate().await?;
    let service = CrawlService::new(config, VideoRepository::new(db.pool().clone()));

    let cancel = service.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current video");
            cancel.cancel();
        }
    });

    let summaries = service.crawl_channels(&channel_urls).await?;
    for summary in &summaries {
        info!(
            "{}: {} found, {} crawled, {} failed{}",
            summary.channel_url,
            summary.videos_found,
            summary.videos_crawled,
            summary.videos_failed,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
    }
    Ok(())
}
