//! Per-channel CSV export
//!
//! Each channel gets one CSV file named after its sanitized channel
//! name. An export merges into the existing file: rows for video ids
//! present in the new batch supersede their old rows, everything else
//! is kept, and the merged set is rewritten sorted newest-crawl-first.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::{ExportRow, VideoCrawlResult};

/// File name for a channel: alphanumerics kept, everything else mapped
/// to `_`, so arbitrary display names stay filesystem-safe.
pub fn channel_file_name(channel_name: &str) -> String {
    let stem: String = channel_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() {
        "channel".to_string()
    } else {
        stem
    };
    format!("{stem}.csv")
}

pub struct CsvExporter {
    export_dir: PathBuf,
}

impl CsvExporter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
        }
    }

    /// Merge a batch of crawl results into the channel's CSV file and
    /// return the file path.
    pub async fn export_channel(
        &self,
        channel_name: &str,
        results: &[VideoCrawlResult],
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .with_context(|| format!("failed to create {}", self.export_dir.display()))?;
        let path = self.export_dir.join(channel_file_name(channel_name));

        let fresh: Vec<ExportRow> = results.iter().flat_map(VideoCrawlResult::export_rows).collect();
        let fresh_ids: HashSet<&str> = fresh.iter().map(|row| row.video_id.as_str()).collect();

        let mut rows: Vec<ExportRow> = read_rows(&path)?
            .into_iter()
            .filter(|row| !fresh_ids.contains(row.video_id.as_str()))
            .collect();
        rows.extend(fresh);
        rows.sort_by(|a, b| {
            b.extracted_date
                .cmp(&a.extracted_date)
                .then_with(|| a.video_id.cmp(&b.video_id))
        });

        write_rows(&path, &rows)?;
        info!(
            "exported {} rows for channel '{channel_name}' to {}",
            rows.len(),
            path.display()
        );
        Ok(path)
    }
}

fn read_rows(path: &Path) -> Result<Vec<ExportRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        let row: ExportRow =
            row.with_context(|| format!("malformed row in {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

fn write_rows(path: &Path, rows: &[ExportRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
