//! Ordered-candidate field extraction
//!
//! One mechanism serves every scalar field on a video page: try each
//! CSS selector candidate in listed order, give each a bounded number
//! of attempts with a short delay and a fresh page snapshot in between
//! (late-attaching DOM is the common case, not the exception), and
//! return the first present, non-empty text. Exhaustion yields `None`;
//! "element not found" is a value here, never an error.

use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

use super::browser::BrowserDriver;

pub struct FieldExtractor {
    retry_count: u32,
    retry_delay: Duration,
}

impl FieldExtractor {
    pub fn new(retry_count: u32, retry_delay_ms: u64) -> Self {
        Self {
            retry_count: retry_count.max(1),
            retry_delay: Duration::from_millis(retry_delay_ms),
        }
    }

    /// Extract one logical field from the live page.
    ///
    /// Earlier candidates are the more specific/reliable locators;
    /// later ones cover older page layouts.
    pub async fn extract<D: BrowserDriver + ?Sized>(
        &self,
        driver: &D,
        field: &str,
        candidates: &[String],
    ) -> Option<String> {
        for selector in candidates {
            for attempt in 1..=self.retry_count {
                let html = match driver.page_source().await {
                    Ok(html) => html,
                    Err(e) => {
                        warn!("page source unavailable while extracting {field}: {e}");
                        return None;
                    }
                };
                if let Some(text) = select_first_text(&html, selector) {
                    debug!("extracted {field} via '{selector}' (attempt {attempt})");
                    return Some(text);
                }
                if attempt < self.retry_count {
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
            debug!("candidate '{selector}' exhausted for {field}");
        }
        debug!("all candidates exhausted for {field}");
        None
    }
}

/// First non-empty text content matching `selector` in a document.
pub fn select_first_text(html: &str, selector: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let parsed = Selector::parse(selector).ok()?;
    document
        .select(&parsed)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
}

/// Same contract against an already-parsed fragment, used for fields
/// nested inside one shelf item.
pub fn select_text_in(fragment: &Html, candidates: &[String]) -> Option<String> {
    for selector in candidates {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if let Some(text) = fragment
            .select(&parsed)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .find(|text| !text.is_empty())
        {
            return Some(text);
        }
    }
    None
}
