//! Product discovery on a rendered video page
//!
//! Two strategies, tried in order, first non-empty result wins:
//!
//! 1. **Structured data** - the `ytInitialData` script payload carries a
//!    `products` array mirroring what the shelf UI renders. The array is
//!    cut out of the script text by balanced-bracket scanning (the
//!    payload nests arrays, so a regex cannot bound it) and walked with
//!    fixed key paths per entry.
//! 2. **DOM renderer** - merch-shelf item elements, with bounded clicks
//!    of the shelf's pagination control to reveal further items, and
//!    ordered candidate selectors per field.
//!
//! Per-item failures skip only that item; a strategy-wide failure yields
//! an empty list for the strategy and never propagates.

use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use super::browser::BrowserDriver;
use super::config::{CrawlingConfig, SelectorConfig};
use super::field_extractor::select_text_in;
use crate::domain::RawProduct;

const YT_INITIAL_DATA_MARKER: &str = "var ytInitialData";
const PRODUCTS_KEY_MARKER: &str = "\"products\":";

/// Lazy-load attributes checked after `src`, in order.
const IMAGE_FALLBACK_ATTRS: [&str; 3] = ["data-src", "data-thumb", "data-lazy-src"];

pub struct ProductExtractor<'a> {
    selectors: &'a SelectorConfig,
    crawling: &'a CrawlingConfig,
}

impl<'a> ProductExtractor<'a> {
    pub fn new(selectors: &'a SelectorConfig, crawling: &'a CrawlingConfig) -> Self {
        Self {
            selectors,
            crawling,
        }
    }

    /// Run the two-strategy protocol against the current page.
    pub async fn extract<D: BrowserDriver + ?Sized>(&self, driver: &D) -> Vec<RawProduct> {
        let html = match driver.page_source().await {
            Ok(html) => html,
            Err(e) => {
                warn!("page source unavailable for product extraction: {e}");
                return Vec::new();
            }
        };

        let structured = self.structured_products(&html);
        if !structured.is_empty() {
            debug!("structured-data strategy found {} products", structured.len());
            return dedup_products(structured);
        }

        let from_dom = self.dom_products(driver, html).await;
        debug!("DOM-renderer strategy found {} products", from_dom.len());
        dedup_products(from_dom)
    }

    /// Strategy 1: walk the embedded `ytInitialData` products array.
    fn structured_products(&self, html: &str) -> Vec<RawProduct> {
        let Some(payload_start) = html.find(YT_INITIAL_DATA_MARKER) else {
            debug!("no ytInitialData payload on page");
            return Vec::new();
        };
        let payload = &html[payload_start..];

        let Some(span) = extract_balanced_array(payload, PRODUCTS_KEY_MARKER) else {
            debug!("ytInitialData present but no products array");
            return Vec::new();
        };

        let entries: Vec<Value> = match serde_json::from_str(span) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!("malformed products payload in ytInitialData: {e}");
                return Vec::new();
            }
        };

        let mut products = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match self.structured_entry(entry, index, html) {
                Some(product) => products.push(product),
                None => debug!("skipping structured product entry {index}: no usable title"),
            }
        }
        products
    }

    fn structured_entry(&self, entry: &Value, index: usize, html: &str) -> Option<RawProduct> {
        let name = text_of(entry.get("title")?)?;
        if name.trim().is_empty() {
            return None;
        }

        let price_text = entry.get("price").and_then(text_of);
        let merchant_name = entry
            .get("merchant")
            .and_then(text_of)
            .or_else(|| entry.get("vendorName").and_then(text_of));

        // The purchase-navigation command carries the merchant link; if
        // the shape lacks it, fall back to the sibling description node
        // at the same ordinal position in the rendered shelf.
        let merchant_link = navigation_url(entry)
            .or_else(|| self.description_node_at(html, index));

        let image_url = entry
            .get("thumbnail")
            .and_then(|t| t.get("thumbnails"))
            .and_then(Value::as_array)
            .and_then(|thumbs| self.pick_thumbnail(thumbs));

        Some(RawProduct {
            name,
            price_text,
            image_url,
            merchant_name,
            merchant_link,
        })
    }

    /// Prefer the thumbnail variant at the configured width, else the
    /// first one carrying a URL.
    fn pick_thumbnail(&self, thumbs: &[Value]) -> Option<String> {
        let preferred = thumbs.iter().find(|t| {
            t.get("width").and_then(Value::as_u64)
                == Some(u64::from(self.crawling.preferred_thumbnail_width))
        });
        preferred
            .or_else(|| thumbs.first())
            .and_then(|t| t.get("url"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }

    fn description_node_at(&self, html: &str, index: usize) -> Option<String> {
        let document = Html::parse_document(html);
        for selector in &self.selectors.product_description {
            let Ok(parsed) = Selector::parse(selector) else {
                continue;
            };
            if let Some(el) = document.select(&parsed).nth(index) {
                let text = el.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }

    /// Strategy 2: merch-shelf item renderers, paging through the shelf
    /// a bounded number of times.
    async fn dom_products<D: BrowserDriver + ?Sized>(
        &self,
        driver: &D,
        first_page: String,
    ) -> Vec<RawProduct> {
        let mut products = Vec::new();
        let mut html = first_page;
        let pages = self.crawling.max_shelf_pages.max(1);

        for shelf_page in 0..pages {
            products.extend(self.shelf_items_in(&html));

            // Every click must be followed by a re-parse, so the last
            // permitted page never gets a pagination click.
            if shelf_page + 1 >= pages {
                break;
            }
            if !self.click_shelf_next(driver).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(self.crawling.scroll_pause_ms)).await;
            match driver.page_source().await {
                Ok(refreshed) => html = refreshed,
                Err(e) => {
                    warn!("page source lost after shelf pagination (page {shelf_page}): {e}");
                    break;
                }
            }
        }
        products
    }

    fn shelf_items_in(&self, html: &str) -> Vec<RawProduct> {
        let document = Html::parse_document(html);

        let mut items = Vec::new();
        for selector in &self.selectors.shelf_item {
            let Ok(parsed) = Selector::parse(selector) else {
                continue;
            };
            items = document.select(&parsed).map(|el| el.html()).collect();
            if !items.is_empty() {
                debug!("found {} shelf items via '{selector}'", items.len());
                break;
            }
        }

        items
            .iter()
            .filter_map(|outer| self.shelf_item(outer))
            .collect()
    }

    /// One shelf item. Accepted floor: non-empty title; price is kept
    /// when present but its absence does not reject the item.
    fn shelf_item(&self, outer_html: &str) -> Option<RawProduct> {
        let fragment = Html::parse_fragment(outer_html);

        let name = select_text_in(&fragment, &self.selectors.product_title)?;
        let price_text = select_text_in(&fragment, &self.selectors.product_price);
        let merchant_name = select_text_in(&fragment, &self.selectors.product_merchant)
            .map(|m| m.replace('!', "").trim().to_string())
            .filter(|m| !m.is_empty());
        let merchant_link = self.link_in(&fragment);
        let image_url = image_in(&fragment);

        Some(RawProduct {
            name,
            price_text,
            image_url,
            merchant_name,
            merchant_link,
        })
    }

    fn link_in(&self, fragment: &Html) -> Option<String> {
        for selector in &self.selectors.product_link {
            let Ok(parsed) = Selector::parse(selector) else {
                continue;
            };
            if let Some(href) = fragment
                .select(&parsed)
                .filter_map(|el| el.value().attr("href"))
                .find(|href| !href.is_empty())
            {
                return Some(href.to_string());
            }
        }
        None
    }

    async fn click_shelf_next<D: BrowserDriver + ?Sized>(&self, driver: &D) -> bool {
        for selector in &self.selectors.shelf_next_button {
            let quoted = match serde_json::to_string(selector) {
                Ok(quoted) => quoted,
                Err(_) => continue,
            };
            let script = format!(
                "(function() {{ var b = document.querySelector({quoted}); \
                 if (b) {{ b.click(); return true; }} return false; }})()"
            );
            match driver.execute_script(&script).await {
                Ok(Value::Bool(true)) => return true,
                Ok(_) => {}
                Err(e) => {
                    debug!("shelf next-button click failed via '{selector}': {e}");
                }
            }
        }
        false
    }
}

/// Within one extraction call a later product with an already-seen
/// identity key is discarded.
fn dedup_products(products: Vec<RawProduct>) -> Vec<RawProduct> {
    let mut seen = HashSet::new();
    products
        .into_iter()
        .filter(|p| seen.insert(p.identity_key()))
        .collect()
}

/// Text content of the polymorphic text shapes the payload uses:
/// a plain string, `{simpleText}`, or `{runs: [{text}]}`.
fn text_of(value: &Value) -> Option<String> {
    if let Some(text) = value.as_str() {
        return Some(text.to_string());
    }
    if let Some(text) = value.get("simpleText").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    value
        .get("runs")
        .and_then(Value::as_array)
        .and_then(|runs| runs.first())
        .and_then(|run| run.get("text"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Merchant link from the entry's purchase-navigation command.
fn navigation_url(entry: &Value) -> Option<String> {
    let endpoint = entry
        .get("navigationEndpoint")
        .or_else(|| entry.get("onProductTap"))?;
    let url = endpoint
        .get("urlEndpoint")
        .and_then(|u| u.get("url"))
        .and_then(Value::as_str)
        .or_else(|| {
            endpoint
                .get("commandMetadata")
                .and_then(|m| m.get("webCommandMetadata"))
                .and_then(|m| m.get("url"))
                .and_then(Value::as_str)
        })?;
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// Extract the balanced `[` .. `]` span following the first occurrence
/// of `marker`, depth-counting brackets while skipping string literals
/// (which may themselves contain brackets or escaped quotes).
pub fn extract_balanced_array<'t>(text: &'t str, marker: &str) -> Option<&'t str> {
    let marker_pos = text.find(marker)?;
    let after_marker = &text[marker_pos..];
    let open = marker_pos + after_marker.find('[')?;

    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[open..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..=open + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Image URL from a shelf item: `src`, then lazy-load data attributes,
/// then the first `srcset` candidate.
fn image_in(fragment: &Html) -> Option<String> {
    let img_selector = Selector::parse("img").ok()?;
    for img in fragment.select(&img_selector) {
        let attrs = img.value();
        if let Some(src) = attrs.attr("src").filter(|s| !s.is_empty() && !s.starts_with("data:")) {
            return Some(src.to_string());
        }
        for attr in IMAGE_FALLBACK_ATTRS {
            if let Some(src) = attrs.attr(attr).filter(|s| !s.is_empty()) {
                return Some(src.to_string());
            }
        }
        if let Some(srcset) = attrs.attr("srcset") {
            if let Some(first) = srcset.split_whitespace().next().filter(|s| !s.is_empty()) {
                return Some(first.trim_end_matches(',').to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::browser::testing::FakeDriver;
    use crate::infrastructure::config::AppConfig;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.crawling.scroll_pause_ms = 1;
        config.crawling.field_retry_delay_ms = 1;
        config
    }

    fn structured_page(products_json: &str) -> String {
        format!(
            "<html><body><script>var ytInitialData = {{\"contents\":{{\"sponsorSection\":{{\"products\":{products_json}}}}}}};</script></body></html>"
        )
    }

    const SHELF_ITEM_HTML: &str = r#"
        <div id="items">
          <ytd-merch-shelf-item-renderer>
            <a class="yt-simple-endpoint" href="https://shop.example/hoodie"></a>
            <img src="https://img.example/hoodie.jpg">
            <span class="product-item-title">DOM hoodie</span>
            <span class="product-item-price">₩39,000</span>
            <span class="product-item-merchant-text">Shop!</span>
          </ytd-merch-shelf-item-renderer>
        </div>"#;

    #[test]
    fn balanced_array_handles_nesting_and_strings() {
        let text = r#"prefix "products":[{"a":[1,2,[3]],"s":"bracket ] in [ string","e":"esc \" quote"},{"b":2}] suffix"#;
        let span = extract_balanced_array(text, "\"products\":").unwrap();
        let parsed: Vec<Value> = serde_json::from_str(span).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["s"], "bracket ] in [ string");
    }

    #[test]
    fn balanced_array_absent_marker() {
        assert!(extract_balanced_array("no marker here", "\"products\":").is_none());
        assert!(extract_balanced_array("\"products\": {\"not\":\"array\"}[", "\"products\":").is_some());
        assert!(extract_balanced_array("\"products\":[1,2", "\"products\":").is_none());
    }

    #[tokio::test]
    async fn structured_strategy_wins_over_dom_overlap() {
        let products = r#"[
            {"title":{"runs":[{"text":"DOM hoodie"}]},
             "price":{"simpleText":"₩39,000"},
             "navigationEndpoint":{"urlEndpoint":{"url":"https://shop.example/hoodie"}},
             "thumbnail":{"thumbnails":[
                {"url":"https://img.example/small.jpg","width":60},
                {"url":"https://img.example/mid.jpg","width":240}]}},
            {"title":"Sticker pack",
             "price":"₩5,000",
             "merchant":{"simpleText":"Shop"},
             "navigationEndpoint":{"urlEndpoint":{"url":"https://shop.example/stickers"}}}
        ]"#;
        // Shelf markup present as well; the structured result must win.
        let html = format!("{}{}", structured_page(products), SHELF_ITEM_HTML);
        let driver = FakeDriver::new().add_page("v", &html);
        driver.navigate("v").await.unwrap();

        let config = config();
        let extractor = ProductExtractor::new(&config.selectors, &config.crawling);
        let found = extractor.extract(&driver).await;

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "DOM hoodie");
        assert_eq!(found[0].price_text.as_deref(), Some("₩39,000"));
        assert_eq!(
            found[0].merchant_link.as_deref(),
            Some("https://shop.example/hoodie")
        );
        // width 240 is the preferred variant
        assert_eq!(
            found[0].image_url.as_deref(),
            Some("https://img.example/mid.jpg")
        );
        assert_eq!(found[1].name, "Sticker pack");
        assert_eq!(found[1].merchant_name.as_deref(), Some("Shop"));
    }

    #[tokio::test]
    async fn malformed_structured_payload_falls_back_to_dom() {
        let html = format!(
            "<html><script>var ytInitialData = {{\"products\":[{{\"broken\": }}]}};</script>{}</html>",
            SHELF_ITEM_HTML
        );
        let driver = FakeDriver::new().add_page("v", &html);
        driver.navigate("v").await.unwrap();

        let config = config();
        let extractor = ProductExtractor::new(&config.selectors, &config.crawling);
        let found = extractor.extract(&driver).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "DOM hoodie");
        assert_eq!(found[0].price_text.as_deref(), Some("₩39,000"));
        // decoration character stripped from the merchant text
        assert_eq!(found[0].merchant_name.as_deref(), Some("Shop"));
        assert_eq!(
            found[0].image_url.as_deref(),
            Some("https://img.example/hoodie.jpg")
        );
    }

    #[tokio::test]
    async fn dom_item_without_title_skipped() {
        let html = r#"<div id="items">
            <ytd-merch-shelf-item-renderer>
              <span class="product-item-price">₩1,000</span>
            </ytd-merch-shelf-item-renderer>
            <ytd-merch-shelf-item-renderer>
              <span class="product-item-title">Named</span>
            </ytd-merch-shelf-item-renderer>
        </div>"#;
        let driver = FakeDriver::new().add_page("v", html);
        driver.navigate("v").await.unwrap();

        let config = config();
        let extractor = ProductExtractor::new(&config.selectors, &config.crawling);
        let found = extractor.extract(&driver).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Named");
        assert_eq!(found[0].price_text, None);
    }

    #[tokio::test]
    async fn shelf_pagination_parses_the_page_each_click_reveals() {
        let first_page = r#"<div id="items">
            <ytd-merch-shelf-item-renderer>
              <span class="product-item-title">First</span>
            </ytd-merch-shelf-item-renderer>
        </div>"#;
        let second_page = r#"<div id="items">
            <ytd-merch-shelf-item-renderer>
              <span class="product-item-title">First</span>
            </ytd-merch-shelf-item-renderer>
            <ytd-merch-shelf-item-renderer>
              <span class="product-item-title">Second</span>
            </ytd-merch-shelf-item-renderer>
        </div>"#;
        let driver = FakeDriver::new()
            .add_page_timeline("v", vec![first_page.to_string(), second_page.to_string()])
            .with_click_results(&[true, true]);
        driver.navigate("v").await.unwrap();

        let mut config = config();
        config.crawling.max_shelf_pages = 2;
        let extractor = ProductExtractor::new(&config.selectors, &config.crawling);
        let found = extractor.extract(&driver).await;

        let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
        // the last parsed page must not be followed by a dangling click
        assert_eq!(driver.clicks_performed(), 1);
    }

    #[tokio::test]
    async fn single_shelf_page_never_clicks() {
        let driver = FakeDriver::new()
            .add_page("v", SHELF_ITEM_HTML)
            .with_click_results(&[true]);
        driver.navigate("v").await.unwrap();

        let mut config = config();
        config.crawling.max_shelf_pages = 1;
        let extractor = ProductExtractor::new(&config.selectors, &config.crawling);
        let found = extractor.extract(&driver).await;

        assert_eq!(found.len(), 1);
        assert_eq!(driver.clicks_performed(), 0);
    }

    #[tokio::test]
    async fn missing_navigation_endpoint_falls_back_to_description_node() {
        let products = r#"[
            {"title":"Linked","navigationEndpoint":{"urlEndpoint":{"url":"https://shop/linked"}}},
            {"title":"Unlinked","price":"₩7,000"}
        ]"#;
        let html = format!(
            r#"{}<div class="product-item-description">from shop one</div>
               <div class="product-item-description">https://shop/by-description</div>"#,
            structured_page(products)
        );
        let driver = FakeDriver::new().add_page("v", &html);
        driver.navigate("v").await.unwrap();

        let config = config();
        let extractor = ProductExtractor::new(&config.selectors, &config.crawling);
        let found = extractor.extract(&driver).await;

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].merchant_link.as_deref(), Some("https://shop/linked"));
        // entry without a navigation endpoint takes the description node
        // at its own ordinal position
        assert_eq!(
            found[1].merchant_link.as_deref(),
            Some("https://shop/by-description")
        );
    }

    #[tokio::test]
    async fn duplicate_identity_keys_discarded() {
        let products = r#"[
            {"title":"Same","navigationEndpoint":{"urlEndpoint":{"url":"https://shop/1"}}},
            {"title":"Same","navigationEndpoint":{"urlEndpoint":{"url":"https://shop/1"}}},
            {"title":"Same","navigationEndpoint":{"urlEndpoint":{"url":"https://shop/2"}}}
        ]"#;
        let driver = FakeDriver::new().add_page("v", &structured_page(products));
        driver.navigate("v").await.unwrap();

        let config = config();
        let extractor = ProductExtractor::new(&config.selectors, &config.crawling);
        let found = extractor.extract(&driver).await;

        // same title+url deduped, differing url kept
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn no_products_in_either_strategy_yields_empty() {
        let driver = FakeDriver::new().add_page("v", "<html><body>plain page</body></html>");
        driver.navigate("v").await.unwrap();

        let config = config();
        let extractor = ProductExtractor::new(&config.selectors, &config.crawling);
        assert!(extractor.extract(&driver).await.is_empty());
    }

    #[test]
    fn image_fallback_order() {
        let lazy = Html::parse_fragment(r#"<div><img src="" data-src="https://img/lazy.jpg"></div>"#);
        assert_eq!(image_in(&lazy).as_deref(), Some("https://img/lazy.jpg"));

        let srcset = Html::parse_fragment(
            r#"<div><img srcset="https://img/a.jpg 1x, https://img/b.jpg 2x"></div>"#,
        );
        assert_eq!(image_in(&srcset).as_deref(), Some("https://img/a.jpg"));

        let none = Html::parse_fragment("<div><span>no image</span></div>");
        assert_eq!(image_in(&none), None);
    }
}
