//! Text normalizers for locale-specific page text
//!
//! YouTube renders counts, prices and dates as Korean display strings
//! (조회수 1.2만회, 구독자 31.4만명, ₩12,900, 2024. 3. 9.). Every function
//! here is total over arbitrary input and idempotent on its own output:
//! unparseable text falls back to a documented default instead of an error.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static DOTTED_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})\.\s*(\d{1,2})\.\s*(\d{1,2})\.?").unwrap());
static KOREAN_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})년\s*(\d{1,2})월\s*(\d{1,2})일").unwrap());
static COMPACT_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})(\d{2})(\d{2})").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static PRODUCT_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*개\s*제품").unwrap());

/// Scale a numeric prefix by a magnitude suffix (천 = 1e3, 만 = 1e4, 억 = 1e8).
fn scaled(text: &str, unit: &str, factor: f64) -> Option<i64> {
    if !text.contains(unit) {
        return None;
    }
    let number: f64 = text.replace(unit, "").trim().parse().ok()?;
    Some((number * factor) as i64)
}

/// Parse a view-count display string into an integer.
///
/// `"조회수 1,234회"` -> 1234, `"1.2만회"` -> 12000, anything else -> 0.
pub fn parse_view_count(text: &str) -> i64 {
    let cleaned = text
        .replace("조회수", "")
        .replace('회', "")
        .replace(',', "")
        .trim()
        .to_string();
    if let Some(n) = scaled(&cleaned, "천", 1_000.0) {
        return n;
    }
    if let Some(n) = scaled(&cleaned, "만", 10_000.0) {
        return n;
    }
    cleaned.parse().unwrap_or(0)
}

/// Parse a subscriber-count display string into an integer.
///
/// Supports 천/만/억 magnitude suffixes; `"구독자 31.4만명"` -> 314000.
/// Returns 0 when nothing numeric remains.
pub fn parse_subscriber_count(text: &str) -> i64 {
    let cleaned = text
        .replace("구독자", "")
        .replace('명', "")
        .replace(',', "")
        .trim()
        .to_string();
    if let Some(n) = scaled(&cleaned, "천", 1_000.0) {
        return n;
    }
    if let Some(n) = scaled(&cleaned, "만", 10_000.0) {
        return n;
    }
    if let Some(n) = scaled(&cleaned, "억", 100_000_000.0) {
        return n;
    }
    cleaned.parse().unwrap_or(0)
}

/// Parse a price display string into an integer amount.
///
/// Strips the currency symbol, separators and whitespace, then keeps the
/// remaining digits. `"₩1,234"` -> 1234; no digits -> 0.
pub fn parse_price(text: &str) -> i64 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Parse an upload-date display string.
///
/// Accepts `YYYY. M. D.`, `YYYY년 M월 D일` or compact `YYYYMMDD`;
/// anything else is unresolved (`None`).
pub fn parse_upload_date(text: &str) -> Option<NaiveDate> {
    for pattern in [&*DOTTED_DATE, &*KOREAN_DATE, &*COMPACT_DATE] {
        if let Some(caps) = pattern.captures(text) {
            let year: i32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            let day: u32 = caps[3].parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }
    }
    None
}

/// Extract the on-page product counter (`"N개 제품"`), when present.
pub fn parse_product_count(text: &str) -> Option<i64> {
    PRODUCT_COUNT
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// Collapse runs of blank lines in a description into a single newline
/// and trim outer whitespace.
pub fn clean_description(text: &str) -> String {
    BLANK_LINES.replace_all(text, "\n").trim().to_string()
}

/// Collapse a video URL carrying a duplicated `watch?v=` query segment
/// down to one canonical `watch?v=<id>` form.
///
/// Channel listing anchors occasionally render nested watch URLs; the
/// final occurrence carries the real identifier.
pub fn canonical_video_url(url: &str) -> String {
    if url.matches("watch?v=").count() > 1 {
        if let Some(id) = url.rsplit("watch?v=").next() {
            return watch_url(id);
        }
    }
    url.to_string()
}

/// Canonical watch URL for a video identifier.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Extract the video identifier from a watch URL.
pub fn video_id_from_url(url: &str) -> Option<String> {
    let tail = url.rsplit("v=").next()?;
    if tail == url {
        return None;
    }
    let id: String = tail.chars().take_while(|c| *c != '&').collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_count_plain_and_scaled() {
        assert_eq!(parse_view_count("조회수 1,234회"), 1234);
        assert_eq!(parse_view_count("조회수 1.5천회"), 1500);
        assert_eq!(parse_view_count("조회수 1.2만회"), 12000);
        assert_eq!(parse_view_count(""), 0);
        assert_eq!(parse_view_count("조회수 없음"), 0);
    }

    #[test]
    fn subscriber_count_all_magnitudes() {
        assert_eq!(parse_subscriber_count("구독자 980명"), 980);
        assert_eq!(parse_subscriber_count("구독자 2.4천명"), 2400);
        assert_eq!(parse_subscriber_count("구독자 31.4만명"), 314_000);
        assert_eq!(parse_subscriber_count("구독자 1.1억명"), 110_000_000);
        assert_eq!(parse_subscriber_count("garbage"), 0);
    }

    #[test]
    fn price_strips_currency_and_separators() {
        assert_eq!(parse_price("₩1,234"), 1234);
        assert_eq!(parse_price("₩ 12,900원"), 12900);
        assert_eq!(parse_price(""), 0);
        assert_eq!(parse_price("가격 정보 없음"), 0);
    }

    #[test]
    fn upload_date_three_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_upload_date("2024. 3. 9."), Some(expected));
        assert_eq!(parse_upload_date("2024년 3월 9일"), Some(expected));
        assert_eq!(parse_upload_date("20240309"), Some(expected));
        assert_eq!(parse_upload_date("garbage"), None);
        assert_eq!(parse_upload_date(""), None);
    }

    #[test]
    fn product_count_badge() {
        assert_eq!(parse_product_count("설명 · 5개 제품"), Some(5));
        assert_eq!(parse_product_count("제품 없음"), None);
    }

    #[test]
    fn description_blank_line_collapse() {
        assert_eq!(clean_description("a\n\n\n\nb"), "a\nb");
        assert_eq!(clean_description("  a\n \nb  "), "a\nb");
        assert_eq!(clean_description(""), "");
    }

    #[test]
    fn canonical_url_collapses_duplicate_watch_segment() {
        assert_eq!(
            canonical_video_url("https://y/watch?v=X&u=/watch?v=Y"),
            "https://www.youtube.com/watch?v=Y"
        );
        let single = "https://www.youtube.com/watch?v=abc123";
        assert_eq!(canonical_video_url(single), single);
    }

    #[test]
    fn video_id_extraction() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?v=abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?v=abc123&t=10s"),
            Some("abc123".to_string())
        );
        assert_eq!(video_id_from_url("https://www.youtube.com/@channel"), None);
    }

    #[test]
    fn normalizers_idempotent_on_own_output() {
        let views = parse_view_count("조회수 1.2만회");
        assert_eq!(parse_view_count(&views.to_string()), views);
        let subs = parse_subscriber_count("31.4만명");
        assert_eq!(parse_subscriber_count(&subs.to_string()), subs);
        let price = parse_price("₩1,234");
        assert_eq!(parse_price(&price.to_string()), price);
        let desc = clean_description("a\n\n\nb");
        assert_eq!(clean_description(&desc), desc);
        let url = canonical_video_url("https://y/watch?v=X&u=/watch?v=Y");
        assert_eq!(canonical_video_url(&url), url);
    }
}
