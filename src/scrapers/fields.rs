//! Fail-soft field extractors over a parsed article page.
//!
//! Each function reads one field and returns `None` or an empty list when
//! its selector does not match. None of them can fail.

use crate::scrapers::jsonld::{JsonLd, safe_strip, text_from_jsonld};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::utils::format_timestamp;

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static LEAD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.article-part.article-lead").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static BODY_BLOCKS: Lazy<Selector> = Lazy::new(|| Selector::parse("p, h2, h3").unwrap());
static SOURCES: Lazy<Selector> = Lazy::new(|| Selector::parse("p.sources").unwrap());
static CREDITS: Lazy<Selector> = Lazy::new(|| Selector::parse("p.credit").unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static META_DC_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="dcterms.description"]"#).unwrap());
static META_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).unwrap());
static LINK_CANONICAL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"link[rel="canonical"]"#).unwrap());

/// Classes that mark the end of the article text.
const BOUNDARY_CLASSES: &[&str] = &["sources", "credit"];

/// Text of an element: each text node trimmed, empty ones dropped, joined
/// with single spaces.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .join(" ")
}

pub fn body_element(document: &Html) -> Option<ElementRef<'_>> {
    document.select(&BODY).next()
}

pub fn extract_title(document: &Html) -> Option<String> {
    let title = document.select(&TITLE).next()?;
    safe_strip(&title.text().collect::<String>())
}

pub fn extract_lead(document: &Html) -> Option<String> {
    let lead = document.select(&LEAD).next()?;
    safe_strip(&element_text(lead))
}

/// Paragraphs and `h2`/`h3` subheadings in document order, separated by a
/// blank line.
///
/// Any classed block is treated as page furniture and skipped; the first
/// `sources` or `credit` block ends the article.
pub fn extract_body(body: ElementRef<'_>) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    for block in body.select(&BODY_BLOCKS) {
        let classes: Vec<&str> = block.value().classes().collect();
        if classes.iter().any(|c| BOUNDARY_CLASSES.contains(c)) {
            break;
        }
        if !classes.is_empty() {
            continue;
        }

        let text = element_text(block);
        if !text.is_empty() {
            parts.push(text);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

pub fn extract_sources(body: ElementRef<'_>) -> Vec<String> {
    body.select(&SOURCES).map(element_text).collect()
}

pub fn extract_credits(body: ElementRef<'_>) -> Vec<String> {
    body.select(&CREDITS).map(element_text).collect()
}

/// The first `<time datetime=…>`, normalised to UTC when it parses and
/// passed through verbatim when it does not.
pub fn extract_date_published(document: &Html) -> Option<String> {
    let raw = document.select(&TIME).next()?.value().attr("datetime")?;
    Some(normalize_timestamp(raw).unwrap_or_else(|| raw.to_string()))
}

/// Parse an ISO 8601 style timestamp and render it as UTC
/// `YYYY-MM-DD HH:MM:SS`. Values without an offset are taken as UTC and a
/// bare date as midnight.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(format_timestamp(dt.with_timezone(&Utc)));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(format_timestamp(dt.with_timezone(&Utc)));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(format_timestamp(naive.and_utc()));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| format_timestamp(naive.and_utc()))
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|meta| meta.value().attr("content"))
        .find_map(safe_strip)
}

/// `dcterms.description`, then the JSON-LD `description`, then the generic
/// description meta tag.
pub fn extract_description(document: &Html, jsonld: &JsonLd) -> Option<String> {
    meta_content(document, &META_DC_DESCRIPTION)
        .or_else(|| text_from_jsonld(jsonld, "description"))
        .or_else(|| meta_content(document, &META_DESCRIPTION))
}

pub fn extract_canonical_link(document: &Html) -> Option<String> {
    document
        .select(&LINK_CANONICAL)
        .filter_map(|link| link.value().attr("href"))
        .find_map(safe_strip)
}
