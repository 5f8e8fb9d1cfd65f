//! JSON-LD (`application/ld+json`) article metadata.
//!
//! News pages usually embed a schema.org `NewsArticle` object next to
//! breadcrumb, organization and video blocks. [`extract_structured_metadata`]
//! picks the article object; the `*_from_jsonld` helpers read single keys
//! from it and never fail.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

/// A JSON-LD object, empty when the page has none.
pub type JsonLd = Map<String, Value>;

static SCRIPT_JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

const ARTICLE_TYPES: &[&str] = &[
    "NewsArticle",
    "Article",
    "AnalysisNewsArticle",
    "BackgroundNewsArticle",
    "OpinionNewsArticle",
    "ReportageNewsArticle",
    "ReviewNewsArticle",
];

/// Find the article object among the page's JSON-LD blocks.
///
/// Blocks are visited in document order. Within a block the first object
/// typed as an article wins; failing that, the first object carrying a
/// `headline` or `datePublished`. Unparseable blocks are skipped. Returns an
/// empty map when nothing qualifies.
pub fn extract_structured_metadata(document: &Html) -> JsonLd {
    for script in document.select(&SCRIPT_JSON_LD) {
        let raw = script.text().collect::<String>();
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let data = match serde_json::from_str::<Value>(raw) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "Skipping unparseable JSON-LD block");
                continue;
            }
        };

        if let Some(article) = pick_article(&data) {
            return article.clone();
        }
    }

    JsonLd::new()
}

/// Choose the article object inside one parsed JSON-LD block.
pub fn pick_article(data: &Value) -> Option<&JsonLd> {
    let candidates = candidates(data);

    candidates
        .iter()
        .copied()
        .find(|obj| is_article_type(obj))
        .or_else(|| {
            candidates
                .iter()
                .copied()
                .find(|obj| obj.contains_key("headline") || obj.contains_key("datePublished"))
        })
}

/// Objects a block offers: itself, or the entries of a top-level list, plus
/// any `@graph` members.
fn candidates(data: &Value) -> Vec<&JsonLd> {
    let mut out = Vec::new();
    match data {
        Value::Object(obj) => {
            out.push(obj);
            if let Some(Value::Array(graph)) = obj.get("@graph") {
                out.extend(graph.iter().filter_map(Value::as_object));
            }
        }
        Value::Array(items) => {
            out.extend(items.iter().filter_map(Value::as_object));
        }
        _ => {}
    }
    out
}

fn is_article_type(obj: &JsonLd) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => ARTICLE_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| ARTICLE_TYPES.contains(&t)),
        _ => false,
    }
}

/// Trim a string, `None` if nothing is left.
pub fn safe_strip(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A text-valued key; for a list value the first non-empty string is used.
pub fn text_from_jsonld(j: &JsonLd, key: &str) -> Option<String> {
    match j.get(key)? {
        Value::String(s) => safe_strip(s),
        Value::Array(items) => items.iter().filter_map(Value::as_str).find_map(safe_strip),
        _ => None,
    }
}

/// `keywords` as a list of scalars or as one comma-separated string.
pub fn keywords_from_jsonld(j: &JsonLd) -> Vec<String> {
    match j.get("keywords") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => safe_strip(s),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').filter_map(safe_strip).collect(),
        _ => Vec::new(),
    }
}

/// `publisher.name`.
pub fn publisher_name_from_jsonld(j: &JsonLd) -> Option<String> {
    j.get("publisher")?
        .as_object()
        .and_then(|publisher| text_from_jsonld(publisher, "name"))
}

/// `mainEntityOfPage`, either a plain URL or a `WebPage` object.
pub fn canonical_url_from_jsonld(j: &JsonLd) -> Option<String> {
    match j.get("mainEntityOfPage")? {
        Value::String(s) => safe_strip(s),
        Value::Object(page) => {
            text_from_jsonld(page, "@id").or_else(|| text_from_jsonld(page, "url"))
        }
        _ => None,
    }
}
