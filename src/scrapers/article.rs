//! Fetching article pages and assembling [`ArticleRecord`]s.

use crate::models::ArticleRecord;
use crate::scrapers::ExtractError;
use crate::scrapers::{fields, jsonld};
use crate::settings::Settings;
use crate::utils::format_timestamp;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use scraper::Html;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

pub const USER_AGENT: &str = "Mozilla/5.0";
pub const LANGUAGE_PREFERENCE: &str = "fr-CH,fr;q=0.9,en;q=0.8,de;q=0.7";

static HTML_START_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html[\s>/]").unwrap());
static BODY_START_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body[\s>/]").unwrap());

/// Build the HTTP client used for every article fetch.
pub fn build_client(settings: &Settings) -> Result<Client, ExtractError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(LANGUAGE_PREFERENCE));

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(settings.fetch_timeout)
        .build()?;
    Ok(client)
}

/// Read the input file: one URL per line, anything not starting with
/// `http` (headers, blanks, comments) is skipped.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_input_urls(path: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    let contents = fs::read_to_string(path).await?;

    let mut urls = Vec::new();
    for line in contents.lines() {
        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        if !url.starts_with("http") {
            warn!(line = %url, "Skipping invalid URL");
            continue;
        }
        urls.push(url.to_string());
    }

    info!(count = urls.len(), "Read input URLs");
    Ok(urls)
}

/// GET a page and parse it, rejecting non-HTML responses and documents
/// without an `<html>` and `<body>`.
pub async fn fetch_document(client: &Client, url: &str) -> Result<Html, ExtractError> {
    let response = client.get(url).send().await?.error_for_status()?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    if !content_type.contains("text/html") {
        return Err(ExtractError::NotHtml(content_type));
    }

    let bytes = response.bytes().await?;
    let html = String::from_utf8_lossy(&bytes);
    ensure_document(&html)?;

    Ok(Html::parse_document(&html))
}

/// The parser synthesises `<html>` and `<body>`, so the raw source is
/// checked for both start tags instead.
fn ensure_document(source: &str) -> Result<(), ExtractError> {
    let has_root = HTML_START_TAG.is_match(source);
    let has_body = BODY_START_TAG.is_match(source);
    if has_root && has_body {
        Ok(())
    } else {
        Err(ExtractError::MalformedDocument)
    }
}

/// Assemble a record from an already parsed page.
///
/// Every field is extracted independently; a miss leaves that field empty.
pub fn extract_article(url: &str, document: &Html, accessed: DateTime<Utc>) -> ArticleRecord {
    let j = jsonld::extract_structured_metadata(document);
    let body = fields::body_element(document);

    ArticleRecord {
        url: url.to_string(),
        title: fields::extract_title(document),
        lead: fields::extract_lead(document),
        body: body.and_then(fields::extract_body),
        headline: jsonld::text_from_jsonld(&j, "headline"),
        alternative_headline: jsonld::text_from_jsonld(&j, "alternativeHeadline"),
        description: fields::extract_description(document, &j),
        keywords: jsonld::keywords_from_jsonld(&j),
        article_section: jsonld::text_from_jsonld(&j, "articleSection"),
        in_language: jsonld::text_from_jsonld(&j, "inLanguage"),
        canonical_url: jsonld::canonical_url_from_jsonld(&j)
            .or_else(|| fields::extract_canonical_link(document)),
        publisher_name: jsonld::publisher_name_from_jsonld(&j),
        date_published: fields::extract_date_published(document),
        date_accessed: format_timestamp(accessed),
        sources: body.map(fields::extract_sources).unwrap_or_default(),
        credit: body.map(fields::extract_credits).unwrap_or_default(),
    }
}

/// Fetch and extract a single article.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn scrape_article(client: &Client, url: &str) -> Result<ArticleRecord, ExtractError> {
    let parsed = Url::parse(url).map_err(|_| ExtractError::InvalidUrl(url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ExtractError::InvalidUrl(url.to_string()));
    }

    let document = fetch_document(client, url).await?;
    let article = extract_article(url, &document, Utc::now());

    info!(
        body_bytes = article.body.as_ref().map_or(0, String::len),
        keywords = article.keywords.len(),
        has_jsonld = article.headline.is_some(),
        "Parsed article"
    );
    Ok(article)
}

/// Scrape every URL in order. Failed URLs are logged and left out.
#[instrument(level = "info", skip_all)]
pub async fn fetch_articles(client: &Client, urls: Vec<String>) -> Vec<ArticleRecord> {
    let total = urls.len();
    let articles: Vec<ArticleRecord> = stream::iter(urls)
        .then(|url: String| async move {
            match scrape_article(client, &url).await {
                Ok(article) => {
                    debug!(%url, "Fetched article");
                    Some(article)
                }
                Err(e) => {
                    error!(error = %e, %url, "Article extraction failed");
                    None
                }
            }
        })
        .filter_map(std::future::ready)
        .collect()
        .await;

    info!(
        fetched = articles.len(),
        failed = total - articles.len(),
        "Fetched article contents"
    );
    articles
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RTS_PAGE: &str = r#"<!DOCTYPE html>
<html lang="fr">
<head>
  <title>Le Parlement adopte la réforme - rts.ch - Suisse</title>
  <meta name="dcterms.description" content="Les Chambres ont tranché.">
  <script type="application/ld+json">{"@type": "BreadcrumbList"}</script>
  <script type="application/ld+json">
  {
    "@context": "https://schema.org",
    "@type": "NewsArticle",
    "headline": "Le Parlement adopte la réforme",
    "alternativeHeadline": "Réforme adoptée",
    "keywords": "politique, Parlement, réforme",
    "articleSection": "Suisse",
    "inLanguage": "fr",
    "mainEntityOfPage": "https://www.rts.ch/info/suisse/2025/article/le-parlement-adopte-28812345.html",
    "publisher": {"@type": "Organization", "name": "RTS"}
  }
  </script>
</head>
<body>
  <div class="article-part article-lead"><p>Les Chambres ont tranché mardi.</p></div>
  <time datetime="2025-03-04T09:15:00+01:00">4 mars</time>
  <p>Le Conseil national a suivi le Conseil des Etats.</p>
  <h2>Un long débat</h2>
  <p>Les discussions ont duré six heures.</p>
  <p class="sources">ATS/jfe</p>
  <p class="credit">Photo: Keystone</p>
  <p>Autres articles</p>
</body>
</html>"#;

    #[test]
    fn test_extract_article_from_full_page() {
        let doc = Html::parse_document(RTS_PAGE);
        let accessed = Utc.with_ymd_and_hms(2025, 3, 5, 8, 0, 0).unwrap();
        let article = extract_article("https://www.rts.ch/x.html", &doc, accessed);

        assert_eq!(article.url, "https://www.rts.ch/x.html");
        assert_eq!(
            article.title.as_deref(),
            Some("Le Parlement adopte la réforme - rts.ch - Suisse")
        );
        assert_eq!(article.lead.as_deref(), Some("Les Chambres ont tranché mardi."));
        assert_eq!(
            article.body.as_deref(),
            Some(
                "Les Chambres ont tranché mardi.\n\n\
                 Le Conseil national a suivi le Conseil des Etats.\n\n\
                 Un long débat\n\n\
                 Les discussions ont duré six heures."
            )
        );
        assert_eq!(article.headline.as_deref(), Some("Le Parlement adopte la réforme"));
        assert_eq!(article.alternative_headline.as_deref(), Some("Réforme adoptée"));
        assert_eq!(article.description.as_deref(), Some("Les Chambres ont tranché."));
        assert_eq!(article.keywords, vec!["politique", "Parlement", "réforme"]);
        assert_eq!(article.article_section.as_deref(), Some("Suisse"));
        assert_eq!(article.in_language.as_deref(), Some("fr"));
        assert_eq!(article.publisher_name.as_deref(), Some("RTS"));
        assert!(article.canonical_url.as_deref().unwrap().ends_with("-28812345.html"));
        assert_eq!(article.date_published.as_deref(), Some("2025-03-04 08:15:00"));
        assert_eq!(article.date_accessed, "2025-03-05 08:00:00");
        assert_eq!(article.sources, vec!["ATS/jfe"]);
        assert_eq!(article.credit, vec!["Photo: Keystone"]);
    }

    #[test]
    fn test_extract_article_degrades_field_by_field() {
        let doc = Html::parse_document("<html><body><p>Seul paragraphe.</p></body></html>");
        let accessed = Utc.with_ymd_and_hms(2025, 3, 5, 8, 0, 0).unwrap();
        let article = extract_article("https://example.org/a", &doc, accessed);

        assert_eq!(article.body.as_deref(), Some("Seul paragraphe."));
        assert_eq!(article.title, None);
        assert_eq!(article.headline, None);
        assert_eq!(article.canonical_url, None);
        assert_eq!(article.date_published, None);
        assert!(article.keywords.is_empty());
        assert!(article.sources.is_empty());
        assert_eq!(article.date_accessed, "2025-03-05 08:00:00");
    }

    #[test]
    fn test_ensure_document_requires_html_and_body_tags() {
        assert!(ensure_document("<!DOCTYPE html>\n<HTML lang=\"fr\"><Body class=\"page\"><p>x</p></body></html>").is_ok());
        assert!(ensure_document("<html><body></body></html>").is_ok());
        assert!(ensure_document(RTS_PAGE).is_ok());

        for source in ["", "just some text", r#"{"json": true}"#, "%PDF-1.4 binary junk", "<p>fragment only</p>"] {
            assert!(
                matches!(ensure_document(source), Err(ExtractError::MalformedDocument)),
                "accepted {source:?}"
            );
        }
        assert!(ensure_document("<html><head></head></html>").is_err());
        assert!(ensure_document("<body><p>no root</p></body>").is_err());
        assert!(ensure_document("<htmlx><bodyguard>").is_err());
    }

    #[tokio::test]
    async fn test_non_http_url_is_rejected_before_fetch() {
        let client = Client::new();
        let err = scrape_article(&client, "ftp://example.org/article.html")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_read_input_urls_skips_non_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.csv");
        tokio::fs::write(
            &path,
            "url\nhttps://www.rts.ch/info/1.html\n\n  https://www.rts.ch/info/2.html  \nwww.rts.ch/3\n",
        )
        .await
        .unwrap();

        let urls = read_input_urls(&path).await.unwrap();
        assert_eq!(
            urls,
            vec!["https://www.rts.ch/info/1.html", "https://www.rts.ch/info/2.html"]
        );
    }
}
