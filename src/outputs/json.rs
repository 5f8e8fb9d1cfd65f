//! JSON persistence for scraped articles.
//!
//! # Output Structure
//!
//! ```text
//! webdata/
//! ├── 28812345.json                 # numeric id from the canonical URL
//! └── breaking_something_happens.json  # title slug when there is no id
//! ```
//!
//! Records are pretty-printed UTF-8 with non-ASCII text kept as is. A later
//! extraction of the same article overwrites the earlier file.

use crate::models::ArticleRecord;
use crate::utils::{slugify, write_json};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

static NUMERIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\.html$").unwrap());

const SLUG_MAX_LEN: usize = 30;

/// Filename for an article record.
///
/// The digits right before a trailing `.html` in the canonical URL (or the
/// requested URL) are used when present; otherwise a slug of the title, the
/// headline, or the word `article`.
pub fn article_filename(article: &ArticleRecord) -> String {
    let url = article
        .canonical_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .or(Some(article.url.as_str()).filter(|u| !u.is_empty()));

    if let Some(caps) = url.and_then(|u| NUMERIC_ID.captures(u)) {
        return format!("{}.json", &caps[1]);
    }

    let title = article
        .title
        .as_deref()
        .or(article.headline.as_deref())
        .unwrap_or("article");
    let slug = slugify(title, SLUG_MAX_LEN);
    let slug = if slug.is_empty() { "article" } else { slug.as_str() };
    format!("{slug}.json")
}

/// Write one article into `dir` and return its path.
pub async fn write_article(article: &ArticleRecord, dir: &Path) -> io::Result<PathBuf> {
    let path = dir.join(article_filename(article));
    write_json(&path, article).await?;
    Ok(path)
}

/// Write every article into `dir`; failures are logged per file.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_articles(articles: &[ArticleRecord], dir: &Path) -> usize {
    let mut written = 0;
    for article in articles {
        match write_article(article, dir).await {
            Ok(path) => {
                info!(path = %path.display(), "Wrote article");
                written += 1;
            }
            Err(e) => error!(url = %article.url, error = %e, "Failed to write article"),
        }
    }
    written
}
