//! Article extraction from news pages.
//!
//! Extraction follows a two-phase pattern:
//!
//! 1. **Fetching**: one GET per URL with a pinned browser-like identity,
//!    rejecting anything that is not an HTML document
//! 2. **Parsing**: independent fail-soft field extractors over the parsed
//!    page and its JSON-LD metadata
//!
//! # Submodules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`article`] | HTTP client, fetch, record assembly, batch processing |
//! | [`fields`] | Title, lead, body, sources, credits, dates, meta tags |
//! | [`jsonld`] | Choosing the article object and reading its keys |
//!
//! A failure only ever costs the URL it happened on: the batch logs it and
//! moves to the next one.

pub mod article;
pub mod fields;
pub mod jsonld;

use thiserror::Error;

/// Why a single URL produced no [`ArticleRecord`](crate::models::ArticleRecord).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("not an http(s) URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not HTML: {0}")]
    NotHtml(String),

    #[error("malformed or non-document HTML")]
    MalformedDocument,
}
