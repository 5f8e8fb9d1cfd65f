//! Flattening persisted articles and scores into tabular datasets.
//!
//! - [`prepare_results_frame`]: one [`BiasRow`] per score file
//! - [`prepare_webdata_dataset`]: one [`WebdataRow`] per article file
//!
//! Unreadable files are logged and left out of the result.

use crate::models::{ArticleRecord, ModelScoreRecord, ScoreErrorKind};
use crate::outputs::csv::{CsvRow, opt_num, opt_text};
use crate::settings::Settings;
use crate::utils::{file_stem, list_json_files};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use url::Url;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One model score for one article in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasRow {
    pub model: String,
    pub article_id: String,
    pub run: u32,
    pub score: ModelScoreRecord,
}

impl BiasRow {
    pub fn overall_bias(&self) -> Option<f64> {
        self.score.overall_bias()
    }
}

impl CsvRow for BiasRow {
    fn header() -> &'static [&'static str] {
        &[
            "model",
            "article_id",
            "subject_bias",
            "framing_bias",
            "treatment_bias",
            "guests_bias",
            "confidence",
            "comment",
            "run",
            "error",
            "overall_bias",
        ]
    }

    fn record(&self) -> Vec<String> {
        let error = match self.score.error {
            Some(ScoreErrorKind::RequestFailed) => "request_failed",
            Some(ScoreErrorKind::NoJsonFound) => "no_json_found",
            Some(ScoreErrorKind::JsonRepairFailed) => "json_repair_failed",
            None => "",
        };
        vec![
            self.model.clone(),
            self.article_id.clone(),
            opt_num(self.score.subject_bias),
            opt_num(self.score.framing_bias),
            opt_num(self.score.treatment_bias),
            opt_num(self.score.guests_bias),
            opt_num(self.score.confidence),
            opt_text(&self.score.comment),
            self.run.to_string(),
            error.to_string(),
            opt_num(self.overall_bias()),
        ]
    }
}

/// Read every score under `final/` for the configured runs and models.
#[instrument(level = "info", skip_all)]
pub async fn prepare_results_frame(settings: &Settings) -> io::Result<Vec<BiasRow>> {
    let mut rows = Vec::new();
    for run in 1..=settings.runs {
        for model in &settings.models {
            let dir = settings.model_output_dir(model, run);
            for path in list_json_files(&dir).await? {
                match read_score(&path).await {
                    Ok(score) => rows.push(BiasRow {
                        model: model.clone(),
                        article_id: file_stem(&path),
                        run,
                        score,
                    }),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable score"),
                }
            }
        }
    }
    info!(rows = rows.len(), "Prepared bias results");
    Ok(rows)
}

async fn read_score(path: &Path) -> io::Result<ModelScoreRecord> {
    let text = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

/// One scraped article, cleaned for analysis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WebdataRow {
    pub article_id: String,
    pub canonical_url: Option<String>,
    pub canonical_domain: Option<String>,
    pub publisher_name: Option<String>,
    pub article_section: Option<String>,
    pub in_language: Option<String>,
    pub date_published: Option<String>,
    pub date_accessed: Option<String>,
    pub headline: Option<String>,
    pub title: Option<String>,
    pub alternative_headline: Option<String>,
    pub lead: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub keywords: Vec<String>,
    pub sources: Vec<String>,
    pub credit: Vec<String>,
    pub file_path: String,
}

impl WebdataRow {
    pub fn from_article(article_id: String, file_path: String, article: &ArticleRecord) -> Self {
        let canonical_url = clean_text(article.canonical_url.as_deref());
        Self {
            article_id,
            canonical_domain: canonical_url.as_deref().and_then(domain_of),
            canonical_url,
            publisher_name: clean_text(article.publisher_name.as_deref()),
            article_section: clean_text(article.article_section.as_deref()),
            in_language: clean_text(article.in_language.as_deref()),
            date_published: clean_text(article.date_published.as_deref()),
            date_accessed: clean_text(Some(&article.date_accessed)),
            headline: clean_text(article.headline.as_deref()),
            title: clean_text(article.title.as_deref()),
            alternative_headline: clean_text(article.alternative_headline.as_deref()),
            lead: clean_text(article.lead.as_deref()),
            description: clean_text(article.description.as_deref()),
            body: clean_text(article.body.as_deref()),
            keywords: clean_list(&article.keywords),
            sources: clean_list(&article.sources),
            credit: clean_list(&article.credit),
            file_path,
        }
    }

    pub fn text_words_total(&self) -> usize {
        word_count(self.title.as_deref())
            + word_count(self.lead.as_deref())
            + word_count(self.body.as_deref())
    }
}

impl CsvRow for WebdataRow {
    fn header() -> &'static [&'static str] {
        &[
            "article_id",
            "canonical_url",
            "canonical_domain",
            "publisher_name",
            "article_section",
            "in_language",
            "date_published",
            "date_accessed",
            "headline",
            "title",
            "alternative_headline",
            "lead",
            "description",
            "body",
            "title_words",
            "lead_words",
            "body_words",
            "text_words_total",
            "title_chars",
            "lead_chars",
            "body_chars",
            "keywords",
            "sources",
            "credit",
            "file_path",
        ]
    }

    fn record(&self) -> Vec<String> {
        vec![
            self.article_id.clone(),
            opt_text(&self.canonical_url),
            opt_text(&self.canonical_domain),
            opt_text(&self.publisher_name),
            opt_text(&self.article_section),
            opt_text(&self.in_language),
            opt_text(&self.date_published),
            opt_text(&self.date_accessed),
            opt_text(&self.headline),
            opt_text(&self.title),
            opt_text(&self.alternative_headline),
            opt_text(&self.lead),
            opt_text(&self.description),
            opt_text(&self.body),
            word_count(self.title.as_deref()).to_string(),
            word_count(self.lead.as_deref()).to_string(),
            word_count(self.body.as_deref()).to_string(),
            self.text_words_total().to_string(),
            char_count(self.title.as_deref()).to_string(),
            char_count(self.lead.as_deref()).to_string(),
            char_count(self.body.as_deref()).to_string(),
            self.keywords.iter().join("; "),
            self.sources.iter().join("; "),
            self.credit.iter().join("; "),
            self.file_path.clone(),
        ]
    }
}

/// Build the article dataset from `webdata/`.
#[instrument(level = "info", skip_all, fields(dir = %webdata_dir.display()))]
pub async fn prepare_webdata_dataset(webdata_dir: &Path) -> io::Result<Vec<WebdataRow>> {
    let mut rows = Vec::new();
    for path in list_json_files(webdata_dir).await? {
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error reading article");
                continue;
            }
        };
        match serde_json::from_str::<ArticleRecord>(&text) {
            Ok(article) => rows.push(WebdataRow::from_article(
                file_stem(&path),
                path.display().to_string(),
                &article,
            )),
            Err(e) => warn!(path = %path.display(), error = %e, "Error parsing article"),
        }
    }
    debug!(rows = rows.len(), "Prepared article dataset");
    Ok(rows)
}

/// Strip leaked HTML tags, collapse whitespace, and trim; `None` when empty.
pub fn clean_text(text: Option<&str>) -> Option<String> {
    let text = text?;
    let without_tags = HTML_TAG.replace_all(text, " ");
    let collapsed = WHITESPACE.replace_all(&without_tags, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn clean_list(items: &[String]) -> Vec<String> {
    items.iter().filter_map(|s| clean_text(Some(s))).collect()
}

/// Host of an absolute URL.
pub fn domain_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

pub fn word_count(text: Option<&str>) -> usize {
    text.map_or(0, |t| t.split_whitespace().count())
}

pub fn char_count(text: Option<&str>) -> usize {
    text.map_or(0, |t| t.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsFile;
    use serde_json::json;

    #[test]
    fn test_clean_text() {
        assert_eq!(
            clean_text(Some("  <b>Le</b>\n\n titre\t ")).as_deref(),
            Some("Le titre")
        );
        assert_eq!(clean_text(Some(" <br/> ")), None);
        assert_eq!(clean_text(None), None);
    }

    #[test]
    fn test_counts_and_domain() {
        assert_eq!(word_count(Some("Un  deux\ntrois")), 3);
        assert_eq!(word_count(None), 0);
        assert_eq!(char_count(Some("Genève")), 6);
        assert_eq!(
            domain_of("https://www.rts.ch/info/12345.html").as_deref(),
            Some("www.rts.ch")
        );
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn test_webdata_row_from_article() {
        let article = ArticleRecord {
            title: Some("Un titre".to_string()),
            lead: Some("Le <em>chapeau</em>".to_string()),
            body: Some("Premier paragraphe.\n\nSecond.".to_string()),
            canonical_url: Some("https://www.rts.ch/info/12345.html".to_string()),
            keywords: vec![" politique ".to_string(), "  ".to_string()],
            date_accessed: "2025-05-06 10:00:00".to_string(),
            ..Default::default()
        };
        let row = WebdataRow::from_article("12345".to_string(), "webdata/12345.json".to_string(), &article);

        assert_eq!(row.canonical_domain.as_deref(), Some("www.rts.ch"));
        assert_eq!(row.lead.as_deref(), Some("Le chapeau"));
        assert_eq!(row.body.as_deref(), Some("Premier paragraphe. Second."));
        assert_eq!(row.keywords, vec!["politique"]);
        assert_eq!(row.text_words_total(), 2 + 2 + 3);

        let record = row.record();
        assert_eq!(record.len(), WebdataRow::header().len());
        assert_eq!(record[0], "12345");
        let body_column = WebdataRow::header().iter().position(|h| *h == "body").unwrap();
        assert_eq!(record[body_column], "Premier paragraphe. Second.");

        let csv = crate::outputs::csv::to_csv(&[row]);
        assert!(csv.lines().next().unwrap().contains(",description,body,"));
        assert!(csv.contains("Premier paragraphe. Second."));
    }

    #[tokio::test]
    async fn test_results_frame_reads_scores_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app")).unwrap();
        std::fs::write(dir.path().join("app/prompt.md"), "{{ARTICLE_TEXT}}").unwrap();
        let file = SettingsFile {
            runs: 2,
            models: vec!["gemma3:4b".to_string()],
            ..SettingsFile::default()
        };
        let settings = Settings::from_file(file, dir.path().to_path_buf()).unwrap();

        let run1 = settings.model_output_dir("gemma3:4b", 1);
        std::fs::create_dir_all(&run1).unwrap();
        std::fs::write(
            run1.join("101.json"),
            json!({
                "subject_bias": -0.4, "framing_bias": 0.2, "treatment_bias": 0.0,
                "guests_bias": "0.2", "confidence": 0.8, "comment": "Neutre, factuel"
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            run1.join("102.json"),
            json!({"error": "no_json_found", "raw": "?", "details": "no JSON"}).to_string(),
        )
        .unwrap();
        std::fs::write(run1.join("103.json"), "not json").unwrap();
        std::fs::write(
            run1.join("104.json"),
            json!({"subject_bias": 0.6, "error": "aucune"}).to_string(),
        )
        .unwrap();

        let rows = prepare_results_frame(&settings).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].article_id, "104");
        assert_eq!(rows[2].score.error, None);
        assert_eq!(rows[2].overall_bias(), Some(0.6));

        let scored = &rows[0];
        assert_eq!(scored.article_id, "101");
        assert_eq!(scored.run, 1);
        assert!(scored.overall_bias().unwrap().abs() < 1e-9);

        let failed = &rows[1];
        assert_eq!(failed.score.error, Some(ScoreErrorKind::NoJsonFound));
        assert_eq!(failed.overall_bias(), None);
        let record = failed.record();
        assert_eq!(record[9], "no_json_found");
        assert_eq!(record[10], "");
    }

    #[tokio::test]
    async fn test_webdata_dataset_skips_unparseable_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("1.json"),
            json!({"title": "A", "body": "B", "date_accessed": "2025-05-06 10:00:00"}).to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join("2.json"), "{").unwrap();

        let rows = prepare_webdata_dataset(dir.path()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].article_id, "1");
        assert_eq!(rows[0].title.as_deref(), Some("A"));
    }
}
