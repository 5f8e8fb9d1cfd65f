//! Data models for scraped articles and model bias scores.
//!
//! This module defines the records that cross file boundaries:
//! - [`ArticleRecord`]: One scraped article, persisted under `webdata/`
//! - [`ModelScoreRecord`]: One bias score for an (article, model, run) triple,
//!   persisted under `final/<model>/<run>/`
//! - [`GenerationOptions`]: Sampling knobs forwarded to the model endpoint

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A news article as extracted from its HTML page.
///
/// Every field except `url` and `date_accessed` is best-effort: a selector
/// miss leaves the field `None` (or an empty list) instead of failing the
/// whole record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ArticleRecord {
    /// The URL that was requested.
    #[serde(default)]
    pub url: String,

    /// Text of the `<title>` element.
    pub title: Option<String>,
    /// Text of the lead container.
    pub lead: Option<String>,
    /// Paragraphs and subheadings up to the sources/credit boundary.
    pub body: Option<String>,

    pub headline: Option<String>,
    pub alternative_headline: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub article_section: Option<String>,
    pub in_language: Option<String>,
    pub canonical_url: Option<String>,
    pub publisher_name: Option<String>,

    /// `YYYY-MM-DD HH:MM:SS` in UTC, or the raw `datetime` attribute when it
    /// could not be parsed.
    pub date_published: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS` in UTC, set at extraction time.
    pub date_accessed: String,

    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub credit: Vec<String>,
}

/// Sampling options sent with every completion request.
///
/// Unset options are omitted from the request so the endpoint's own
/// defaults apply.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.8),
            top_p: Some(0.9),
            num_predict: Some(250),
            num_ctx: Some(2048),
        }
    }
}

/// Why a scoring attempt produced an error record instead of scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreErrorKind {
    /// The model endpoint could not be reached, timed out, or answered non-2xx.
    RequestFailed,
    /// The completion did not contain an opening brace.
    NoJsonFound,
    /// All three parse attempts failed.
    JsonRepairFailed,
}

/// One bias score for an (article, model, run) triple.
///
/// Scores are read leniently: models occasionally quote their numbers, so a
/// numeric string is accepted and anything else becomes `None`. A failed
/// attempt carries `error`, the offending `raw` text (when there was one),
/// and `details`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ModelScoreRecord {
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub subject_bias: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub framing_bias: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub treatment_bias: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub guests_bias: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, deserialize_with = "lenient_error_kind", skip_serializing_if = "Option::is_none")]
    pub error: Option<ScoreErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ModelScoreRecord {
    /// Build an error-tagged record for a failed attempt.
    pub fn failure(kind: ScoreErrorKind, raw: Option<String>, details: String) -> Self {
        Self {
            error: Some(kind),
            raw,
            details: Some(details),
            ..Self::default()
        }
    }

    /// The four bias dimensions in a fixed order.
    pub fn bias_scores(&self) -> [Option<f64>; 4] {
        [
            self.subject_bias,
            self.framing_bias,
            self.treatment_bias,
            self.guests_bias,
        ]
    }

    /// Mean of the bias dimensions that are present, `None` if none are.
    pub fn overall_bias(&self) -> Option<f64> {
        let present: Vec<f64> = self.bias_scores().into_iter().flatten().collect();
        if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        }
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }))
}

/// Only the known tags are errors; a model's own `error` key is ignored.
fn lenient_error_kind<'de, D>(deserializer: D) -> Result<Option<ScoreErrorKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }))
}
