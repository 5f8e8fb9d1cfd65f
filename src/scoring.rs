//! Bias scoring of persisted articles.
//!
//! For every model and run, each article in `webdata/` (sorted by name) is
//! rendered into the prompt template, sent to the model, and the answer is
//! written to `final/<model>/<run>/<article>.json`:
//!
//! - a parseable answer is written as the parsed JSON
//! - a failed call or an unparseable answer is written as an error-tagged
//!   [`ModelScoreRecord`]
//!
//! An existing output file means the triple is done; it is never
//! overwritten and the model is not called. Articles that cannot be read are
//! logged and left without output.

use crate::api::AskAsync;
use crate::models::{ModelScoreRecord, ScoreErrorKind};
use crate::repair::{RepairError, parse_model_output};
use crate::settings::Settings;
use crate::utils::{file_stem, list_json_files, truncate_for_log, write_json};
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

/// What gets persisted for one (article, model, run).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScoreOutcome {
    Scored(Value),
    Failed(ModelScoreRecord),
}

/// Counters for one model/run pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub scored: usize,
    pub failed: usize,
    pub skipped_existing: usize,
    pub unreadable: usize,
    /// Answered, but the output file could not be written.
    pub write_failed: usize,
}

impl RunSummary {
    fn add(&mut self, other: RunSummary) {
        self.scored += other.scored;
        self.failed += other.failed;
        self.skipped_existing += other.skipped_existing;
        self.unreadable += other.unreadable;
        self.write_failed += other.write_failed;
    }
}

impl From<&RepairError> for ScoreErrorKind {
    fn from(e: &RepairError) -> Self {
        match e {
            RepairError::NoJsonFound => ScoreErrorKind::NoJsonFound,
            RepairError::JsonRepairFailed { .. } => ScoreErrorKind::JsonRepairFailed,
        }
    }
}

/// Read the `body` text of a persisted article.
pub async fn read_article_body(path: &Path) -> Result<String, Box<dyn Error>> {
    let text = fs::read_to_string(path).await?;
    let article: Value = serde_json::from_str(&text)?;
    match article.get("body") {
        Some(Value::String(body)) => Ok(body.clone()),
        _ => Err("article has no body".into()),
    }
}

/// Ask `model` once and turn the answer into something to persist.
///
/// Never fails: request and parse errors become error records.
pub async fn score_prompt<C: AskAsync>(client: &C, model: &str, prompt: &str) -> ScoreOutcome {
    let raw = match client.ask(model, prompt).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(%model, error = %e, "Model call failed; recording error");
            return ScoreOutcome::Failed(ModelScoreRecord::failure(
                ScoreErrorKind::RequestFailed,
                None,
                e.to_string(),
            ));
        }
    };

    match parse_model_output(&raw) {
        Ok(value) => ScoreOutcome::Scored(value),
        Err(e) => {
            warn!(
                %model,
                error = %e,
                response_preview = %truncate_for_log(&raw, 300),
                "Model returned non-conforming JSON; recording error"
            );
            ScoreOutcome::Failed(ModelScoreRecord::failure((&e).into(), Some(raw), e.to_string()))
        }
    }
}

/// Score every article in `articles` for one model and run.
#[instrument(level = "info", skip_all, fields(%model, run))]
pub async fn score_run<C: AskAsync>(
    client: &C,
    settings: &Settings,
    articles: &[PathBuf],
    model: &str,
    run: u32,
) -> Result<RunSummary, Box<dyn Error>> {
    let output_dir = settings.model_output_dir(model, run);
    fs::create_dir_all(&output_dir).await?;

    let mut summary = RunSummary::default();
    for article_path in articles {
        let stem = file_stem(article_path);
        let output_file = output_dir.join(format!("{stem}.json"));

        if fs::try_exists(&output_file).await? {
            debug!(path = %output_file.display(), "Skipping existing file");
            summary.skipped_existing += 1;
            continue;
        }

        let body = match read_article_body(article_path).await {
            Ok(body) => body,
            Err(e) => {
                error!(path = %article_path.display(), error = %e, "Cannot read article; skipping");
                summary.unreadable += 1;
                continue;
            }
        };

        info!(article = %stem, "Processing article");
        let prompt = settings.render_prompt(&body);
        let outcome = score_prompt(client, model, &prompt).await;

        if let Err(e) = write_json(&output_file, &outcome).await {
            error!(path = %output_file.display(), error = %e, "Failed to write score");
            summary.write_failed += 1;
            continue;
        }
        match &outcome {
            ScoreOutcome::Scored(_) => summary.scored += 1,
            ScoreOutcome::Failed(_) => summary.failed += 1,
        }
    }

    info!(
        scored = summary.scored,
        failed = summary.failed,
        skipped_existing = summary.skipped_existing,
        unreadable = summary.unreadable,
        write_failed = summary.write_failed,
        "Run complete"
    );
    Ok(summary)
}

/// Score all articles for every configured model and run.
#[instrument(level = "info", skip_all)]
pub async fn score_folder<C: AskAsync>(
    client: &C,
    settings: &Settings,
) -> Result<RunSummary, Box<dyn Error>> {
    let articles = list_json_files(&settings.webdata_dir()).await?;
    info!(count = articles.len(), models = settings.models.len(), runs = settings.runs, "Starting scoring");

    let mut total = RunSummary::default();
    for model in &settings.models {
        for run in 1..=settings.runs {
            info!(run, %model, "Run {} for model {}", run, model);
            let summary = score_run(client, settings, &articles, model, run).await?;
            total.add(summary);
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AskError;
    use crate::settings::SettingsFile;
    use serde_json::json;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Replays canned answers and records every prompt it receives.
    struct ScriptedModel {
        answer: Result<String, u16>,
        calls: RefCell<Vec<(String, String)>>,
    }

    impl ScriptedModel {
        fn answering(answer: &str) -> Self {
            Self {
                answer: Ok(answer.to_string()),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                answer: Err(status),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl AskAsync for ScriptedModel {
        async fn ask(&self, model: &str, prompt: &str) -> Result<String, AskError> {
            self.calls
                .borrow_mut()
                .push((model.to_string(), prompt.to_string()));
            match &self.answer {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(AskError::Status(*status)),
            }
        }
    }

    fn project(models: &[&str], runs: u32) -> (TempDir, Settings) {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        std::fs::create_dir_all(app.join("webdata")).unwrap();
        std::fs::write(app.join("prompt.md"), "Score:\n{{ARTICLE_TEXT}}").unwrap();

        let file = SettingsFile {
            runs,
            models: models.iter().map(|m| m.to_string()).collect(),
            ..SettingsFile::default()
        };
        let settings = Settings::from_file(file, dir.path().to_path_buf()).unwrap();
        (dir, settings)
    }

    fn add_article(settings: &Settings, stem: &str, body: Option<&str>) {
        let article = json!({"title": stem, "body": body, "date_accessed": "2025-05-06 10:00:00"});
        std::fs::write(
            settings.webdata_dir().join(format!("{stem}.json")),
            article.to_string(),
        )
        .unwrap();
    }

    fn read_output(settings: &Settings, model: &str, run: u32, stem: &str) -> Value {
        let path = settings.model_output_dir(model, run).join(format!("{stem}.json"));
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_scores_every_article_model_and_run() {
        let (_dir, settings) = project(&["gemma3:4b", "phi3:mini"], 2);
        add_article(&settings, "101", Some("Premier."));
        add_article(&settings, "102", Some("Second."));

        let model = ScriptedModel::answering("```json\n{\"subject_bias\": -00.2, \"confidence\": 0.7}\n```");
        let total = score_folder(&model, &settings).await.unwrap();

        assert_eq!(total.scored, 8);
        assert_eq!(model.call_count(), 8);
        assert_eq!(
            read_output(&settings, "gemma3:4b", 2, "102"),
            json!({"subject_bias": -0.2, "confidence": 0.7})
        );
        assert!(settings.final_dir().join("gemma3_4b").join("1").join("101.json").exists());

        let calls = model.calls.borrow();
        assert_eq!(calls[0], ("gemma3:4b".to_string(), "Score:\nPremier.".to_string()));
        assert_eq!(calls[1].1, "Score:\nSecond.");
        assert_eq!(calls[4].0, "phi3:mini");
    }

    #[tokio::test]
    async fn test_existing_output_is_not_rescored() {
        let (_dir, settings) = project(&["gemma3:4b"], 1);
        add_article(&settings, "101", Some("Premier."));

        let out_dir = settings.model_output_dir("gemma3:4b", 1);
        std::fs::create_dir_all(&out_dir).unwrap();
        std::fs::write(out_dir.join("101.json"), r#"{"subject_bias": 0.5}"#).unwrap();

        let model = ScriptedModel::answering(r#"{"subject_bias": -1}"#);
        let total = score_folder(&model, &settings).await.unwrap();

        assert_eq!(model.call_count(), 0);
        assert_eq!(total.skipped_existing, 1);
        assert_eq!(read_output(&settings, "gemma3:4b", 1, "101"), json!({"subject_bias": 0.5}));
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_recorded_with_raw_text() {
        let (_dir, settings) = project(&["qwen3:4b"], 1);
        add_article(&settings, "101", Some("Premier."));

        let model = ScriptedModel::answering("Je ne peux pas évaluer cet article.");
        let total = score_folder(&model, &settings).await.unwrap();

        assert_eq!(total.failed, 1);
        let out = read_output(&settings, "qwen3:4b", 1, "101");
        assert_eq!(out["error"], "no_json_found");
        assert_eq!(out["raw"], "Je ne peux pas évaluer cet article.");
        assert!(out["details"].as_str().unwrap().contains("no JSON"));
    }

    #[tokio::test]
    async fn test_request_failure_is_recorded() {
        let (_dir, settings) = project(&["phi3:mini"], 1);
        add_article(&settings, "101", Some("Premier."));

        let model = ScriptedModel::failing(500);
        score_folder(&model, &settings).await.unwrap();

        let out = read_output(&settings, "phi3:mini", 1, "101");
        assert_eq!(out["error"], "request_failed");
        assert!(out.get("raw").is_none());
        assert!(out["details"].as_str().unwrap().contains("500"));

        let record: ModelScoreRecord = serde_json::from_value(out).unwrap();
        assert_eq!(record.error, Some(ScoreErrorKind::RequestFailed));
    }

    #[tokio::test]
    async fn test_article_without_body_is_skipped_without_output() {
        let (_dir, settings) = project(&["phi3:mini"], 1);
        add_article(&settings, "101", None);
        add_article(&settings, "102", Some("Second."));

        let model = ScriptedModel::answering(r#"{"subject_bias": 0}"#);
        let total = score_folder(&model, &settings).await.unwrap();

        assert_eq!(total.unreadable, 1);
        assert_eq!(total.scored, 1);
        assert_eq!(model.call_count(), 1);
        assert!(!settings.model_output_dir("phi3:mini", 1).join("101.json").exists());
    }

    /// Answers normally but removes the run's output directory first, so the
    /// score cannot be written.
    struct DirRemovingModel {
        dir: PathBuf,
    }

    impl AskAsync for DirRemovingModel {
        async fn ask(&self, _model: &str, _prompt: &str) -> Result<String, AskError> {
            std::fs::remove_dir_all(&self.dir).unwrap();
            Ok(r#"{"subject_bias": 0.1}"#.to_string())
        }
    }

    #[tokio::test]
    async fn test_unwritable_score_is_not_counted_as_done() {
        let (_dir, settings) = project(&["gemma3:4b"], 1);
        add_article(&settings, "101", Some("Premier."));
        let articles = list_json_files(&settings.webdata_dir()).await.unwrap();

        let model = DirRemovingModel {
            dir: settings.model_output_dir("gemma3:4b", 1),
        };
        let summary = score_run(&model, &settings, &articles, "gemma3:4b", 1).await.unwrap();

        assert_eq!(summary.write_failed, 1);
        assert_eq!(summary.scored, 0);
        assert_eq!(summary.failed, 0);
        assert!(!settings.model_output_dir("gemma3:4b", 1).join("101.json").exists());
    }

    #[tokio::test]
    async fn test_unrepairable_answer_maps_to_repair_failed() {
        let model = ScriptedModel::answering("{\"subject_bias\": , }");
        match score_prompt(&model, "gemma2:latest", "prompt").await {
            ScoreOutcome::Failed(record) => {
                assert_eq!(record.error, Some(ScoreErrorKind::JsonRepairFailed));
                assert_eq!(record.raw.as_deref(), Some("{\"subject_bias\": , }"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
