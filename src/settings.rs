//! Runtime configuration.
//!
//! [`Settings`] is built once in `main` from three layers, later ones
//! winning: built-in defaults, an optional YAML file, and command-line
//! overrides. It is then passed by reference to every stage; nothing reads
//! configuration from anywhere else.
//!
//! # Project layout
//!
//! ```text
//! <root>/
//! └── app/
//!     ├── input_files/some_rts_links.csv   # one URL per line
//!     ├── prompt.md                        # contains {{ARTICLE_TEXT}}
//!     ├── webdata/                         # one ArticleRecord per file
//!     └── final/<model>/<run>/             # one score per article
//! ```
//!
//! # Example config
//!
//! ```yaml
//! runs: 3
//! ollama_url: http://gpu-box:11434/api/generate
//! models: ["gemma3:4b", "qwen3:4b"]
//! options:
//!   temperature: 0.2
//!   num_predict: 400
//! ```

use crate::models::GenerationOptions;
use crate::utils::ensure_writable_dir;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_PLACEHOLDER: &str = "{{ARTICLE_TEXT}}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("could not find project root (no 'app/' dir) from {0}")]
    RootNotFound(PathBuf),

    #[error("invalid project root: {0}")]
    InvalidRoot(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("prompt template {path} does not contain the placeholder {placeholder}")]
    MissingPlaceholder { path: PathBuf, placeholder: String },

    #[error("invalid setting: {0}")]
    Invalid(&'static str),

    #[error("directory {path} is not usable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The YAML-facing shape of the configuration; every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub root: Option<PathBuf>,
    pub runs: u32,
    pub timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub ollama_url: String,
    pub models: Vec<String>,
    pub options: GenerationOptions,
    pub placeholder: String,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            root: None,
            runs: 6,
            timeout_secs: 200,
            fetch_timeout_secs: 15,
            ollama_url: "http://127.0.0.1:11434/api/generate".to_string(),
            models: vec![
                "llama3.2:latest".to_string(),
                "gemma2:latest".to_string(),
                "phi3:mini".to_string(),
                "qwen2.5:3b-instruct".to_string(),
                "gemma3:4b".to_string(),
            ],
            options: GenerationOptions::default(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

impl SettingsFile {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values given on the command line; `None`/empty means "keep the file's".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub runs: Option<u32>,
    pub models: Vec<String>,
    pub ollama_url: Option<String>,
}

impl Overrides {
    fn apply(self, file: &mut SettingsFile) {
        if let Some(root) = self.root {
            file.root = Some(root);
        }
        if let Some(runs) = self.runs {
            file.runs = runs;
        }
        if !self.models.is_empty() {
            file.models = self.models;
        }
        if let Some(url) = self.ollama_url {
            file.ollama_url = url;
        }
    }
}

/// Validated, immutable configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory containing `app/`.
    pub root: PathBuf,
    /// Number of scoring passes per model.
    pub runs: u32,
    /// Model completion timeout.
    pub timeout: Duration,
    /// Article fetch timeout.
    pub fetch_timeout: Duration,
    pub ollama_url: String,
    pub models: Vec<String>,
    pub options: GenerationOptions,
    /// Token in the prompt template replaced by the article body.
    pub placeholder: String,
    /// Contents of `app/prompt.md`.
    pub prompt_template: String,
}

impl Settings {
    /// Layer defaults, the optional YAML file and CLI overrides, then
    /// validate. Without an explicit root, the nearest ancestor of the
    /// current directory that contains `app/` is used.
    pub fn load(config: Option<&Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        let mut file = match config {
            Some(path) => {
                info!(path = %path.display(), "Loading config file");
                SettingsFile::from_yaml_file(path)?
            }
            None => SettingsFile::default(),
        };
        overrides.apply(&mut file);

        let root = match file.root.take() {
            Some(root) => root,
            None => {
                let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
                find_project_root(&cwd)?
            }
        };

        Self::from_file(file, root)
    }

    /// Validate a settings file against a concrete project root and read the
    /// prompt template.
    pub fn from_file(file: SettingsFile, root: PathBuf) -> Result<Self, ConfigError> {
        if !root.join("app").is_dir() {
            return Err(ConfigError::InvalidRoot(root));
        }
        if file.runs == 0 {
            return Err(ConfigError::Invalid("runs must be at least 1"));
        }
        if file.models.is_empty() {
            return Err(ConfigError::Invalid("at least one model is required"));
        }
        if file.placeholder.is_empty() {
            return Err(ConfigError::Invalid("placeholder must not be empty"));
        }

        let template_path = prompt_template_path(&root);
        let prompt_template =
            std::fs::read_to_string(&template_path).map_err(|source| ConfigError::Read {
                path: template_path.clone(),
                source,
            })?;
        if !prompt_template.contains(&file.placeholder) {
            return Err(ConfigError::MissingPlaceholder {
                path: template_path,
                placeholder: file.placeholder,
            });
        }

        debug!(root = %root.display(), runs = file.runs, models = ?file.models, "Settings resolved");
        Ok(Self {
            root,
            runs: file.runs,
            timeout: Duration::from_secs(file.timeout_secs),
            fetch_timeout: Duration::from_secs(file.fetch_timeout_secs),
            ollama_url: file.ollama_url,
            models: file.models,
            options: file.options,
            placeholder: file.placeholder,
            prompt_template,
        })
    }

    pub fn app_dir(&self) -> PathBuf {
        self.root.join("app")
    }

    pub fn input_file(&self) -> PathBuf {
        self.app_dir().join("input_files").join("some_rts_links.csv")
    }

    pub fn webdata_dir(&self) -> PathBuf {
        self.app_dir().join("webdata")
    }

    pub fn final_dir(&self) -> PathBuf {
        self.app_dir().join("final")
    }

    pub fn prompt_template_path(&self) -> PathBuf {
        prompt_template_path(&self.root)
    }

    /// `final/<model with ':' → '_'>/<run>`.
    pub fn model_output_dir(&self, model: &str, run: u32) -> PathBuf {
        self.final_dir()
            .join(model.replace(':', "_"))
            .join(run.to_string())
    }

    /// The prompt template with the placeholder replaced by `body`.
    pub fn render_prompt(&self, body: &str) -> String {
        self.prompt_template.replace(&self.placeholder, body)
    }

    /// Create the data directories and check they can be written.
    pub async fn prepare_directories(&self) -> Result<(), ConfigError> {
        for dir in [self.webdata_dir(), self.final_dir()] {
            ensure_writable_dir(&dir)
                .await
                .map_err(|source| ConfigError::Directory { path: dir.clone(), source })?;
        }
        Ok(())
    }
}

fn prompt_template_path(root: &Path) -> PathBuf {
    root.join("app").join("prompt.md")
}

/// The first of `start` and its ancestors that contains an `app/` directory.
pub fn find_project_root(start: &Path) -> Result<PathBuf, ConfigError> {
    start
        .ancestors()
        .find(|dir| dir.join("app").is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(|| ConfigError::RootNotFound(start.to_path_buf()))
}
