//! Command-line interface definitions.
//!
//! Global options locate the project and override individual settings; the
//! subcommand picks the pipeline stage to run.

use crate::settings::Overrides;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Scrape the URLs listed in app/input_files/some_rts_links.csv
/// news_bias extract
///
/// # Score with two models, three runs each, against a remote Ollama
/// news_bias -m gemma3:4b -m qwen3:4b --runs 3 --ollama-url http://gpu:11434/api/generate score
///
/// # Everything, with settings from a file
/// news_bias --config settings.yaml all
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Project root (the directory containing `app/`); searched upwards from
    /// the current directory when omitted
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Optional path to a YAML settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of scoring runs per model
    #[arg(long, global = true)]
    pub runs: Option<u32>,

    /// Model to score with (repeatable); replaces the configured list
    #[arg(short = 'm', long = "model", global = true)]
    pub models: Vec<String>,

    /// Ollama generate endpoint
    #[arg(long, env = "OLLAMA_URL", global = true)]
    pub ollama_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Fetch every input URL and write one article file per success
    Extract,
    /// Score every article with every model and run, skipping finished ones
    Score,
    /// Export bias scores and article data as CSV
    Aggregate(AggregateArgs),
    /// Extract, score and aggregate in sequence
    All(AggregateArgs),
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct AggregateArgs {
    /// Output path for the bias results
    #[arg(long, default_value = "bias_data.csv")]
    pub bias_csv: PathBuf,

    /// Output path for the article dataset
    #[arg(long, default_value = "web_data.csv")]
    pub webdata_csv: PathBuf,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            root: self.root.clone(),
            runs: self.runs,
            models: self.models.clone(),
            ollama_url: self.ollama_url.clone(),
        }
    }
}
