//! # News Bias
//!
//! A pipeline that scrapes news articles, asks local LLMs to score each one
//! for political bias, and exports the scores for analysis.
//!
//! ## Usage
//!
//! ```sh
//! news_bias extract     # URLs -> app/webdata/*.json
//! news_bias score       # app/webdata -> app/final/<model>/<run>/*.json
//! news_bias aggregate   # app/final + app/webdata -> CSV
//! news_bias all
//! ```
//!
//! ## Architecture
//!
//! The application follows a sequential pipeline:
//! 1. **Extraction**: Fetch each input URL and extract an article record
//! 2. **Scoring**: Render each article body into the prompt, call every
//!    model for every run, and repair the JSON it answers with
//! 3. **Aggregation**: Flatten scores and articles into CSV datasets
//!
//! Each stage can be re-run at any time: scoring skips every
//! (model, run, article) that already has an output file.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregate;
mod api;
mod cli;
mod models;
mod outputs;
mod repair;
mod scoring;
mod scrapers;
mod settings;
mod utils;

use api::OllamaClient;
use cli::{AggregateArgs, Cli, Command};
use outputs::{csv, json};
use settings::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_bias starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let settings = match Settings::load(args.config.as_deref(), args.overrides()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        root = %settings.root.display(),
        runs = settings.runs,
        models = ?settings.models,
        template = %settings.prompt_template_path().display(),
        "Loaded settings"
    );

    if let Err(e) = settings.prepare_directories().await {
        error!(error = %e, "Data directories are not usable (fix perms or choose a different root)");
        return Err(e.into());
    }

    match &args.command {
        Command::Extract => run_extract(&settings).await?,
        Command::Score => run_score(&settings).await?,
        Command::Aggregate(out) => run_aggregate(&settings, out).await?,
        Command::All(out) => {
            run_extract(&settings).await?;
            run_score(&settings).await?;
            run_aggregate(&settings, out).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// Scrape every input URL and persist the records.
#[instrument(level = "info", skip_all)]
async fn run_extract(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let urls = scrapers::article::read_input_urls(&settings.input_file()).await?;
    let client = scrapers::article::build_client(settings)?;

    let articles = scrapers::article::fetch_articles(&client, urls).await;
    let written = json::write_articles(&articles, &settings.webdata_dir()).await;

    info!(extracted = articles.len(), written, "Extraction complete");
    Ok(())
}

/// Score every persisted article with every configured model and run.
#[instrument(level = "info", skip_all)]
async fn run_score(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let client = OllamaClient::new(settings)?;
    let summary = scoring::score_folder(&client, settings).await?;

    info!(
        scored = summary.scored,
        failed = summary.failed,
        skipped_existing = summary.skipped_existing,
        unreadable = summary.unreadable,
        write_failed = summary.write_failed,
        "Scoring complete"
    );
    Ok(())
}

/// Export the bias results and the article dataset.
#[instrument(level = "info", skip_all)]
async fn run_aggregate(settings: &Settings, out: &AggregateArgs) -> Result<(), Box<dyn Error>> {
    let results = aggregate::prepare_results_frame(settings).await?;
    write_dataset(&results, &out.bias_csv).await?;

    let webdata = aggregate::prepare_webdata_dataset(&settings.webdata_dir()).await?;
    write_dataset(&webdata, &out.webdata_csv).await?;
    Ok(())
}

async fn write_dataset<R: csv::CsvRow>(rows: &[R], path: &Path) -> Result<(), Box<dyn Error>> {
    if let Err(e) = csv::write_csv(rows, path).await {
        error!(path = %path.display(), error = %e, "Failed to write CSV");
        return Err(e.into());
    }
    Ok(())
}
