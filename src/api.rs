//! Completion calls against a local Ollama-compatible endpoint.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining one prompt → completion round trip
//! - [`OllamaClient`]: `POST /api/generate` implementation over `reqwest`
//!
//! Each call is a single attempt. A failure is returned to the scorer,
//! which records it and moves on.

use crate::models::GenerationOptions;
use crate::settings::Settings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum AskError {
    #[error("model request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("model endpoint returned HTTP {0}")]
    Status(u16),

    #[error("could not decode model response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Trait for model interaction.
///
/// Implementors send a fully rendered prompt to a named model and return
/// the raw completion text.
pub trait AskAsync {
    async fn ask(&self, model: &str, prompt: &str) -> Result<String, AskError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerationOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Non-streaming client for Ollama's generate endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    url: String,
    options: GenerationOptions,
}

impl OllamaClient {
    pub fn new(settings: &Settings) -> Result<Self, AskError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(AskError::Request)?;
        Ok(Self {
            http,
            url: settings.ollama_url.clone(),
            options: settings.options.clone(),
        })
    }
}

impl AskAsync for OllamaClient {
    #[instrument(level = "info", skip_all, fields(%model))]
    async fn ask(&self, model: &str, prompt: &str) -> Result<String, AskError> {
        let t0 = Instant::now();
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: &self.options,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "API call failed");
                AskError::Request(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Model endpoint returned an error status");
            return Err(AskError::Status(status.as_u16()));
        }

        let body: GenerateResponse = response.json().await.map_err(AskError::Decode)?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = body.response.len(),
            "Model answered"
        );
        Ok(body.response)
    }
}
