//! Answer generation through the local language-model runtime.
//!
//! The Ollama client posts a fully assembled prompt to `/api/generate` with streaming disabled
//! and returns the model's text untouched.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced while asking the generator for an answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Runtime could not be reached or does not serve the endpoint.
    #[error("Answer generator unavailable: {0}")]
    Unavailable(String),
    /// Runtime returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Runtime response could not be parsed.
    #[error("Malformed generator response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by answer generators.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produce a free-text answer for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Build the configured answer generator.
pub fn get_answer_generator(
    config: &Config,
) -> Result<Box<dyn AnswerGenerator + Send + Sync>, GenerationError> {
    Ok(Box::new(OllamaGenerator::new(
        &config.ollama_url,
        &config.generation_model,
    )?))
}

/// Answer generator backed by the Ollama `/api/generate` endpoint.
pub struct OllamaGenerator {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    /// Construct a generator for the given runtime URL and model.
    pub fn new(base_url: &str, model: &str) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("docqa/generate")
            .build()
            .map_err(|error| GenerationError::Unavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Requesting answer");
        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::Unavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }
}
