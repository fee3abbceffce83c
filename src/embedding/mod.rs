//! Embedding providers that turn chunk and question text into vectors.
//!
//! Ollama and OpenAI-compatible adapters issue HTTP requests directly with `reqwest`; the
//! hash-based client is deterministic and needs no external service.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached or could not be constructed.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Returned embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured on the server.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build an embedding client suitable for the supplied configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient + Send + Sync>, EmbeddingClientError> {
    let dimension = config.embedding_dimension;
    let client: Box<dyn EmbeddingClient + Send + Sync> = match config.embedding_provider {
        EmbeddingProvider::Hash => Box::new(HashedEmbeddingClient::new(dimension)),
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            &config.ollama_url,
            &config.embedding_model,
            dimension,
        )?),
        EmbeddingProvider::OpenAI => Box::new(OpenAiEmbeddingClient::new(
            &config.openai_base_url,
            config.openai_api_key.clone(),
            &config.embedding_model,
            dimension,
        )?),
    };
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension,
        "Embedding client initialized"
    );
    Ok(client)
}

/// Deterministic embedding client that folds text bytes into a normalized vector.
pub struct HashedEmbeddingClient {
    dimension: usize,
}

impl HashedEmbeddingClient {
    /// Construct a client producing vectors of the given dimension.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashedEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Embedding client backed by the Ollama `/api/embed` endpoint.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbeddingClient {
    /// Construct a client for the given runtime URL and model.
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("docqa/embedding")
            .build()
            .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EmbeddingClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        check_vectors(body.embeddings, expected, self.dimension)
    }
}

/// Embedding client for OpenAI-compatible `/v1/embeddings` endpoints.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingClient {
    /// Construct a client for the given API base URL, key, and model.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        dimension: usize,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("docqa/embedding")
            .build()
            .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            dimension,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let mut request = self
            .http
            .post(format!("{}/v1/embeddings", self.base_url))
            .json(&json!({
                "model": self.model,
                "input": texts,
            }));
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|error| {
            EmbeddingClientError::ProviderUnavailable(format!(
                "failed to reach embeddings API at {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "embeddings API returned {status}: {body}"
            )));
        }

        let mut body: OpenAiEmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode embeddings response: {error}"
            ))
        })?;
        body.data.sort_by_key(|item| item.index);
        let vectors = body.data.into_iter().map(|item| item.embedding).collect();

        check_vectors(vectors, expected, self.dimension)
    }
}

fn check_vectors(
    vectors: Vec<Vec<f32>>,
    expected_count: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected_count} embeddings, got {}",
            vectors.len()
        )));
    }
    if let Some(vector) = vectors.iter().find(|vector| vector.len() != dimension) {
        return Err(EmbeddingClientError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn hashed_client_is_deterministic_and_normalized() {
        let client = HashedEmbeddingClient::new(16);
        let vectors = client
            .generate_embeddings(vec!["alpha".into(), "alpha".into(), "".into()])
            .await
            .expect("embeddings");

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[1]);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(vectors[2].iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn ollama_client_posts_batch_and_decodes_vectors() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body_partial(r#"{"model": "all-minilm"}"#);
                then.status(200).json_body(json!({
                    "model": "all-minilm",
                    "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
                }));
            })
            .await;

        let client = OllamaEmbeddingClient::new(&server.base_url(), "all-minilm", 3)
            .expect("client");
        let vectors = client
            .generate_embeddings(vec!["one".into(), "two".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn ollama_client_rejects_wrong_dimension() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .json_body(json!({ "embeddings": [[0.1, 0.2]] }));
            })
            .await;

        let client = OllamaEmbeddingClient::new(&server.base_url(), "all-minilm", 3)
            .expect("client");
        let error = client
            .generate_embeddings(vec!["one".into()])
            .await
            .expect_err("dimension mismatch");

        assert!(matches!(
            error,
            EmbeddingClientError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn openai_client_orders_by_index_and_sends_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer secret");
                then.status(200).json_body(json!({
                    "data": [
                        { "embedding": [1.0, 1.0], "index": 1 },
                        { "embedding": [0.0, 0.0], "index": 0 }
                    ]
                }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(
            &server.base_url(),
            Some("secret".into()),
            "text-embedding-3-small",
            2,
        )
        .expect("client");
        let vectors = client
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.0, 0.0], vec![1.0, 1.0]]);
    }

    #[tokio::test]
    async fn unreachable_ollama_reports_unavailable() {
        let client =
            OllamaEmbeddingClient::new("http://127.0.0.1:9", "all-minilm", 3).expect("client");
        let error = client
            .generate_embeddings(vec!["one".into()])
            .await
            .expect_err("connection refused");
        assert!(matches!(error, EmbeddingClientError::ProviderUnavailable(_)));
    }
}
