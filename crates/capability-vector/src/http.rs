//! An HTTP-based `EmbeddingProvider` against an OpenAI-compatible `/embeddings` endpoint
//! (SPEC_FULL.md §0: "an HTTP-based provider, for testability, since the embedding model itself
//! is a non-goal"). Gated behind the `http-provider` feature so a pure in-process build never
//! pulls in `reqwest`.

use async_trait::async_trait;
use capability_core::error::{CoreError, Result};
use capability_core::traits::EmbeddingProvider;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    pub model: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for HttpEmbeddingConfig {
    fn default() -> Self {
        Self {
            model: std::env::var("CAPCORE_EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            api_base: std::env::var("CAPCORE_EMBEDDING_API_BASE").unwrap_or_else(|_| "http://localhost:8080/v1".to_string()),
            api_key: std::env::var("CAPCORE_EMBEDDING_API_KEY").ok(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingProvider {
    client: Client,
    config: HttpEmbeddingConfig,
}

impl HttpEmbeddingProvider {
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoreError::Embedding(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    /// Failure is a hard error (spec §6 "Failure is surfaced as a hard error with a structured
    /// log entry"), retried up to `max_retries` times for transient failures before giving up.
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.config.api_base.trim_end_matches('/'));
        let body = EmbeddingRequest {
            model: &self.config.model,
            input: text,
        };

        let mut last_error = String::new();
        for attempt in 0..=self.config.max_retries {
            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let parsed: EmbeddingResponse = response
                        .json()
                        .await
                        .map_err(|e| CoreError::Embedding(format!("invalid embedding response: {e}")))?;
                    return parsed
                        .data
                        .into_iter()
                        .next()
                        .map(|d| d.embedding)
                        .ok_or_else(|| CoreError::Embedding("embedding response had no data".to_string()));
                }
                Ok(response) => {
                    last_error = format!("http {}", response.status());
                    warn!(attempt, status = %last_error, "embedding request failed, retrying");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(attempt, error = %last_error, "embedding request errored, retrying");
                }
            }
        }
        debug!(model = %self.config.model, "embedding provider exhausted retries");
        Err(CoreError::Embedding(format!(
            "embedding request failed after {} attempts: {last_error}",
            self.config.max_retries + 1
        )))
    }
}
