//! OpenAI-compatible embedding backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dam_core::{defaults, EmbeddingBackend, Error, Result, Vector};

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub base_url: String,
    /// Optional for local endpoints.
    pub api_key: Option<String>,
    pub embed_model: String,
    pub embed_dimension: usize,
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            embed_model: defaults::EMBED_MODEL.to_string(),
            embed_dimension: defaults::EMBED_DIMENSION,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl OpenAIConfig {
    /// Read `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_EMBED_MODEL` and
    /// `OPENAI_TIMEOUT`. The dimension is fixed by the document schema.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            embed_model: std::env::var("OPENAI_EMBED_MODEL")
                .unwrap_or_else(|_| defaults::EMBED_MODEL.to_string()),
            embed_dimension: defaults::EMBED_DIMENSION,
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding_format: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// OpenAI-compatible embedding backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            model = %config.embed_model,
            "Initializing embedding backend"
        );

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(
            count = texts.len(),
            model = %self.config.embed_model,
            "Embedding texts"
        );

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let mut req = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.config.embed_model,
            input: texts,
            encoding_format: Some("float"),
        });
        if let Some(ref api_key) = self.config.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Embedding(format!(
                "Provider returned {}: {}",
                status, message
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        let mut data = result.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| Vector::from(d.embedding)).collect())
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpenAIConfig::default();
        assert_eq!(config.base_url, DEFAULT_OPENAI_URL);
        assert_eq!(config.embed_model, "text-embedding-3-small");
        assert_eq!(config.embed_dimension, 1536);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_accessors() {
        let backend = OpenAIBackend::new(OpenAIConfig {
            embed_model: "custom-embed".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(backend.dimension(), 1536);
        assert_eq!(backend.model_name(), "custom-embed");
    }

    #[test]
    fn test_request_serialization() {
        let input = vec!["hello".to_string()];
        let json = serde_json::to_value(EmbeddingRequest {
            model: "m",
            input: &input,
            encoding_format: None,
        })
        .unwrap();
        assert_eq!(json["input"][0], "hello");
        assert!(json.get("encoding_format").is_none());
    }

    #[tokio::test]
    async fn test_empty_input_short_circuits() {
        let backend = OpenAIBackend::new(OpenAIConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..Default::default()
        })
        .unwrap();
        assert!(backend.embed_texts(&[]).await.unwrap().is_empty());
    }
}
