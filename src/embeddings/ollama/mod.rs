
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{Embedder, Embedding};
use crate::config::OllamaConfig;
use crate::{KbError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// HTTP client for the Ollama embedding API
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config.ollama_url()?;
        Self::with_base_url(
            base_url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Build a client against an explicit base URL
    #[inline]
    pub fn with_base_url(base_url: Url, model: &str, timeout: Duration) -> Result<Self> {
        let timeout = if timeout.is_zero() {
            Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)
        } else {
            timeout
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KbError::EmbeddingProvider(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            model: model.to_string(),
            client,
        })
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Test connection to Ollama server and verify model availability
    #[inline]
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().await?;

        // Ollama reports untagged pulls as "<name>:latest"
        let available = models
            .iter()
            .any(|m| m.name == self.model || m.name == format!("{}:latest", self.model));

        if available {
            info!(
                "Health check passed for Ollama server at {} with model {}",
                self.base_url, self.model
            );
            Ok(())
        } else {
            let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, names
            );
            Err(KbError::EmbeddingProvider(format!(
                "Model '{}' is not available. Available models: {:?}",
                self.model, names
            )))
        }
    }

    /// List all models the server has pulled
    #[inline]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;
        debug!("Fetching available models from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error("list models", &e))?;
        let response = check_status(response).await?;

        let models: ModelsResponse = response.json().await.map_err(|e| {
            KbError::EmbeddingProvider(format!("Failed to parse models response: {}", e))
        })?;

        debug!("Found {} models", models.models.len());
        Ok(models.models)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| KbError::EmbeddingProvider(format!("Failed to build URL {}: {}", path, e)))
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = self.endpoint("/api/embed")?;
        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("generate embedding", &e))?;
        let response = check_status(response).await?;

        let body: EmbedResponse = response.json().await.map_err(|e| {
            KbError::EmbeddingProvider(format!("Failed to parse embedding response: {}", e))
        })?;

        let embedding = body.embeddings.into_iter().next().ok_or_else(|| {
            KbError::EmbeddingProvider("Provider returned no embeddings".to_string())
        })?;

        if embedding.is_empty() {
            return Err(KbError::EmbeddingProvider(
                "Provider returned an empty embedding".to_string(),
            ));
        }

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn transport_error(operation: &str, error: &reqwest::Error) -> KbError {
    if error.is_timeout() {
        KbError::EmbeddingProvider(format!("Timed out trying to {}", operation))
    } else {
        KbError::EmbeddingProvider(format!("Failed to {}: {}", operation, error))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);

    warn!("Ollama returned HTTP {}: {}", status, message);
    Err(KbError::EmbeddingProvider(format!(
        "HTTP {}: {}",
        status.as_u16(),
        message
    )))
}
