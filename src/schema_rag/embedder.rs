//! Embedding providers
//!
//! The retriever and index builder only see the `EmbeddingProvider` trait; the
//! HTTP clients below back it with an Ollama server or an OpenAI-compatible
//! `/embeddings` endpoint.

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::{RagError, Result};
use crate::schema_rag::vector_store::Embedding;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Name of the model producing the vectors; stored alongside the index.
    fn model_name(&self) -> &str;

    /// Embed every text, returning exactly one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(RagError::Embedding(
                "provider returned a different number of vectors than requested".to_string(),
            )),
        }
    }
}

/// Build the provider named by the configuration.
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| RagError::Embedding(format!("failed to build HTTP client: {}", e)))?;

    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::Ollama => Arc::new(OllamaEmbedder::with_client(
            client,
            config.endpoint.clone(),
            config.model_name.clone(),
        )),
        ProviderKind::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                RagError::Config("an API key is required for the openai provider".to_string())
            })?;
            Arc::new(OpenAiEmbedder::with_client(
                client,
                api_key,
                config.endpoint.clone(),
                config.model_name.clone(),
            ))
        }
    };
    Ok(provider)
}

/// Ollama `/api/embeddings` client (one request per text).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String, // e.g. "nomic-embed-text"
}

impl OllamaEmbedder {
    pub fn new(base_url: String, model: String) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, model)
    }

    pub fn with_client(client: reqwest::Client, base_url: String, model: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Embedding(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            RagError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        parse_vector(response_json.get("embedding"))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await?);
        }
        debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(vectors)
    }
}

/// OpenAI-compatible `/embeddings` client (one request per batch).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String, // e.g. "text-embedding-3-small"
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_key, base_url, model)
    }

    pub fn with_client(
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        model: String,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Embedding(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            RagError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        parse_openai_data(&response_json, texts.len())
    }
}

fn parse_vector(value: Option<&serde_json::Value>) -> Result<Embedding> {
    let values = value
        .and_then(|e| e.as_array())
        .ok_or_else(|| RagError::Embedding("No embedding vector in response".to_string()))?;

    let embedding = values
        .iter()
        .map(|v| -> Result<f32> {
            let f = v
                .as_f64()
                .ok_or_else(|| RagError::Embedding("Non-numeric value in embedding".to_string()))?
                as f32;
            if f.is_finite() {
                Ok(f)
            } else {
                Err(RagError::Embedding(format!("Non-finite value {} in embedding", v)))
            }
        })
        .collect::<Result<Embedding>>()?;

    if embedding.is_empty() {
        return Err(RagError::Embedding("Empty embedding vector in response".to_string()));
    }
    Ok(embedding)
}

/// `data[i].embedding`, reordered by `data[i].index` when present.
fn parse_openai_data(response: &serde_json::Value, expected: usize) -> Result<Vec<Embedding>> {
    let data = response
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::Embedding("No embedding data in response".to_string()))?;

    if data.len() != expected {
        return Err(RagError::Embedding(format!(
            "Expected {} embeddings, provider returned {}",
            expected,
            data.len()
        )));
    }

    let mut slots: Vec<Option<Embedding>> = vec![None; expected];
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let slot = slots.get_mut(index).ok_or_else(|| {
            RagError::Embedding(format!("Embedding index {} out of range", index))
        })?;
        *slot = Some(parse_vector(item.get("embedding"))?);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or_else(|| RagError::Embedding(format!("Missing embedding for input {}", i)))
        })
        .collect()
}
