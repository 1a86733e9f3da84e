//! Configuration
//!
//! One explicit structure passed into the builder and retriever. Values come
//! from defaults, then `.env` / `AUGUR_RAG_*` environment variables, then CLI
//! flags applied by the binary.

use crate::augur;
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" | "open_ai" | "open-ai" => Ok(ProviderKind::OpenAi),
            other => Err(RagError::Config(format!(
                "unknown embedding provider '{}' (expected ollama or openai)",
                other
            ))),
        }
    }
}

impl ProviderKind {
    pub fn default_endpoint(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "nomic-embed-text",
            ProviderKind::OpenAi => "text-embedding-3-small",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub endpoint: String,
    pub model_name: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Texts sent per provider call while building an index.
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            endpoint: ProviderKind::Ollama.default_endpoint().to_string(),
            model_name: ProviderKind::Ollama.default_model().to_string(),
            api_key: None,
            batch_size: 32,
            timeout_secs: 60,
        }
    }
}

impl EmbeddingConfig {
    /// Switch provider. Endpoint and model follow the new provider's defaults
    /// unless they were already moved off the previous provider's defaults.
    pub fn set_provider(&mut self, provider: ProviderKind) {
        if self.endpoint == self.provider.default_endpoint() {
            self.endpoint = provider.default_endpoint().to_string();
        }
        if self.model_name == self.provider.default_model() {
            self.model_name = provider.default_model().to_string();
        }
        self.provider = provider;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Tables kept by the table-stage k-NN.
    pub table_k: usize,
    /// Columns kept by the column-stage k-NN.
    pub column_k: usize,
    /// Columns shown for a table pulled in only through a join hint.
    pub max_default_join_columns: usize,
    pub schema_prefix: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            table_k: 5,
            column_k: 15,
            max_default_join_columns: 6,
            schema_prefix: augur::SCHEMA_NAME.to_string(),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.table_k == 0 {
            return Err(RagError::Config("table_k must be at least 1".to_string()));
        }
        if self.column_k == 0 {
            return Err(RagError::Config("column_k must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub catalog_path: PathBuf,
    pub index_path: PathBuf,
    /// Join hints file; the Augur defaults apply when unset.
    pub join_graph_path: Option<PathBuf>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            catalog_path: PathBuf::from("augur_schema.json"),
            index_path: PathBuf::from("augur_schema_index.json"),
            join_graph_path: None,
        }
    }
}

impl RagConfig {
    /// Defaults overridden by `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `AUGUR_RAG_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(provider) = lookup("AUGUR_RAG_EMBEDDING_PROVIDER") {
            config.embedding.set_provider(provider.parse::<ProviderKind>()?);
        }
        if let Some(endpoint) = lookup("AUGUR_RAG_EMBEDDING_ENDPOINT") {
            config.embedding.endpoint = endpoint;
        }
        if let Some(model) = lookup("AUGUR_RAG_EMBEDDING_MODEL") {
            config.embedding.model_name = model;
        }
        config.embedding.api_key =
            lookup("AUGUR_RAG_EMBEDDING_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        if let Some(v) = lookup("AUGUR_RAG_EMBEDDING_BATCH_SIZE") {
            config.embedding.batch_size = parse_number("AUGUR_RAG_EMBEDDING_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("AUGUR_RAG_EMBEDDING_TIMEOUT_SECS") {
            config.embedding.timeout_secs = parse_number("AUGUR_RAG_EMBEDDING_TIMEOUT_SECS", &v)?;
        }

        if let Some(v) = lookup("AUGUR_RAG_TABLE_K") {
            config.retrieval.table_k = parse_number("AUGUR_RAG_TABLE_K", &v)?;
        }
        if let Some(v) = lookup("AUGUR_RAG_COLUMN_K") {
            config.retrieval.column_k = parse_number("AUGUR_RAG_COLUMN_K", &v)?;
        }
        if let Some(v) = lookup("AUGUR_RAG_MAX_JOIN_COLUMNS") {
            config.retrieval.max_default_join_columns =
                parse_number("AUGUR_RAG_MAX_JOIN_COLUMNS", &v)?;
        }
        if let Some(prefix) = lookup("AUGUR_RAG_SCHEMA_PREFIX") {
            config.retrieval.schema_prefix = prefix;
        }

        if let Some(path) = lookup("AUGUR_RAG_CATALOG") {
            config.catalog_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("AUGUR_RAG_INDEX") {
            config.index_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("AUGUR_RAG_JOIN_GRAPH") {
            config.join_graph_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.model_name.trim().is_empty() {
            return Err(RagError::Config("embedding model name is empty".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::Config("embedding batch size must be at least 1".to_string()));
        }
        self.retrieval.validate()
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RagError::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RagConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.embedding.provider, ProviderKind::Ollama);
        assert_eq!(config.embedding.model_name, "nomic-embed-text");
        assert_eq!(config.retrieval.table_k, 5);
        assert_eq!(config.retrieval.column_k, 15);
        assert_eq!(config.retrieval.max_default_join_columns, 6);
        assert_eq!(config.retrieval.schema_prefix, "augur_data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = RagConfig::from_lookup(lookup_from(&[
            ("AUGUR_RAG_EMBEDDING_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-test"),
            ("AUGUR_RAG_TABLE_K", "3"),
            ("AUGUR_RAG_SCHEMA_PREFIX", "public"),
            ("AUGUR_RAG_JOIN_GRAPH", "joins.json"),
        ]))
        .unwrap();

        assert_eq!(config.embedding.provider, ProviderKind::OpenAi);
        assert_eq!(config.embedding.model_name, "text-embedding-3-small");
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.retrieval.table_k, 3);
        assert_eq!(config.retrieval.schema_prefix, "public");
        assert_eq!(config.join_graph_path, Some(PathBuf::from("joins.json")));
    }

    #[test]
    fn test_set_provider_switches_untouched_defaults() {
        let mut embedding = EmbeddingConfig::default();
        embedding.set_provider(ProviderKind::OpenAi);
        assert_eq!(embedding.provider, ProviderKind::OpenAi);
        assert_eq!(embedding.endpoint, "https://api.openai.com/v1");
        assert_eq!(embedding.model_name, "text-embedding-3-small");

        let mut embedding = EmbeddingConfig {
            model_name: "mxbai-embed-large".to_string(),
            ..EmbeddingConfig::default()
        };
        embedding.set_provider(ProviderKind::OpenAi);
        assert_eq!(embedding.endpoint, "https://api.openai.com/v1");
        assert_eq!(embedding.model_name, "mxbai-embed-large");

        embedding.set_provider(ProviderKind::Ollama);
        assert_eq!(embedding.endpoint, "http://localhost:11434");
    }

    #[test]
    fn test_env_model_survives_provider_switch() {
        let config = RagConfig::from_lookup(lookup_from(&[
            ("AUGUR_RAG_EMBEDDING_PROVIDER", "openai"),
            ("AUGUR_RAG_EMBEDDING_MODEL", "text-embedding-3-large"),
        ]))
        .unwrap();
        assert_eq!(config.embedding.endpoint, "https://api.openai.com/v1");
        assert_eq!(config.embedding.model_name, "text-embedding-3-large");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            RagConfig::from_lookup(lookup_from(&[("AUGUR_RAG_COLUMN_K", "many")])),
            Err(RagError::Config(_))
        ));
        assert!(matches!(
            RagConfig::from_lookup(lookup_from(&[("AUGUR_RAG_EMBEDDING_PROVIDER", "cohere")])),
            Err(RagError::Config(_))
        ));

        let config = RagConfig::from_lookup(lookup_from(&[("AUGUR_RAG_TABLE_K", "0")])).unwrap();
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }
}
