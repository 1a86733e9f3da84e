#![allow(dead_code)]

use async_trait::async_trait;
use augur_schema_rag::catalog::{EssentialColumns, SchemaCatalog, TableMeta};
use augur_schema_rag::config::RetrievalConfig;
use augur_schema_rag::schema_rag::{Embedding, EmbeddingIndex, EmbeddingProvider, SchemaRetriever};
use augur_schema_rag::{augur, JoinGraph, RagError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const KEYWORD_MODEL: &str = "keyword-test";

const VOCABULARY: &[&str] = &[
    "repo", "repository", "repositories", "contributor", "contributors", "commit", "commits",
    "pull", "request", "requests", "review", "reviews", "affiliation", "affiliations",
    "organization", "group", "groups", "month", "timestamp", "date", "email", "login", "name",
    "language", "state",
];

/// Bag-of-words embedder over a fixed vocabulary: one dimension per word,
/// valued by its count in the lower-cased text. Counts every text it embeds.
pub struct KeywordEmbedder {
    model: String,
    pub texts_embedded: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::with_model(KEYWORD_MODEL)
    }

    pub fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            texts_embedded: AtomicUsize::new(0),
        }
    }

    pub fn vectorize(text: &str) -> Embedding {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        VOCABULARY
            .iter()
            .map(|word| tokens.iter().filter(|t| *t == word).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

/// Always fails, standing in for an unreachable embedding service.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        KEYWORD_MODEL
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Embedding>> {
        Err(RagError::Embedding("connection refused".to_string()))
    }
}

/// `repo(repo_id, repo_name)` and `commits(repo_id, cmt_author_timestamp)`
/// with `commits.repo_id -> repo`.
pub fn two_table_catalog() -> (SchemaCatalog, JoinGraph) {
    let catalog = SchemaCatalog::new(vec![
        TableMeta::new("repo", "Repository metadata").with_columns(["repo_id", "repo_name"]),
        TableMeta::new("commits", "Commit activity").with_columns(["repo_id", "cmt_author_timestamp"]),
    ])
    .unwrap();
    let graph = JoinGraph::new().with_edge("commits", "repo_id", ["repo"]);
    (catalog, graph)
}

/// The seven core Augur tables with the Augur descriptions.
pub fn augur_catalog() -> SchemaCatalog {
    let catalog = SchemaCatalog::new(vec![
        TableMeta::new("repo", "").with_columns([
            "repo_id", "repo_group_id", "repo_git", "repo_name", "repo_added", "repo_status",
            "primary_language",
        ]),
        TableMeta::new("contributors", "").with_columns([
            "cntrb_id", "cntrb_login", "cntrb_email", "cntrb_company", "cntrb_created_at",
            "cntrb_full_name",
        ]),
        TableMeta::new("commits", "").with_columns([
            "cmt_id", "repo_id", "cmt_commit_hash", "cmt_author_name", "cmt_author_timestamp",
            "cmt_ght_author_id", "cmt_added", "cmt_removed",
        ]),
        TableMeta::new("pull_requests", "").with_columns([
            "pull_request_id", "repo_id", "pr_src_state", "pr_created_at", "pr_merged_at",
            "pr_cntrb_id",
        ]),
        TableMeta::new("pull_request_reviews", "").with_columns([
            "pr_review_id", "pull_request_id", "cntrb_id", "pr_review_state",
            "pr_review_submitted_at",
        ]),
        TableMeta::new("contributor_affiliations", "")
            .with_columns(["ca_id", "ca_domain", "ca_affiliation", "ca_active"]),
        TableMeta::new("repo_groups", "").with_columns(["repo_group_id", "rg_name", "rg_description"]),
    ])
    .unwrap();
    augur::describe_tables(&catalog)
}

pub fn config(table_k: usize, column_k: usize) -> RetrievalConfig {
    RetrievalConfig {
        table_k,
        column_k,
        ..RetrievalConfig::default()
    }
}

/// Build an index with `embedder` and open a retriever over it.
pub async fn retriever_with(
    catalog: SchemaCatalog,
    graph: JoinGraph,
    essentials: EssentialColumns,
    config: RetrievalConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> SchemaRetriever {
    let index = EmbeddingIndex::build(&catalog, &graph, embedder.as_ref(), 16)
        .await
        .unwrap();
    SchemaRetriever::new(index, catalog, graph, essentials, embedder, config).unwrap()
}

pub async fn keyword_retriever(
    catalog: SchemaCatalog,
    graph: JoinGraph,
    essentials: EssentialColumns,
    config: RetrievalConfig,
) -> SchemaRetriever {
    retriever_with(catalog, graph, essentials, config, Arc::new(KeywordEmbedder::new())).await
}

/// `(table, column)` pairs referenced by a rendered context.
pub fn referenced_columns(context: &str, schema_prefix: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in context.lines() {
        let line = line
            .strip_prefix(&format!("{}.", schema_prefix))
            .unwrap_or(line);
        let (table, rest) = line.split_once('(').unwrap();
        let inner = rest.strip_suffix(')').unwrap();
        for token in inner.split(", ") {
            let (t, c) = token.split_once('.').unwrap();
            assert_eq!(t, table, "column token {} rendered under table {}", token, table);
            pairs.push((t.to_string(), c.to_string()));
        }
    }
    pairs
}

pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("augur_schema_rag_{}_{}", std::process::id(), name))
}
