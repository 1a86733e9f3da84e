//! Vector Store
//!
//! In-memory exact k-NN over cosine similarity. Documents keep insertion order,
//! which doubles as the tie-break order: equal scores rank the earlier document
//! first, so identical queries always yield identical results.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

/// What a stored vector describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentKey {
    Table { table: String },
    Column { table: String, column: String },
}

impl DocumentKey {
    pub fn table(&self) -> &str {
        match self {
            DocumentKey::Table { table } | DocumentKey::Column { table, .. } => table,
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            DocumentKey::Table { .. } => None,
            DocumentKey::Column { column, .. } => Some(column.as_str()),
        }
    }
}

/// Document in the vector store
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: DocumentKey,
    pub text: String,
    pub embedding: Embedding,
}

/// Search result from vector store
#[derive(Debug, Clone)]
pub struct SearchResult<'a> {
    pub document: &'a Document,
    pub score: f32,
    /// Insertion position of the document.
    pub position: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    documents: Vec<Document>,
    dimension: Option<usize>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document; every embedding in a store must share one dimension.
    pub fn add_document(&mut self, document: Document) -> Result<()> {
        let len = document.embedding.len();
        match self.dimension {
            Some(dimension) if dimension != len => {
                return Err(RagError::Index(format!(
                    "embedding dimension {} doesn't match store dimension {}",
                    len, dimension
                )));
            }
            None => self.dimension = Some(len),
            _ => {}
        }
        self.documents.push(document);
        Ok(())
    }

    pub fn add_documents(&mut self, documents: impl IntoIterator<Item = Document>) -> Result<()> {
        for doc in documents {
            self.add_document(doc)?;
        }
        Ok(())
    }

    /// Top `top_k` documents by cosine similarity.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult<'_>>> {
        self.search_where(query, top_k, |_| true)
    }

    /// Top `top_k` among documents accepted by `filter`.
    pub fn search_where<F>(
        &self,
        query: &[f32],
        top_k: usize,
        filter: F,
    ) -> Result<Vec<SearchResult<'_>>>
    where
        F: Fn(&Document) -> bool,
    {
        if self.documents.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        if let Some(dimension) = self.dimension {
            if query.len() != dimension {
                return Err(RagError::Index(format!(
                    "query embedding dimension {} doesn't match store dimension {}",
                    query.len(),
                    dimension
                )));
            }
        }

        let mut results: Vec<SearchResult<'_>> = self
            .documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| filter(doc))
            .map(|(position, doc)| SearchResult {
                document: doc,
                score: cosine_similarity(query, &doc.embedding),
                position,
            })
            .collect();

        results.sort_by(|a, b| compare_scores(b.score, a.score).then(a.position.cmp(&b.position)));
        results.truncate(top_k);

        Ok(results)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// NaN sorts below every real score.
fn compare_scores(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
