//! Embedding Index
//!
//! Vectors for every table description and every column descriptor, built in
//! one shot from the catalog and join graph and persisted as a JSON document.
//! There is no incremental update: a catalog change means a full rebuild.

use crate::catalog::{SchemaCatalog, TableMeta};
use crate::error::{RagError, Result};
use crate::join_graph::JoinGraph;
use crate::schema_rag::embedder::EmbeddingProvider;
use crate::schema_rag::semantics::infer_meaning;
use crate::schema_rag::vector_store::{Document, DocumentKey, Embedding, InMemoryVectorStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Version of the persisted index layout.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Text that gets embedded for one catalog column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub table: String,
    pub column: String,
    pub semantic_meaning: String,
    pub table_context: String,
    pub join_hint: String,
}

impl ColumnDescriptor {
    pub fn text(&self) -> String {
        format!(
            "{}.{} — {}. Table context: {}.{}",
            self.table, self.column, self.semantic_meaning, self.table_context, self.join_hint
        )
    }
}

/// One descriptor per catalog column, in catalog order. An explicit column
/// description takes precedence over the inferred meaning.
pub fn describe_columns(catalog: &SchemaCatalog, join_graph: &JoinGraph) -> Vec<ColumnDescriptor> {
    catalog
        .tables()
        .iter()
        .flat_map(|table| {
            table.columns.iter().map(move |column| ColumnDescriptor {
                table: table.name.clone(),
                column: column.name.clone(),
                semantic_meaning: column
                    .description
                    .as_ref()
                    .filter(|d| !d.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| infer_meaning(&column.name, &table.name)),
                table_context: table.description.clone(),
                join_hint: join_graph.render_hint(&table.name, &column.name),
            })
        })
        .collect()
}

pub fn table_text(table: &TableMeta) -> String {
    format!("Table {}: {}", table.name, table.description)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableVector {
    pub table: String,
    pub text: String,
    pub vector: Embedding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnVector {
    pub table: String,
    pub column: String,
    pub text: String,
    pub vector: Embedding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingIndex {
    pub format_version: u32,
    /// Embedding model that produced every vector in this index.
    pub model: String,
    /// Uniform vector length; 0 for an index of an empty catalog.
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
    pub table_vectors: Vec<TableVector>,
    pub column_vectors: Vec<ColumnVector>,
}

impl EmbeddingIndex {
    /// Embed every table and column text. Any provider failure fails the whole
    /// build; nothing partial is returned.
    pub async fn build(
        catalog: &SchemaCatalog,
        join_graph: &JoinGraph,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        let table_texts: Vec<String> = catalog.tables().iter().map(table_text).collect();
        let descriptors = describe_columns(catalog, join_graph);
        let column_texts: Vec<String> = descriptors.iter().map(ColumnDescriptor::text).collect();

        info!(
            "Embedding {} tables and {} columns with {}",
            table_texts.len(),
            column_texts.len(),
            provider.model_name()
        );

        let table_embeddings = embed_all(provider, &table_texts, batch_size, "tables").await?;
        let column_embeddings = embed_all(provider, &column_texts, batch_size, "columns").await?;

        let dimension = table_embeddings
            .iter()
            .chain(column_embeddings.iter())
            .map(Vec::len)
            .next()
            .unwrap_or(0);
        if let Some(bad) = table_embeddings
            .iter()
            .chain(column_embeddings.iter())
            .find(|v| v.len() != dimension)
        {
            return Err(RagError::Embedding(format!(
                "provider returned vectors of mixed dimension ({} and {})",
                dimension,
                bad.len()
            )));
        }

        let table_vectors = catalog
            .tables()
            .iter()
            .zip(table_texts)
            .zip(table_embeddings)
            .map(|((table, text), vector)| TableVector {
                table: table.name.clone(),
                text,
                vector,
            })
            .collect();

        let column_vectors = descriptors
            .into_iter()
            .zip(column_texts)
            .zip(column_embeddings)
            .map(|((descriptor, text), vector)| ColumnVector {
                table: descriptor.table,
                column: descriptor.column,
                text,
                vector,
            })
            .collect();

        Ok(Self {
            format_version: INDEX_FORMAT_VERSION,
            model: provider.model_name().to_string(),
            dimension,
            built_at: Utc::now(),
            table_vectors,
            column_vectors,
        })
    }

    /// Write the index; the target is replaced only once the full document is on disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded = serde_json::to_string(self)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index.json".to_string());
        let tmp = path.with_file_name(format!(".{}.tmp", file_name));
        std::fs::write(&tmp, encoded)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            std::fs::remove_file(&tmp).ok();
            return Err(e.into());
        }
        info!(
            "Saved index with {} table and {} column vectors to {}",
            self.table_vectors.len(),
            self.column_vectors.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let encoded = match std::fs::read_to_string(path) {
            Ok(encoded) => encoded,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RagError::IndexNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let index: Self = serde_json::from_str(&encoded).map_err(|e| {
            RagError::Index(format!("failed to parse index {}: {}", path.display(), e))
        })?;
        index.validate()?;
        debug!(
            "Loaded index {} (model {}, dimension {})",
            path.display(),
            index.model,
            index.dimension
        );
        Ok(index)
    }

    fn validate(&self) -> Result<()> {
        if self.format_version != INDEX_FORMAT_VERSION {
            return Err(RagError::Index(format!(
                "unsupported index format version {} (expected {}); rebuild the index",
                self.format_version, INDEX_FORMAT_VERSION
            )));
        }
        let vectors = self
            .table_vectors
            .iter()
            .map(|t| &t.vector)
            .chain(self.column_vectors.iter().map(|c| &c.vector));
        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(RagError::Index(format!(
                    "index contains a vector of dimension {} but declares {}",
                    vector.len(),
                    self.dimension
                )));
            }
        }
        Ok(())
    }

    /// Vectors from one model must never be compared with another model's.
    pub fn check_model(&self, model_name: &str) -> Result<()> {
        if self.model != model_name {
            return Err(RagError::Index(format!(
                "index was built with model '{}' but the provider uses '{}'; rebuild the index",
                self.model, model_name
            )));
        }
        Ok(())
    }

    /// The index must describe exactly this catalog and join graph.
    pub fn check_catalog(&self, catalog: &SchemaCatalog, join_graph: &JoinGraph) -> Result<()> {
        let stale = |what: String| {
            RagError::Index(format!("index is out of date with the catalog ({}); rebuild the index", what))
        };

        if self.table_vectors.len() != catalog.len() {
            return Err(stale(format!(
                "{} tables indexed, {} in catalog",
                self.table_vectors.len(),
                catalog.len()
            )));
        }
        for (entry, table) in self.table_vectors.iter().zip(catalog.tables()) {
            if entry.table != table.name || entry.text != table_text(table) {
                return Err(stale(format!("table '{}' changed", table.name)));
            }
        }

        let descriptors = describe_columns(catalog, join_graph);
        if self.column_vectors.len() != descriptors.len() {
            return Err(stale(format!(
                "{} columns indexed, {} in catalog",
                self.column_vectors.len(),
                descriptors.len()
            )));
        }
        for (entry, descriptor) in self.column_vectors.iter().zip(&descriptors) {
            if entry.table != descriptor.table
                || entry.column != descriptor.column
                || entry.text != descriptor.text()
            {
                return Err(stale(format!(
                    "column '{}.{}' changed",
                    descriptor.table, descriptor.column
                )));
            }
        }
        Ok(())
    }

    pub fn table_store(&self) -> Result<InMemoryVectorStore> {
        let mut store = InMemoryVectorStore::new();
        store.add_documents(self.table_vectors.iter().map(|t| Document {
            key: DocumentKey::Table {
                table: t.table.clone(),
            },
            text: t.text.clone(),
            embedding: t.vector.clone(),
        }))?;
        Ok(store)
    }

    pub fn column_store(&self) -> Result<InMemoryVectorStore> {
        let mut store = InMemoryVectorStore::new();
        store.add_documents(self.column_vectors.iter().map(|c| Document {
            key: DocumentKey::Column {
                table: c.table.clone(),
                column: c.column.clone(),
            },
            text: c.text.clone(),
            embedding: c.vector.clone(),
        }))?;
        Ok(store)
    }
}

async fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
    what: &str,
) -> Result<Vec<Embedding>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for (i, chunk) in texts.chunks(batch_size.max(1)).enumerate() {
        let batch = provider.embed_batch(chunk).await?;
        if batch.len() != chunk.len() {
            return Err(RagError::Embedding(format!(
                "provider returned {} vectors for {} {}",
                batch.len(),
                chunk.len(),
                what
            )));
        }
        vectors.extend(batch);
        debug!("Embedded {} batch {} ({}/{})", what, i + 1, vectors.len(), texts.len());
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnMeta, TableMeta};
    use async_trait::async_trait;

    /// Vector = [text length, number of words, 1.0]
    struct ShapeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShapeEmbedder {
        fn model_name(&self) -> &str {
            "shape"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, t.split_whitespace().count() as f32, 1.0])
                .collect())
        }
    }

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(vec![
            TableMeta::new("repo", "Repositories").with_columns(["repo_id", "repo_name"]),
            TableMeta::new("commits", "Commit history")
                .with_column(ColumnMeta::new("repo_id"))
                .with_column(ColumnMeta::new("cmt_message").with_description("commit message body")),
        ])
        .unwrap()
    }

    #[test]
    fn test_column_descriptor_text() {
        let graph = JoinGraph::new().with_edge("commits", "repo_id", ["repo"]);
        let descriptors = describe_columns(&catalog(), &graph);

        assert_eq!(descriptors.len(), 4);
        assert_eq!(
            descriptors[2].text(),
            "commits.repo_id — repository identifier (join with repo). Table context: Commit history. Possible joins: repo"
        );
        assert_eq!(
            descriptors[3].text(),
            "commits.cmt_message — commit message body. Table context: Commit history."
        );
        assert_eq!(table_text(&catalog().tables()[0]), "Table repo: Repositories");
    }

    #[tokio::test]
    async fn test_build_save_load_round_trip() {
        let catalog = catalog();
        let graph = JoinGraph::new();
        let index = EmbeddingIndex::build(&catalog, &graph, &ShapeEmbedder, 3)
            .await
            .unwrap();

        assert_eq!(index.model, "shape");
        assert_eq!(index.dimension, 3);
        assert_eq!(index.table_vectors.len(), 2);
        assert_eq!(index.column_vectors.len(), 4);
        assert_eq!(index.column_vectors[3].column, "cmt_message");

        let path = std::env::temp_dir().join(format!("schema_index_test_{}.json", std::process::id()));
        index.save(&path).unwrap();
        let loaded = EmbeddingIndex::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, index);
        assert!(loaded.check_model("shape").is_ok());
        assert!(loaded.check_catalog(&catalog, &graph).is_ok());
    }

    #[test]
    fn test_load_missing_index() {
        let path = std::env::temp_dir().join("definitely_missing_schema_index.json");
        assert!(matches!(
            EmbeddingIndex::load(&path),
            Err(RagError::IndexNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_and_mismatched_index() {
        let catalog = catalog();
        let index = EmbeddingIndex::build(&catalog, &JoinGraph::new(), &ShapeEmbedder, 8)
            .await
            .unwrap();

        assert!(matches!(index.check_model("nomic-embed-text"), Err(RagError::Index(_))));

        let graph = JoinGraph::new().with_edge("commits", "repo_id", ["repo"]);
        assert!(matches!(index.check_catalog(&catalog, &graph), Err(RagError::Index(_))));

        let changed = SchemaCatalog::new(vec![
            TableMeta::new("repo", "Repositories").with_columns(["repo_id"]),
        ])
        .unwrap();
        assert!(matches!(
            index.check_catalog(&changed, &JoinGraph::new()),
            Err(RagError::Index(_))
        ));
    }
}
