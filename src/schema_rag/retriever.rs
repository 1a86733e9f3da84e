//! Schema RAG Retriever
//!
//! Builds the compact schema context handed to SQL generation:
//! 1. embed the query once
//! 2. k-NN over table vectors picks the candidate tables
//! 3. k-NN over the column vectors of those tables picks the columns
//! 4. join hints of the picked columns pull in related tables with a default slice
//! 5. essential columns are merged in and every table is rendered on one line

use crate::augur;
use crate::catalog::{EssentialColumns, SchemaCatalog};
use crate::config::{RagConfig, RetrievalConfig};
use crate::error::Result;
use crate::join_graph::JoinGraph;
use crate::schema_rag::embedder::EmbeddingProvider;
use crate::schema_rag::index::EmbeddingIndex;
use crate::schema_rag::vector_store::InMemoryVectorStore;
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Returned instead of a context when nothing in the catalog matches.
pub const NO_MATCHING_SCHEMA: &str = "No matching schema found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    /// Chosen by the table-stage nearest-neighbour search.
    Selected,
    /// Reached through a join hint of a chosen column.
    JoinExpansion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumns {
    pub table: String,
    pub columns: Vec<String>,
    pub source: TableSource,
}

/// Per-query result; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalResult {
    /// Table-stage hits, nearest first.
    pub selected_tables: Vec<String>,
    /// Selected tables in rank order, then join-expanded tables.
    pub table_columns: Vec<TableColumns>,
}

impl RetrievalResult {
    fn empty(selected_tables: Vec<String>) -> Self {
        Self {
            selected_tables,
            table_columns: Vec::new(),
        }
    }

    pub fn columns_for(&self, table: &str) -> Option<&[String]> {
        self.table_columns
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.columns.as_slice())
    }

    /// True when no table has any column to show.
    pub fn is_empty(&self) -> bool {
        self.table_columns.iter().all(|t| t.columns.is_empty())
    }

    /// One `prefix.table(table.col, ...)` line per non-empty table, or the
    /// no-match sentinel.
    pub fn render(&self, schema_prefix: &str) -> String {
        if self.is_empty() {
            return NO_MATCHING_SCHEMA.to_string();
        }
        self.table_columns
            .iter()
            .filter(|t| !t.columns.is_empty())
            .map(|t| {
                let columns = t
                    .columns
                    .iter()
                    .map(|c| format!("{}.{}", t.table, c))
                    .join(", ");
                if schema_prefix.is_empty() {
                    format!("{}({})", t.table, columns)
                } else {
                    format!("{}.{}({})", schema_prefix, t.table, columns)
                }
            })
            .join("\n")
    }
}

/// Query-time retriever over a loaded, read-only index. Safe to share
/// between concurrent callers.
pub struct SchemaRetriever {
    catalog: SchemaCatalog,
    join_graph: JoinGraph,
    essentials: EssentialColumns,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
    table_store: InMemoryVectorStore,
    column_store: InMemoryVectorStore,
}

impl SchemaRetriever {
    /// Fails when the index was built with another model or from another catalog.
    pub fn new(
        index: EmbeddingIndex,
        catalog: SchemaCatalog,
        join_graph: JoinGraph,
        essentials: EssentialColumns,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        index.check_model(embedder.model_name())?;
        index.check_catalog(&catalog, &join_graph)?;

        Ok(Self {
            table_store: index.table_store()?,
            column_store: index.column_store()?,
            catalog,
            join_graph,
            essentials,
            embedder,
            config,
        })
    }

    /// Load catalog, join graph and persisted index named by `config`.
    pub fn open(config: &RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let catalog = SchemaCatalog::load(&config.catalog_path)?;
        let join_graph = match &config.join_graph_path {
            Some(path) => JoinGraph::load(path)?,
            None => augur::default_join_graph(),
        };
        let index = EmbeddingIndex::load(&config.index_path)?;
        info!(
            "Opened index {} ({} tables, {} columns, model {})",
            config.index_path.display(),
            index.table_vectors.len(),
            index.column_vectors.len(),
            index.model
        );
        Self::new(
            index,
            catalog,
            join_graph,
            augur::default_essential_columns(),
            embedder,
            config.retrieval.clone(),
        )
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Rendered schema context for `query`, or [`NO_MATCHING_SCHEMA`].
    pub async fn get_schema_context(&self, query: &str) -> Result<String> {
        let result = self.retrieve(query).await?;
        Ok(result.render(&self.config.schema_prefix))
    }

    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        let query_embedding = self.embedder.embed(query).await?;

        // Table stage
        let table_k = self.config.table_k.min(self.table_store.len());
        let selected_tables: Vec<String> = self
            .table_store
            .search(&query_embedding, table_k)?
            .into_iter()
            .map(|hit| hit.document.key.table().to_string())
            .collect();
        debug!("Table stage selected {:?}", selected_tables);

        // Column stage, restricted to the selected tables
        let selected: HashSet<&str> = selected_tables.iter().map(String::as_str).collect();
        let restricted = self
            .column_store
            .documents()
            .iter()
            .filter(|d| selected.contains(d.key.table()))
            .count();
        if restricted == 0 {
            debug!("No indexed columns for the selected tables");
            return Ok(RetrievalResult::empty(selected_tables.clone()));
        }
        let column_k = self.config.column_k.min(restricted);
        let column_hits = self.column_store.search_where(&query_embedding, column_k, |d| {
            selected.contains(d.key.table())
        })?;

        let mut table_columns: Vec<TableColumns> = selected_tables
            .iter()
            .map(|table| TableColumns {
                table: table.clone(),
                columns: Vec::new(),
                source: TableSource::Selected,
            })
            .collect();
        let mut additional_tables: Vec<String> = Vec::new();

        for hit in &column_hits {
            let table = hit.document.key.table();
            let column = match hit.document.key.column() {
                Some(column) => column,
                None => continue,
            };
            if let Some(entry) = table_columns.iter_mut().find(|t| t.table == table) {
                if !entry.columns.iter().any(|c| c == column) {
                    entry.columns.push(column.to_string());
                }
            }
            for target in self.join_graph.targets(table, column) {
                if !additional_tables.contains(target) {
                    additional_tables.push(target.clone());
                }
            }
        }
        debug!(
            "Column stage picked {} columns; join hints reach {:?}",
            column_hits.len(),
            additional_tables
        );

        // Join expansion
        for table in additional_tables {
            if table_columns.iter().any(|t| t.table == table) {
                continue;
            }
            let meta = match self.catalog.table(&table) {
                Some(meta) => meta,
                None => continue,
            };
            let columns = meta
                .column_names()
                .take(self.config.max_default_join_columns)
                .map(str::to_string)
                .collect();
            table_columns.push(TableColumns {
                table,
                columns,
                source: TableSource::JoinExpansion,
            });
        }

        // Essential columns
        for entry in &mut table_columns {
            let meta = match self.catalog.table(&entry.table) {
                Some(meta) => meta,
                None => continue,
            };
            for column in self.essentials.for_table(&entry.table) {
                if meta.has_column(column) && !entry.columns.contains(column) {
                    entry.columns.push(column.clone());
                }
            }
        }

        Ok(RetrievalResult {
            selected_tables,
            table_columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(entries: &[(&str, &[&str])]) -> RetrievalResult {
        RetrievalResult {
            selected_tables: entries.iter().map(|(t, _)| t.to_string()).collect(),
            table_columns: entries
                .iter()
                .map(|(t, cols)| TableColumns {
                    table: t.to_string(),
                    columns: cols.iter().map(|c| c.to_string()).collect(),
                    source: TableSource::Selected,
                })
                .collect(),
        }
    }

    #[test]
    fn test_render_lines() {
        let r = result(&[
            ("commits", &["cmt_author_timestamp", "repo_id"]),
            ("contributors", &[]),
            ("repo", &["repo_id"]),
        ]);
        assert_eq!(
            r.render("augur_data"),
            "augur_data.commits(commits.cmt_author_timestamp, commits.repo_id)\naugur_data.repo(repo.repo_id)"
        );
        assert_eq!(r.render(""), "commits(commits.cmt_author_timestamp, commits.repo_id)\nrepo(repo.repo_id)");
        assert_eq!(r.columns_for("repo"), Some(&["repo_id".to_string()][..]));
    }

    #[test]
    fn test_render_empty_is_sentinel() {
        assert_eq!(result(&[]).render("augur_data"), NO_MATCHING_SCHEMA);
        assert_eq!(result(&[("repo", &[])]).render("augur_data"), NO_MATCHING_SCHEMA);
    }
}
