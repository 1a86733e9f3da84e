pub mod augur;
pub mod catalog;
pub mod config;
pub mod error;
pub mod join_graph;
pub mod schema_rag;

// Database module for PostgreSQL catalog extraction
pub mod db;

pub use catalog::{ColumnMeta, EssentialColumns, SchemaCatalog, TableMeta};
pub use config::{EmbeddingConfig, ProviderKind, RagConfig, RetrievalConfig};
pub use error::{RagError, Result};
pub use join_graph::JoinGraph;
pub use schema_rag::{
    EmbeddingIndex, EmbeddingProvider, RetrievalResult, SchemaRetriever, NO_MATCHING_SCHEMA,
};
