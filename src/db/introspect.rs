//! Catalog extraction from `information_schema.columns`.

use crate::catalog::{ColumnMeta, SchemaCatalog, TableMeta};
use crate::error::{RagError, Result};
use sqlx::PgPool;
use tracing::info;

/// `(table_name, column_name, data_type)` as returned by the introspection query.
pub type ColumnRow = (String, String, String);

/// Read every column of `schema`, ordered by table then ordinal position.
/// An empty `only_tables` keeps every table.
pub async fn extract_catalog(
    pool: &PgPool,
    schema: &str,
    only_tables: &[String],
) -> Result<SchemaCatalog> {
    let rows: Vec<ColumnRow> = sqlx::query_as(
        r#"
        SELECT table_name::text, column_name::text, data_type::text
        FROM information_schema.columns
        WHERE table_schema = $1
        ORDER BY table_name, ordinal_position
        "#,
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|e| RagError::Database(format!("Failed to read columns of schema {}: {}", schema, e)))?;

    info!("Read {} column rows from schema {}", rows.len(), schema);
    catalog_from_rows(rows, only_tables)
}

/// Group introspection rows into a catalog, keeping row order.
pub fn catalog_from_rows(rows: Vec<ColumnRow>, only_tables: &[String]) -> Result<SchemaCatalog> {
    let mut tables: Vec<TableMeta> = Vec::new();
    for (table, column, data_type) in rows {
        if !only_tables.is_empty() && !only_tables.contains(&table) {
            continue;
        }
        let column = ColumnMeta::new(column).with_data_type(data_type);
        match tables.last_mut() {
            Some(last) if last.name == table => last.columns.push(column),
            _ => match tables.iter_mut().find(|t| t.name == table) {
                Some(existing) => existing.columns.push(column),
                None => tables.push(TableMeta::new(table, "").with_column(column)),
            },
        }
    }
    SchemaCatalog::new(tables)
}
