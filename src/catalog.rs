//! Schema Catalog
//!
//! Static description of the analytics database: tables in declaration order,
//! each with a purpose description and its columns. Several on-disk shapes are
//! accepted and normalised here so nothing downstream branches on shape.

use crate::error::{RagError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

lazy_static! {
    /// `"cntrb_login (character varying)"` as written by information_schema dumps
    static ref TYPED_COLUMN: Regex = Regex::new(r"^\s*([^\s(]+)\s*\((.*)\)\s*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            data_type: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub columns: Vec<ColumnMeta>,
}

impl TableMeta {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            columns: Vec::new(),
        }
    }

    /// Builder helper for plain column names.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .extend(columns.into_iter().map(|c| ColumnMeta::new(c)));
        self
    }

    pub fn with_column(mut self, column: ColumnMeta) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Immutable, validated catalog. Table and column names are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaCatalog {
    tables: Vec<TableMeta>,
    positions: HashMap<String, usize>,
}

impl SchemaCatalog {
    /// Current canonical file format version.
    pub const VERSION: u64 = 1;

    pub fn new(tables: Vec<TableMeta>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(tables.len());
        for (i, table) in tables.iter().enumerate() {
            if table.name.trim().is_empty() {
                return Err(RagError::Catalog(format!("table #{} has an empty name", i)));
            }
            if positions.insert(table.name.clone(), i).is_some() {
                return Err(RagError::Catalog(format!(
                    "table '{}' is declared more than once",
                    table.name
                )));
            }
            let mut seen = HashSet::new();
            for column in &table.columns {
                if column.name.trim().is_empty() {
                    return Err(RagError::Catalog(format!(
                        "table '{}' has a column with an empty name",
                        table.name
                    )));
                }
                if !seen.insert(column.name.as_str()) {
                    return Err(RagError::Catalog(format!(
                        "column '{}.{}' is declared more than once",
                        table.name, column.name
                    )));
                }
            }
        }
        Ok(Self { tables, positions })
    }

    /// Load a catalog file in any of the supported shapes.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::Catalog(format!("failed to read catalog {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json_str(&raw).map_err(|e| match e {
            RagError::Catalog(msg) => RagError::Catalog(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        info!(
            "Loaded catalog {} ({} tables, {} columns)",
            path.display(),
            catalog.len(),
            catalog.column_count()
        );
        Ok(catalog)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| RagError::Catalog(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Normalise a parsed catalog document.
    ///
    /// Accepts the canonical `{"version", "tables": {...}}` shape, the legacy flat
    /// `{table: {description, columns}}` shape and the introspection dump shape
    /// `{table: ["col (type)", ...]}`.
    pub fn from_value(value: Value) -> Result<Self> {
        let root = match value {
            Value::Object(map) => map,
            _ => return Err(RagError::Catalog("catalog root must be a JSON object".to_string())),
        };

        let tables = match CatalogShape::detect(&root) {
            CatalogShape::Versioned => {
                let version = match root.get("version") {
                    None => Self::VERSION,
                    Some(v) => v.as_u64().ok_or_else(|| {
                        RagError::Catalog("'version' must be a positive integer".to_string())
                    })?,
                };
                if version == 0 || version > Self::VERSION {
                    return Err(RagError::Catalog(format!(
                        "unsupported catalog version {} (supported: {})",
                        version,
                        Self::VERSION
                    )));
                }
                match root.get("tables") {
                    Some(Value::Object(tables)) => parse_table_map(tables)?,
                    _ => return Err(RagError::Catalog("'tables' must be an object".to_string())),
                }
            }
            CatalogShape::Flat => {
                debug!("Migrating flat catalog shape");
                parse_table_map(&root)?
            }
            CatalogShape::Extracted => {
                debug!("Migrating extracted column-list catalog shape");
                root.iter()
                    .map(|(name, columns)| {
                        Ok(TableMeta {
                            name: name.clone(),
                            description: String::new(),
                            columns: parse_columns(name, columns)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            CatalogShape::Unknown => {
                return Err(RagError::Catalog(
                    "unrecognised catalog shape; expected {\"tables\": {...}}, {table: {description, columns}} or {table: [columns]}"
                        .to_string(),
                ))
            }
        };

        Self::new(tables)
    }

    /// Canonical (versioned) representation.
    pub fn to_value(&self) -> Value {
        let mut tables = Map::new();
        for table in &self.tables {
            let columns: Vec<Value> = table
                .columns
                .iter()
                .map(|c| {
                    if c.description.is_none() && c.data_type.is_none() {
                        Value::String(c.name.clone())
                    } else {
                        serde_json::to_value(c).unwrap_or_else(|_| Value::String(c.name.clone()))
                    }
                })
                .collect();
            tables.insert(
                table.name.clone(),
                serde_json::json!({
                    "description": table.description,
                    "columns": columns,
                }),
            );
        }
        serde_json::json!({
            "version": Self::VERSION,
            "tables": tables,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded = serde_json::to_string_pretty(&self.to_value())?;
        std::fs::write(path, encoded)?;
        Ok(())
    }

    pub fn tables(&self) -> &[TableMeta] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableMeta> {
        self.positions.get(name).map(|&i| &self.tables[i])
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Declaration position of a table; the stable secondary order for ranking.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Plain-text schema listing handed to an agent as its "describe schema" answer.
    /// An empty `only` slice describes every table.
    pub fn describe(&self, only: &[String]) -> String {
        self.tables
            .iter()
            .filter(|t| only.is_empty() || only.iter().any(|o| o == &t.name))
            .map(|t| {
                let columns: Vec<String> = t
                    .columns
                    .iter()
                    .map(|c| match &c.data_type {
                        Some(dtype) => format!("{} ({})", c.name, dtype),
                        None => c.name.clone(),
                    })
                    .collect();
                format!("Table: {}\n- {}\n", t.name, columns.join("\n- "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatalogShape {
    Versioned,
    Flat,
    Extracted,
    Unknown,
}

impl CatalogShape {
    fn detect(root: &Map<String, Value>) -> Self {
        // A flat catalog may legitimately contain a table called "tables"; that one
        // carries its own "columns" key. A scalar "version" rules that out, so a
        // versioned catalog may itself hold a table called "columns".
        if let Some(Value::Object(tables)) = root.get("tables") {
            let has_version = root.get("version").map_or(false, |v| !v.is_object());
            if has_version || !tables.contains_key("columns") {
                return CatalogShape::Versioned;
            }
        }
        if root.is_empty() {
            return CatalogShape::Flat;
        }
        if root.values().all(|v| v.is_object()) {
            CatalogShape::Flat
        } else if root.values().all(|v| v.is_array()) {
            CatalogShape::Extracted
        } else {
            CatalogShape::Unknown
        }
    }
}

fn parse_table_map(tables: &Map<String, Value>) -> Result<Vec<TableMeta>> {
    tables
        .iter()
        .map(|(name, meta)| {
            let meta = meta.as_object().ok_or_else(|| {
                RagError::Catalog(format!("table '{}' must be an object", name))
            })?;
            let description = match meta.get("description") {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(_) => {
                    return Err(RagError::Catalog(format!(
                        "description of table '{}' must be a string",
                        name
                    )))
                }
            };
            let columns = match meta.get("columns") {
                None | Some(Value::Null) => Vec::new(),
                Some(columns) => parse_columns(name, columns)?,
            };
            Ok(TableMeta {
                name: name.clone(),
                description,
                columns,
            })
        })
        .collect()
}

fn parse_columns(table: &str, columns: &Value) -> Result<Vec<ColumnMeta>> {
    match columns {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| parse_column_entry(table, entry))
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(name, detail)| match detail {
                Value::Null => Ok(ColumnMeta::new(name.clone())),
                Value::String(desc) => Ok(ColumnMeta::new(name.clone()).with_description(desc.clone())),
                Value::Object(obj) => Ok(ColumnMeta {
                    name: name.clone(),
                    description: string_field(obj, "description"),
                    data_type: string_field(obj, "data_type").or_else(|| string_field(obj, "type")),
                }),
                _ => Err(RagError::Catalog(format!(
                    "column '{}.{}' has an unsupported description value",
                    table, name
                ))),
            })
            .collect(),
        _ => Err(RagError::Catalog(format!(
            "columns of table '{}' must be a list or an object",
            table
        ))),
    }
}

fn parse_column_entry(table: &str, entry: &Value) -> Result<ColumnMeta> {
    match entry {
        Value::String(raw) => Ok(match TYPED_COLUMN.captures(raw) {
            Some(caps) => ColumnMeta::new(&caps[1]).with_data_type(caps[2].trim()),
            None => ColumnMeta::new(raw.trim()),
        }),
        Value::Object(obj) => {
            let name = string_field(obj, "name").ok_or_else(|| {
                RagError::Catalog(format!("a column of table '{}' is missing 'name'", table))
            })?;
            Ok(ColumnMeta {
                name,
                description: string_field(obj, "description"),
                data_type: string_field(obj, "data_type").or_else(|| string_field(obj, "type")),
            })
        }
        _ => Err(RagError::Catalog(format!(
            "column entries of table '{}' must be strings or objects",
            table
        ))),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Per-table allowlist of columns that are always exposed for a table once it
/// appears in a schema context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EssentialColumns {
    by_table: HashMap<String, Vec<String>>,
}

impl EssentialColumns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(table, columns);
        self
    }

    pub fn insert<I, S>(&mut self, table: impl Into<String>, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.by_table.entry(table.into()).or_default();
        for column in columns {
            let column = column.into();
            if !entry.contains(&column) {
                entry.push(column);
            }
        }
    }

    pub fn for_table(&self, table: &str) -> &[String] {
        self.by_table.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_table.is_empty()
    }
}
