//! Augur profile
//!
//! Hand-maintained knowledge about the Augur `augur_data` schema: join paths
//! between the core tables, purpose descriptions used when a catalog is
//! extracted from a live database, and the columns every context should carry.

use crate::catalog::{EssentialColumns, SchemaCatalog, TableMeta};
use crate::join_graph::JoinGraph;

pub const SCHEMA_NAME: &str = "augur_data";

/// Tables pulled from a live database unless the caller names others.
pub const IMPORTANT_TABLES: &[&str] = &[
    "repo",
    "contributors",
    "commits",
    "pull_requests",
    "pull_request_reviews",
    "contributor_affiliations",
    "repo_groups",
    "contributor_repo",
];

const JOIN_PATHS: &[(&str, &str, &[&str])] = &[
    ("commits", "repo_id", &["repo"]),
    ("commits", "cmt_ght_author_id", &["contributors"]),
    ("pull_requests", "repo_id", &["repo"]),
    ("pull_requests", "pr_cntrb_id", &["contributors"]),
    ("pull_request_reviews", "pull_request_id", &["pull_requests"]),
    ("contributor_affiliations", "cntrb_id", &["contributors"]),
    ("repo", "repo_group_id", &["repo_groups"]),
];

const TABLE_DESCRIPTIONS: &[(&str, &str)] = &[
    ("repo", "Stores GitHub repository metadata, including names, URLs, and creation dates. Each repository has a unique `repo_id`."),
    ("contributors", "Tracks GitHub contributors, their unique IDs (`cntrb_id`), and GitHub login names (`gh_login`)."),
    ("commits", "Holds commit-level metadata. Links to contributors via `cmt_ght_author_id` and repositories via `repo_id`."),
    ("pull_requests", "Logs pull request activity and metadata such as creation date, status, and repository."),
    ("pull_request_reviews", "Contains review events linking to `pull_request_id` and `cntrb_id`."),
    ("contributor_affiliations", "Maps contributors to organization affiliations via `ca_id` and `ca_affiliation`."),
    ("repo_groups", "Groups multiple repositories into clusters using `rg_id`."),
];

const ESSENTIAL_COLUMNS: &[(&str, &[&str])] = &[
    ("repo", &["repo_id", "repo_name"]),
    ("contributors", &["cntrb_id", "cntrb_login"]),
    ("commits", &["cmt_id", "repo_id"]),
    ("pull_requests", &["pull_request_id", "repo_id"]),
    ("pull_request_reviews", &["pull_request_id"]),
    ("contributor_affiliations", &["ca_affiliation"]),
    ("repo_groups", &["repo_group_id", "rg_name"]),
];

/// Table filter for extraction: the requested tables, every table when `all`
/// is set (an empty filter), otherwise [`IMPORTANT_TABLES`].
pub fn extraction_tables(requested: &[String], all: bool) -> Vec<String> {
    if !requested.is_empty() {
        requested.to_vec()
    } else if all {
        Vec::new()
    } else {
        IMPORTANT_TABLES.iter().map(|t| t.to_string()).collect()
    }
}

pub fn default_join_graph() -> JoinGraph {
    let mut graph = JoinGraph::new();
    for (table, column, targets) in JOIN_PATHS {
        graph.add_edge(table, column, targets.iter().copied());
    }
    graph
}

pub fn default_essential_columns() -> EssentialColumns {
    let mut essentials = EssentialColumns::new();
    for (table, columns) in ESSENTIAL_COLUMNS {
        essentials.insert(*table, columns.iter().copied());
    }
    essentials
}

pub fn table_description(table: &str) -> Option<&'static str> {
    TABLE_DESCRIPTIONS
        .iter()
        .find(|(name, _)| *name == table)
        .map(|(_, description)| *description)
}

/// Fill empty table descriptions from the profile. Existing descriptions win.
pub fn describe_tables(catalog: &SchemaCatalog) -> SchemaCatalog {
    let tables: Vec<TableMeta> = catalog
        .tables()
        .iter()
        .map(|t| {
            let mut table = t.clone();
            if table.description.is_empty() {
                if let Some(description) = table_description(&table.name) {
                    table.description = description.to_string();
                }
            }
            table
        })
        .collect();
    // Names were already validated by `catalog`.
    SchemaCatalog::new(tables).unwrap_or_else(|_| catalog.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_join_graph() {
        let graph = default_join_graph();
        assert_eq!(graph.len(), JOIN_PATHS.len());
        assert_eq!(graph.targets("commits", "cmt_ght_author_id"), ["contributors"]);
        assert_eq!(graph.targets("repo", "repo_group_id"), ["repo_groups"]);
    }

    #[test]
    fn test_extraction_tables() {
        let preset = extraction_tables(&[], false);
        assert_eq!(preset.len(), IMPORTANT_TABLES.len());
        assert!(preset.iter().any(|t| t == "contributor_repo"));
        assert!(extraction_tables(&[], true).is_empty());
        assert_eq!(extraction_tables(&["message".to_string()], false), ["message"]);

        for (table, _, targets) in JOIN_PATHS {
            assert!(IMPORTANT_TABLES.contains(table));
            assert!(targets.iter().all(|t| IMPORTANT_TABLES.contains(t)));
        }
    }

    #[test]
    fn test_describe_tables_keeps_existing() {
        let catalog = SchemaCatalog::new(vec![
            TableMeta::new("repo", "").with_columns(["repo_id"]),
            TableMeta::new("commits", "custom").with_columns(["cmt_id"]),
            TableMeta::new("message", "").with_columns(["msg_id"]),
        ])
        .unwrap();

        let described = describe_tables(&catalog);
        assert!(described.table("repo").unwrap().description.starts_with("Stores GitHub"));
        assert_eq!(described.table("commits").unwrap().description, "custom");
        assert_eq!(described.table("message").unwrap().description, "");
    }
}
