//! Join Graph
//!
//! Hand-declared foreign-key style hints: `(table, column) -> [tables]`.
//! The graph is a hint for context expansion, not a constraint, and is never
//! inferred from live metadata.

use crate::error::{RagError, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One declared join: `table.column` can be joined to each of `joins`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinEdgeJson {
    pub table: String,
    pub column: String,
    pub joins: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinGraph {
    edges: HashMap<(String, String), Vec<String>>,
}

impl JoinGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge<I, S>(mut self, table: &str, column: &str, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_edge(table, column, targets);
        self
    }

    /// Declare joins for `table.column`. Targets keep first-declared order.
    pub fn add_edge<I, S>(&mut self, table: &str, column: &str, targets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self
            .edges
            .entry((table.to_string(), column.to_string()))
            .or_default();
        for target in targets {
            let target = target.into();
            if !entry.contains(&target) {
                entry.push(target);
            }
        }
    }

    /// Tables reachable from `table.column`, empty if none were declared.
    pub fn targets(&self, table: &str, column: &str) -> &[String] {
        self.edges
            .get(&(table.to_string(), column.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Suffix appended to a column descriptor, e.g. `" Possible joins: repo"`.
    pub fn render_hint(&self, table: &str, column: &str) -> String {
        let targets = self.targets(table, column);
        if targets.is_empty() {
            String::new()
        } else {
            format!(" Possible joins: {}", targets.iter().join(", "))
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Load a list of `{"table", "column", "joins"}` entries.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("failed to read join graph {}: {}", path.display(), e))
        })?;
        let entries: Vec<JoinEdgeJson> = serde_json::from_str(&raw).map_err(|e| {
            RagError::Config(format!("invalid join graph {}: {}", path.display(), e))
        })?;
        let mut graph = Self::new();
        for entry in entries {
            graph.add_edge(&entry.table, &entry.column, entry.joins);
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_and_hint() {
        let graph = JoinGraph::new()
            .with_edge("commits", "repo_id", ["repo"])
            .with_edge("commits", "cmt_ght_author_id", ["contributors", "contributor_affiliations"]);

        assert_eq!(graph.targets("commits", "repo_id"), ["repo"]);
        assert!(graph.targets("repo", "repo_id").is_empty());
        assert_eq!(graph.render_hint("commits", "repo_id"), " Possible joins: repo");
        assert_eq!(
            graph.render_hint("commits", "cmt_ght_author_id"),
            " Possible joins: contributors, contributor_affiliations"
        );
        assert_eq!(graph.render_hint("commits", "cmt_id"), "");
    }

    #[test]
    fn test_case_sensitive_keys() {
        let graph = JoinGraph::new().with_edge("commits", "repo_id", ["repo"]);
        assert!(graph.targets("Commits", "repo_id").is_empty());
    }

    #[test]
    fn test_duplicate_targets_merge() {
        let mut graph = JoinGraph::new();
        graph.add_edge("pull_requests", "repo_id", ["repo"]);
        graph.add_edge("pull_requests", "repo_id", ["repo", "repo_groups"]);
        assert_eq!(graph.targets("pull_requests", "repo_id"), ["repo", "repo_groups"]);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("join_graph_test_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"table": "repo", "column": "repo_group_id", "joins": ["repo_groups"]}]"#,
        )
        .unwrap();

        let graph = JoinGraph::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(graph.targets("repo", "repo_group_id"), ["repo_groups"]);
        assert_eq!(graph.len(), 1);
    }
}
