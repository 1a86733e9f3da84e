//! Column-meaning inference
//!
//! Adds a short semantic tag to each column's embedded text so that lexically
//! close columns (`repo_id` vs `cntrb_id`) land apart in vector space.

use lazy_static::lazy_static;
use regex::Regex;

/// Ordered `(pattern, meaning)` table. The first match wins, so exact Augur
/// column names come before the generic prefix/suffix rules.
const MEANING_PATTERNS: &[(&str, &str)] = &[
    (r"^repo_id$", "repository identifier (join with repo)"),
    (r"^cntrb_id$", "contributor identifier (join with contributors)"),
    (r"^cmt_ght_author_id$", "commit author (join with contributors)"),
    (r"^pull_request_id$", "pull request identifier (join with pull_requests)"),
    (r"^pr_cntrb_id$", "pull request contributor (join with contributors)"),
    (r"^repo_group_id$", "repository group identifier (join with repo_groups)"),
    (r"^repo_name$", "repository name"),
    (r"^cntrb_login$", "contributor username/login"),
    (r"^cntrb_email$", "contributor email address"),
    (r"^pr_src_state$", "pull request status (open/closed)"),
    (r"_id$", "unique identifier"),
    (r"_at$", "timestamp when event occurred"),
    (r"_(timestamp|date)$", "date or time of the event"),
    (r"^cntrb_", "contributor attribute"),
    (r"^cmt_", "commit attribute"),
    (r"^pr_", "pull request attribute"),
];

lazy_static! {
    static ref COMPILED_PATTERNS: Vec<(Regex, &'static str)> = MEANING_PATTERNS
        .iter()
        .map(|(pattern, meaning)| (Regex::new(pattern).unwrap(), *meaning))
        .collect();
}

/// Semantic tag for `column_name` of `table_name`. Pure and total.
pub fn infer_meaning(column_name: &str, table_name: &str) -> String {
    let col = column_name.to_lowercase();

    if let Some((_, meaning)) = COMPILED_PATTERNS.iter().find(|(re, _)| re.is_match(&col)) {
        return (*meaning).to_string();
    }

    let fallback = format!("{} {}", table_name, column_name.replace('_', " "));
    if fallback.trim().is_empty() {
        "column".to_string()
    } else {
        fallback
    }
}
