//! Textual query safety validation and preview rewriting.
//!
//! The validator is a defense-in-depth check, not a SQL parser: it rejects
//! obviously dangerous statements from the raw query text without attempting
//! semantic analysis.

use crate::error::{CompareError, Result};

/// Mutating keywords rejected when they lead a statement.
pub const BLOCKED_KEYWORDS: [&str; 11] = [
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE",
];

/// Validate that a query is a plain SELECT.
///
/// Case-insensitive after trimming. Any blocklisted keyword appearing as a
/// statement-leading token (at the start of the text or after a `;`) is
/// refused with the offending keyword named; anything that does not begin
/// with SELECT is refused outright.
pub fn validate_query_safety(query: &str) -> Result<()> {
    let upper = query.trim().to_uppercase();
    if upper.is_empty() {
        return Err(CompareError::UnsafeQuery("empty query".to_string()));
    }

    for statement in upper.split(';') {
        let Some(leading) = statement.split_whitespace().next() else {
            continue;
        };
        if let Some(keyword) = BLOCKED_KEYWORDS.iter().find(|kw| leading == **kw) {
            return Err(CompareError::UnsafeQuery((*keyword).to_string()));
        }
    }

    if !upper.starts_with("SELECT") {
        return Err(CompareError::UnsafeQuery(
            "only SELECT queries are allowed".to_string(),
        ));
    }

    Ok(())
}

/// Append a bounding clause for preview execution.
///
/// The clause is only added when the query does not already carry one
/// (checked case-insensitively); a trailing semicolon is stripped first.
pub fn add_row_limit(query: &str, limit: usize) -> String {
    let trimmed = query.trim().trim_end_matches(';').trim_end();
    if trimmed.to_uppercase().contains(" LIMIT ") {
        return trimmed.to_string();
    }
    format!("{trimmed} LIMIT {limit}")
}

/// Wrap a query in a `COUNT(*)` subquery to compute the unbounded total.
pub fn count_wrapper(query: &str) -> String {
    let trimmed = query.trim().trim_end_matches(';').trim_end();
    format!("SELECT COUNT(*) AS total_count FROM ({trimmed}) AS count_subquery")
}
