//! Lakeshift Core - SQL dialect migration engine
//!
//! This library rewrites SQL embedded in notebook-export documents from a
//! Redshift-like source dialect to a Databricks-like target dialect, driven
//! by tabular mapping datasets, without touching non-SQL content.
//!
//! # Architecture
//!
//! The engine follows a pipeline architecture:
//! 1. **Loader** - Builds an immutable [`MappingIndex`] from the mapping
//!    datasets, once per run
//! 2. **Scanner** - Locates table-reference and function-call candidates,
//!    respecting string literals, comments, and identifier quoting
//! 3. **Rewrite Engine** - Resolves candidates against the index with a
//!    specificity-ordered policy and rebuilds the SQL
//! 4. **Annotator** - Inserts inert review markers next to anything the
//!    engine refused to rewrite automatically
//! 5. **Change Ledger** - Accumulates every applied and flagged change for
//!    the downstream audit export
//!
//! Everything the engine cannot confidently rewrite is flagged for manual
//! review rather than guessed, and every deviation from blind pass-through
//! appears in the ledger; there is no silent failure mode.

pub mod annotate;
pub mod document;
pub mod error;
pub mod ledger;
pub mod mappings;
pub mod rewrite;
pub mod scan;
pub mod trie;

pub use annotate::{annotate, MARKER_PREFIX};
pub use document::{transform_document, ConnectionRewrite, DocumentOutcome};
pub use error::{Error, Result};
pub use ledger::{
    ChangeLedger, ChangeRecord, ChangeStatus, FlagReason, FlagTag, ReportRow, RuleKind,
};
pub use mappings::{
    normalize_name, split_qualified, ArgumentTransform, Arity, FunctionMapping, MappingCategory,
    MappingIndex, MappingIndexBuilder, TableMapping, TableResolution,
};
pub use rewrite::{RewriteEngine, RewrittenSnippet, SqlSnippet};
pub use scan::{Candidate, CandidateKind, Scanner, ScannerConfig, Span};
pub use trie::{new_path_trie, PathTrie, TrieResult};

/// Rewrite a single SQL string without annotation.
///
/// # Arguments
/// * `sql` - The SQL string to rewrite
/// * `index` - The mapping index to resolve against
///
/// # Returns
/// The rewritten snippet with its change records
///
/// # Example
/// ```
/// use lakeshift_sql::{rewrite_sql, MappingIndex};
///
/// let index = MappingIndex::builtin().unwrap();
/// let result = rewrite_sql("SELECT NVL(a, b)", &index).unwrap();
/// assert_eq!(result.text, "SELECT COALESCE(a, b)");
/// assert_eq!(result.records.len(), 1);
/// ```
pub fn rewrite_sql(sql: &str, index: &MappingIndex) -> Result<RewrittenSnippet> {
    let engine = RewriteEngine::new(index);
    engine.rewrite(&SqlSnippet::new("sql", sql))
}

/// Rewrite a single SQL string and insert review markers for anything
/// flagged.
///
/// # Example
/// ```
/// use lakeshift_sql::{migrate_sql, MappingIndex};
///
/// let index = MappingIndex::builtin().unwrap();
/// let result = migrate_sql("SELECT DATEDIFF(a, b)", &index).unwrap();
/// assert!(result.text.starts_with("-- REVIEW(arity-mismatch)"));
/// ```
pub fn migrate_sql(sql: &str, index: &MappingIndex) -> Result<RewrittenSnippet> {
    let engine = RewriteEngine::new(index);
    let mut result = engine.rewrite(&SqlSnippet::new("sql", sql))?;
    result.text = annotate(&result.text, &result.records);
    Ok(result)
}
