//! Document-level orchestration and the external interface boundary
//!
//! The engine has no opinion on container formats. The container collaborator
//! hands over an ordered sequence of `(snippet id, raw SQL)` pairs; this
//! module runs each snippet through scan -> rewrite -> annotate, collects the
//! ledger, and hands back the text to substitute into each field.
//!
//! A snippet that cannot be scanned (unterminated string or comment) is left
//! verbatim, flagged, and marked; the rest of the document still processes.
//! The shared [`MappingIndex`] is read-only, so independent documents may be
//! transformed on parallel threads against one index.

use crate::annotate::annotate;
use crate::error::Error;
use crate::ledger::{ChangeLedger, ChangeRecord, FlagTag, RuleKind};
use crate::mappings::MappingIndex;
use crate::rewrite::{RewriteEngine, SqlSnippet};
use std::collections::HashSet;
use tracing::{debug, warn};

/// The result of transforming one document
#[derive(Debug)]
pub struct DocumentOutcome {
    /// For each snippet id, the annotated rewritten text to substitute back
    /// into the document, in input order
    pub snippets: Vec<(String, String)>,
    /// Every change applied or flagged across the document
    pub ledger: ChangeLedger,
}

/// Transform every SQL snippet of one document.
///
/// Strictly sequential per snippet; a scan failure isolates that snippet
/// (kept verbatim plus a flag and marker) and never aborts the document.
pub fn transform_document<I>(snippets: I, index: &MappingIndex) -> DocumentOutcome
where
    I: IntoIterator<Item = SqlSnippet>,
{
    let engine = RewriteEngine::new(index);
    let mut ledger = ChangeLedger::new();
    let mut outputs = Vec::new();

    for snippet in snippets {
        match engine.rewrite(&snippet) {
            Ok(rewritten) => {
                let annotated = annotate(&rewritten.text, &rewritten.records);
                ledger.extend(rewritten.records);
                outputs.push((snippet.id, annotated));
            }
            Err(err) => {
                warn!(snippet = %snippet.id, error = %err, "snippet left verbatim");
                let line = match &err {
                    Error::ScanBoundary { line, .. } => *line,
                    _ => 1,
                };
                let record = ChangeRecord::flagged(
                    &snippet.id,
                    &snippet.raw_text,
                    &snippet.raw_text,
                    RuleKind::Unmapped,
                    FlagTag::ScanError,
                    err.to_string(),
                    line,
                );
                let annotated = annotate(&snippet.raw_text, std::slice::from_ref(&record));
                ledger.record(record);
                outputs.push((snippet.id, annotated));
            }
        }
    }

    debug!(
        snippets = outputs.len(),
        applied = ledger.applied_count(),
        flagged = ledger.flagged_count(),
        "transformed document"
    );
    DocumentOutcome {
        snippets: outputs,
        ledger,
    }
}

/// Connection-identifier substitution: a configured set of source identifiers
/// rewritten to a single target identifier wherever a designated
/// connection-reference field equals one of them. Exact string equality only;
/// no pattern scanning.
#[derive(Debug, Clone)]
pub struct ConnectionRewrite {
    sources: HashSet<String>,
    target: String,
}

impl ConnectionRewrite {
    pub fn new<I, S>(sources: I, target: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            target: target.into(),
        }
    }

    /// The replacement for a field value, if it matches a source identifier
    pub fn rewrite(&self, value: &str) -> Option<&str> {
        if self.sources.contains(value) {
            Some(&self.target)
        } else {
            None
        }
    }

    /// Like [`Self::rewrite`], also producing the ledger record for the
    /// substitution
    pub fn rewrite_recorded(
        &self,
        field_id: &str,
        value: &str,
    ) -> Option<(String, ChangeRecord)> {
        self.rewrite(value).map(|target| {
            let record = ChangeRecord::applied(
                field_id,
                value,
                target,
                RuleKind::ConnectionId,
                1,
            );
            (target.to_string(), record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ChangeStatus;
    use crate::mappings::{MappingCategory, MappingIndexBuilder};

    fn test_index() -> MappingIndex {
        let mut builder = MappingIndexBuilder::new();
        builder
            .table("analytics.users", "main.analytics.users", MappingCategory::Direct)
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_scan_failure_isolates_snippet() {
        let index = test_index();
        let outcome = transform_document(
            vec![
                SqlSnippet::new("cell-1", "SELECT 'unterminated"),
                SqlSnippet::new("cell-2", "SELECT * FROM analytics.users"),
            ],
            &index,
        );

        assert_eq!(outcome.snippets.len(), 2);
        // The broken snippet is verbatim apart from its marker.
        assert!(outcome.snippets[0].1.contains("SELECT 'unterminated"));
        assert!(outcome.snippets[0].1.contains("-- REVIEW(scan-error)"));
        // The healthy snippet still converted.
        assert_eq!(outcome.snippets[1].1, "SELECT * FROM main.analytics.users");

        assert_eq!(outcome.ledger.flagged_count(), 1);
        assert_eq!(outcome.ledger.applied_count(), 1);
    }

    #[test]
    fn test_snippet_order_preserved() {
        let index = test_index();
        let outcome = transform_document(
            vec![
                SqlSnippet::new("b", "SELECT 1"),
                SqlSnippet::new("a", "SELECT 2"),
            ],
            &index,
        );
        assert_eq!(outcome.snippets[0].0, "b");
        assert_eq!(outcome.snippets[1].0, "a");
    }

    #[test]
    fn test_connection_rewrite_exact_match_only() {
        let rewrite = ConnectionRewrite::new(
            ["e2694948-2c20-47d3-b127-71448e2bf238"],
            "0196d84e-3399-7000-ba4e-6c93736d59a8",
        );
        assert_eq!(
            rewrite.rewrite("e2694948-2c20-47d3-b127-71448e2bf238"),
            Some("0196d84e-3399-7000-ba4e-6c93736d59a8")
        );
        // Substrings and near-misses never match.
        assert_eq!(rewrite.rewrite("e2694948-2c20-47d3-b127"), None);
        assert_eq!(rewrite.rewrite(" e2694948-2c20-47d3-b127-71448e2bf238"), None);
    }

    #[test]
    fn test_connection_rewrite_record() {
        let rewrite = ConnectionRewrite::new(["old-conn"], "new-conn");
        let (value, record) = rewrite.rewrite_recorded("field-7", "old-conn").unwrap();
        assert_eq!(value, "new-conn");
        assert_eq!(record.snippet_id, "field-7");
        assert_eq!(record.rule, RuleKind::ConnectionId);
        assert_eq!(record.status, ChangeStatus::Applied);
    }
}
