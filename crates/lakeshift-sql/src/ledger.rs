//! Change ledger: accumulation of applied and flagged rewrites
//!
//! The ledger decouples reporting from rewriting. The rewrite engine emits
//! [`ChangeRecord`]s with no I/O of its own; callers feed them into a
//! [`ChangeLedger`] and hand the ledger rows to whatever renders the audit
//! export.

use serde::{Deserialize, Serialize};

/// Which class of rule produced a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// A table-reference mapping fired
    TableMapping,
    /// A function mapping fired
    FunctionMapping,
    /// A connection-identifier substitution fired
    ConnectionId,
    /// No rule fired; the construct was flagged for manual review
    Unmapped,
}

/// Whether a change was applied automatically or needs human review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Applied,
    Flagged,
}

/// Stable tags for flagged changes, used by the annotator's inline markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagTag {
    /// A function call's argument count did not match the mapping's arity
    ArityMismatch,
    /// A restructuring template was applied; equivalence needs human review
    Restructured,
    /// The table mapping is marked complex and has no automatic rewrite
    ComplexMapping,
    /// Equally specific mapping rules disagree on the target
    AmbiguousMapping,
    /// A construct on the known-unsupported list (e.g. QUALIFY)
    UnsupportedConstruct,
    /// The snippet could not be scanned and was left verbatim
    ScanError,
}

impl FlagTag {
    /// The stable tag string used inside marker comments
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagTag::ArityMismatch => "arity-mismatch",
            FlagTag::Restructured => "restructured",
            FlagTag::ComplexMapping => "complex-mapping",
            FlagTag::AmbiguousMapping => "ambiguous-mapping",
            FlagTag::UnsupportedConstruct => "unsupported-construct",
            FlagTag::ScanError => "scan-error",
        }
    }
}

/// Why a change was flagged for manual review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagReason {
    pub tag: FlagTag,
    pub message: String,
}

/// One individual transformation (applied or flagged) in a snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Id of the snippet the change belongs to
    pub snippet_id: String,
    /// The fragment as it appeared in the input
    pub original: String,
    /// The fragment after rewriting (equals `original` for flagged
    /// pass-throughs)
    pub rewritten: String,
    /// Which class of rule fired
    pub rule: RuleKind,
    /// Applied automatically, or flagged for review
    pub status: ChangeStatus,
    /// Present iff `status` is `Flagged`
    pub flag: Option<FlagReason>,
    /// Line of the fragment in the snippet (1-based), for marker placement
    pub line: usize,
}

impl ChangeRecord {
    /// Create an applied record
    pub fn applied(
        snippet_id: impl Into<String>,
        original: impl Into<String>,
        rewritten: impl Into<String>,
        rule: RuleKind,
        line: usize,
    ) -> Self {
        Self {
            snippet_id: snippet_id.into(),
            original: original.into(),
            rewritten: rewritten.into(),
            rule,
            status: ChangeStatus::Applied,
            flag: None,
            line,
        }
    }

    /// Create a flagged record
    pub fn flagged(
        snippet_id: impl Into<String>,
        original: impl Into<String>,
        rewritten: impl Into<String>,
        rule: RuleKind,
        tag: FlagTag,
        message: impl Into<String>,
        line: usize,
    ) -> Self {
        Self {
            snippet_id: snippet_id.into(),
            original: original.into(),
            rewritten: rewritten.into(),
            rule,
            status: ChangeStatus::Flagged,
            flag: Some(FlagReason {
                tag,
                message: message.into(),
            }),
            line,
        }
    }

    /// Whether this record needs manual review
    pub fn is_flagged(&self) -> bool {
        self.status == ChangeStatus::Flagged
    }
}

/// A row of the audit export.
///
/// Column order and presence of all fields is a compatibility contract with
/// the downstream report generation; do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub snippet_id: String,
    pub original: String,
    pub rewritten: String,
    pub rule: RuleKind,
    pub status: ChangeStatus,
}

/// Append-only accumulator of change records for one document transform
#[derive(Debug, Default)]
pub struct ChangeLedger {
    records: Vec<ChangeRecord>,
}

impl ChangeLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn record(&mut self, record: ChangeRecord) {
        self.records.push(record);
    }

    /// Append a batch of records
    pub fn extend(&mut self, records: impl IntoIterator<Item = ChangeRecord>) {
        self.records.extend(records);
    }

    /// All records in insertion order
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Records grouped by snippet id, groups ordered by first appearance
    pub fn summary(&self) -> Vec<(&str, Vec<&ChangeRecord>)> {
        let mut groups: Vec<(&str, Vec<&ChangeRecord>)> = Vec::new();
        for record in &self.records {
            match groups.iter_mut().find(|g| g.0 == record.snippet_id) {
                Some(g) => g.1.push(record),
                None => groups.push((record.snippet_id.as_str(), vec![record])),
            }
        }
        groups
    }

    /// The audit-export rows, in record order
    pub fn rows(&self) -> Vec<ReportRow> {
        self.records
            .iter()
            .map(|r| ReportRow {
                snippet_id: r.snippet_id.clone(),
                original: r.original.clone(),
                rewritten: r.rewritten.clone(),
                rule: r.rule,
                status: r.status,
            })
            .collect()
    }

    /// Number of applied records
    pub fn applied_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == ChangeStatus::Applied)
            .count()
    }

    /// Number of flagged records
    pub fn flagged_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_flagged()).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied(snippet: &str) -> ChangeRecord {
        ChangeRecord::applied(snippet, "a.b", "c.a.b", RuleKind::TableMapping, 1)
    }

    #[test]
    fn test_summary_groups_by_first_appearance() {
        let mut ledger = ChangeLedger::new();
        ledger.record(applied("cell-2"));
        ledger.record(applied("cell-1"));
        ledger.record(applied("cell-2"));

        let summary = ledger.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].0, "cell-2");
        assert_eq!(summary[0].1.len(), 2);
        assert_eq!(summary[1].0, "cell-1");
    }

    #[test]
    fn test_counts() {
        let mut ledger = ChangeLedger::new();
        ledger.record(applied("cell-1"));
        ledger.record(ChangeRecord::flagged(
            "cell-1",
            "LISTAGG(x)",
            "LISTAGG(x)",
            RuleKind::FunctionMapping,
            FlagTag::ArityMismatch,
            "LISTAGG expects 2 arguments, found 1",
            3,
        ));

        assert_eq!(ledger.applied_count(), 1);
        assert_eq!(ledger.flagged_count(), 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_rows_preserve_contract_fields() {
        let mut ledger = ChangeLedger::new();
        ledger.record(applied("cell-1"));
        let rows = ledger.rows();
        assert_eq!(rows[0].snippet_id, "cell-1");
        assert_eq!(rows[0].original, "a.b");
        assert_eq!(rows[0].rewritten, "c.a.b");
        assert_eq!(rows[0].rule, RuleKind::TableMapping);
        assert_eq!(rows[0].status, ChangeStatus::Applied);
    }
}
