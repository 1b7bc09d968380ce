//! Mapping tables: loading, normalization, and longest-match lookup
//!
//! Two tabular datasets drive the engine: table-reference mappings
//! (`source,target,category`) and function mappings
//! (`source,target,transform,notes`). Both are loaded once per run into an
//! immutable [`MappingIndex`]; the index is read-only after load, so a batch
//! runner can share one instance across parallel document workers without
//! locking.
//!
//! Table resolution is specificity-ordered: an exact fully-qualified match
//! wins, then the rule with the longest qualified path whose trailing
//! segments equal the reference. Equally specific conflicting rules are
//! surfaced, never silently resolved.

use crate::error::{Error, Result};
use crate::trie::PathTrie;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, warn};

/// How a table mapping was produced, from the reference dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingCategory {
    /// Plain one-to-one rename of the qualified name
    Direct,
    /// Target was restructured (e.g. schema split across catalogs)
    Restructure,
    /// Object was renamed during migration
    Rename,
    /// No automatic rewrite; references are flagged for manual review
    Complex,
}

impl MappingCategory {
    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "direct" => Some(MappingCategory::Direct),
            "restructure" => Some(MappingCategory::Restructure),
            "rename" => Some(MappingCategory::Rename),
            "complex" => Some(MappingCategory::Complex),
            _ => None,
        }
    }
}

/// One table-reference rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMapping {
    /// Source qualified name (schema.table or catalog.schema.table)
    pub source: String,
    /// Target qualified name
    pub target: String,
    pub category: MappingCategory,
}

/// How a function mapping treats the argument list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentTransform {
    /// Rename only; arguments pass through untouched
    Identity,
    /// Re-emit arguments in a new order. Positions are 1-based indices into
    /// the original argument list; the highest position is the expected
    /// arity.
    Reorder(Vec<usize>),
    /// Substitute into a template. `{1}`..`{n}` reference original
    /// arguments, `{*}` expands to all of them comma-separated. Always
    /// flagged for review even on success.
    Restructure(String),
}

/// Argument-count constraint implied by a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Any,
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    /// Whether an observed argument count satisfies this constraint
    pub fn matches(&self, count: usize) -> bool {
        match self {
            Arity::Any => true,
            Arity::Exact(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
        }
    }

    /// Render a human-readable arity descriptor
    pub fn describe(&self) -> String {
        match self {
            Arity::Any => "any number of".to_string(),
            Arity::Exact(n) => n.to_string(),
            Arity::AtLeast(n) => format!("at least {}", n),
        }
    }
}

impl ArgumentTransform {
    /// Parse the dataset encoding: `identity`, `reorder(3,2)`, or
    /// `template(...)`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("identity") || text.is_empty() {
            return Some(ArgumentTransform::Identity);
        }
        let lower = text.to_lowercase();
        if lower.starts_with("reorder(") && text.ends_with(')') {
            let body = &text["reorder(".len()..text.len() - 1];
            let mut positions = Vec::new();
            for part in body.split(',') {
                let pos: usize = part.trim().parse().ok()?;
                if pos == 0 {
                    return None;
                }
                positions.push(pos);
            }
            if positions.is_empty() {
                return None;
            }
            return Some(ArgumentTransform::Reorder(positions));
        }
        if lower.starts_with("template(") && text.ends_with(')') {
            let body = &text["template(".len()..text.len() - 1];
            if body.trim().is_empty() {
                return None;
            }
            return Some(ArgumentTransform::Restructure(body.to_string()));
        }
        None
    }

    /// The argument count this transform expects
    pub fn arity(&self) -> Arity {
        match self {
            ArgumentTransform::Identity => Arity::Any,
            ArgumentTransform::Reorder(positions) => {
                Arity::Exact(positions.iter().copied().max().unwrap_or(0))
            }
            ArgumentTransform::Restructure(template) => {
                let (max_index, has_star) = template_refs(template);
                if has_star {
                    Arity::AtLeast(max_index)
                } else {
                    Arity::Exact(max_index)
                }
            }
        }
    }
}

/// Scan a restructure template for `{n}` and `{*}` placeholders
pub(crate) fn template_refs(template: &str) -> (usize, bool) {
    let mut max_index = 0;
    let mut has_star = false;
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(close) = template[i..].find('}') {
                let inner = &template[i + 1..i + close];
                if inner == "*" {
                    has_star = true;
                } else if let Ok(n) = inner.parse::<usize>() {
                    max_index = max_index.max(n);
                }
                i += close + 1;
                continue;
            }
        }
        i += 1;
    }
    (max_index, has_star)
}

/// One function rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMapping {
    /// Source function name
    pub source: String,
    /// Target function name (unused for `Restructure`, where the template
    /// carries the full replacement)
    pub target: String,
    pub transform: ArgumentTransform,
    /// Free-form notes from the dataset, echoed into review markers
    pub notes: String,
}

/// Case-normalize an identifier for mapping lookup
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Split a dotted qualified name into segments, stripping identifier quotes
pub fn split_qualified(name: &str) -> Vec<String> {
    name.split('.')
        .map(|s| s.trim().trim_matches('"').trim_matches('`').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct TableRow {
    source: String,
    target: String,
    category: String,
}

#[derive(Debug, Deserialize)]
struct FunctionRow {
    source: String,
    target: String,
    transform: String,
    #[serde(default)]
    notes: String,
}

/// Outcome of resolving a table reference against the index
#[derive(Debug, Clone, PartialEq)]
pub enum TableResolution<'a> {
    /// No rule applies; the reference is out of scope and passes through
    Unmatched,
    /// A rule applies and can be rewritten automatically
    Mapped(&'a TableMapping),
    /// A rule applies but is marked complex; flag, don't rewrite
    Unsupported(&'a TableMapping),
    /// Equally specific rules disagree on the target; flag, don't guess
    Ambiguous(Vec<&'a TableMapping>),
}

/// Incrementally builds a [`MappingIndex`], enforcing key uniqueness.
///
/// Used by the CSV loader, by programmatic registration (tests, built-in
/// catalogs), and as the sink for `lakeshift-sql-mappings`.
#[derive(Debug, Default)]
pub struct MappingIndexBuilder {
    tables: Vec<TableMapping>,
    exact: HashMap<String, usize>,
    functions: HashMap<String, FunctionMapping>,
    deferred: Option<Error>,
}

impl MappingIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table rule. Rows that normalize to an existing key must agree
    /// with it exactly; a conflicting target is a [`Error::DuplicateKey`].
    pub fn table(
        &mut self,
        source: &str,
        target: &str,
        category: MappingCategory,
    ) -> Result<()> {
        let key = split_qualified(&normalize_name(source)).join(".");
        if key.is_empty() {
            return Err(Error::malformed_mapping(
                format!("empty table mapping source `{}`", source),
                0,
            ));
        }
        if let Some(&idx) = self.exact.get(&key) {
            let existing = &self.tables[idx];
            if existing.target == target && existing.category == category {
                warn!(key = %key, "duplicate identical table mapping row ignored");
                return Ok(());
            }
            return Err(Error::duplicate_key(key, existing.target.clone(), target));
        }
        self.tables.push(TableMapping {
            source: source.to_string(),
            target: target.to_string(),
            category,
        });
        self.exact.insert(key, self.tables.len() - 1);
        Ok(())
    }

    /// Add a function rule. Same uniqueness policy as [`Self::table`].
    pub fn function(
        &mut self,
        source: &str,
        target: &str,
        transform: ArgumentTransform,
        notes: &str,
    ) -> Result<()> {
        let key = normalize_name(source);
        if key.is_empty() {
            return Err(Error::malformed_mapping("empty function mapping source", 0));
        }
        if let Some(existing) = self.functions.get(&key) {
            if existing.target == target && existing.transform == transform {
                warn!(key = %key, "duplicate identical function mapping row ignored");
                return Ok(());
            }
            return Err(Error::duplicate_key(key, existing.target.clone(), target));
        }
        self.functions.insert(
            key,
            FunctionMapping {
                source: source.to_string(),
                target: target.to_string(),
                transform,
                notes: notes.to_string(),
            },
        );
        Ok(())
    }

    /// Finish the index. Fails if any deferred registration error occurred.
    pub fn build(mut self) -> Result<MappingIndex> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        let mut suffix = PathTrie::new();
        for (idx, mapping) in self.tables.iter().enumerate() {
            let mut segments = split_qualified(&normalize_name(&mapping.source));
            segments.reverse();
            suffix.insert(&segments, idx);
        }
        debug!(
            tables = self.tables.len(),
            functions = self.functions.len(),
            "built mapping index"
        );
        Ok(MappingIndex {
            tables: self.tables,
            exact: self.exact,
            suffix,
            functions: self.functions,
        })
    }
}

impl lakeshift_sql_mappings::MappingSink for MappingIndexBuilder {
    fn table(&mut self, source: &str, target: &str, category: &str) {
        let result = match MappingCategory::parse(category) {
            Some(category) => MappingIndexBuilder::table(self, source, target, category),
            None => Err(Error::malformed_mapping(
                format!("unknown table mapping category `{}`", category),
                0,
            )),
        };
        if let Err(err) = result {
            self.deferred.get_or_insert(err);
        }
    }

    fn function(&mut self, source: &str, target: &str, transform: &str, notes: &str) {
        let result = match ArgumentTransform::parse(transform) {
            Some(transform) => MappingIndexBuilder::function(self, source, target, transform, notes),
            None => Err(Error::malformed_mapping(
                format!("unparseable argument transform `{}`", transform),
                0,
            )),
        };
        if let Err(err) = result {
            self.deferred.get_or_insert(err);
        }
    }
}

/// Immutable lookup structure over both mapping tables.
///
/// Thread-safe by construction: read-only after [`MappingIndex::load`]
/// completes, so it can be shared by reference across parallel workers.
#[derive(Debug)]
pub struct MappingIndex {
    tables: Vec<TableMapping>,
    /// Normalized fully-qualified name -> index into `tables`
    exact: HashMap<String, usize>,
    /// Reversed-segment trie for partially-qualified resolution
    suffix: PathTrie<usize>,
    /// Normalized function name -> rule
    functions: HashMap<String, FunctionMapping>,
}

impl MappingIndex {
    /// Load both mapping tables from CSV sources.
    ///
    /// Expected headers: `source,target,category` for tables and
    /// `source,target,transform,notes` for functions. Fails with
    /// [`Error::MalformedMapping`] on a bad row and [`Error::DuplicateKey`]
    /// on conflicting rules; both abort the run before any document is
    /// processed.
    pub fn load<T: Read, F: Read>(table_source: T, function_source: F) -> Result<Self> {
        let mut builder = MappingIndexBuilder::new();

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(table_source);
        for (i, row) in reader.deserialize::<TableRow>().enumerate() {
            let row_number = (i + 2) as u64; // 1-based, after the header
            let row = row.map_err(|e| {
                Error::malformed_mapping(format!("bad table mapping row: {}", e), row_number)
            })?;
            if row.source.is_empty() || row.target.is_empty() {
                return Err(Error::malformed_mapping(
                    "table mapping row is missing source or target",
                    row_number,
                ));
            }
            let category = MappingCategory::parse(&row.category).ok_or_else(|| {
                Error::malformed_mapping(
                    format!("unknown table mapping category `{}`", row.category),
                    row_number,
                )
            })?;
            builder.table(&row.source, &row.target, category)?;
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(function_source);
        for (i, row) in reader.deserialize::<FunctionRow>().enumerate() {
            let row_number = (i + 2) as u64;
            let row = row.map_err(|e| {
                Error::malformed_mapping(format!("bad function mapping row: {}", e), row_number)
            })?;
            if row.source.is_empty() || row.target.is_empty() {
                return Err(Error::malformed_mapping(
                    "function mapping row is missing source or target",
                    row_number,
                ));
            }
            let transform = ArgumentTransform::parse(&row.transform).ok_or_else(|| {
                Error::malformed_mapping(
                    format!("unparseable argument transform `{}`", row.transform),
                    row_number,
                )
            })?;
            builder.function(&row.source, &row.target, transform, &row.notes)?;
        }

        builder.build()
    }

    /// Build an index from the built-in Redshift -> Databricks catalogs in
    /// `lakeshift-sql-mappings`.
    pub fn builtin() -> Result<Self> {
        let mut builder = MappingIndexBuilder::new();
        lakeshift_sql_mappings::redshift_databricks::register(&mut builder);
        builder.build()
    }

    /// Resolve a table reference given its raw segments.
    ///
    /// Precedence: exact fully-qualified match, then documented-unsupported
    /// schema (a one-part `Complex` rule matching the leading qualifier),
    /// then the most specific rule whose trailing segments equal the
    /// reference.
    pub fn resolve_table<S: AsRef<str>>(&self, segments: &[S]) -> TableResolution<'_> {
        if segments.is_empty() {
            return TableResolution::Unmatched;
        }
        let normalized: Vec<String> = segments
            .iter()
            .map(|s| normalize_name(s.as_ref()))
            .collect();

        let full = normalized.join(".");
        if let Some(&idx) = self.exact.get(&full) {
            return self.categorize(idx);
        }

        if normalized.len() > 1 {
            if let Some(&idx) = self.exact.get(&normalized[0]) {
                if self.tables[idx].category == MappingCategory::Complex {
                    return TableResolution::Unsupported(&self.tables[idx]);
                }
            }
        }

        let reversed: Vec<&str> = normalized.iter().rev().map(|s| s.as_str()).collect();
        if let Some(node) = self.suffix.descend(&reversed) {
            let (_, values) = node.deepest_values();
            if !values.is_empty() {
                let mappings: Vec<&TableMapping> =
                    values.iter().map(|&&idx| &self.tables[idx]).collect();
                let first_target = normalize_name(&mappings[0].target);
                if mappings
                    .iter()
                    .all(|m| normalize_name(&m.target) == first_target)
                {
                    return self.categorize(*values[0]);
                }
                return TableResolution::Ambiguous(mappings);
            }
        }

        TableResolution::Unmatched
    }

    fn categorize(&self, idx: usize) -> TableResolution<'_> {
        let mapping = &self.tables[idx];
        if mapping.category == MappingCategory::Complex {
            TableResolution::Unsupported(mapping)
        } else {
            TableResolution::Mapped(mapping)
        }
    }

    /// Look up a function rule by name
    pub fn resolve_function(&self, name: &str) -> Option<&FunctionMapping> {
        self.functions.get(&normalize_name(name))
    }

    /// Number of table rules
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Number of function rules
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.functions.is_empty()
    }
}
