//! Rewrite engine: resolves scan candidates against the mapping index and
//! produces rewritten SQL plus change records
//!
//! Rewriting is a single left-to-right pass over the candidates of one scan.
//! The output is built by segment accumulation against offsets in the
//! original text, so earlier substitutions can never shift later ones, and
//! the engine never re-scans its own output. Function arguments are the one
//! recursion point: the argument spans of a call are rewritten with a fresh
//! scan of their text before the call itself is reassembled.
//!
//! The engine fails closed. A call whose argument count contradicts the
//! mapping arity is left verbatim and flagged; equally specific conflicting
//! table rules are flagged, never guessed.

use crate::error::Result;
use crate::ledger::{ChangeRecord, FlagTag, RuleKind};
use crate::mappings::{ArgumentTransform, MappingIndex, TableResolution};
use crate::scan::{Candidate, CandidateKind, Scanner};
use tracing::debug;

/// A chunk of SQL pulled out of a document by the container collaborator.
/// Owned transiently for the duration of one transform call.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlSnippet {
    /// Reference back to the owning document field
    pub id: String,
    pub raw_text: String,
}

impl SqlSnippet {
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_text: raw_text.into(),
        }
    }
}

/// The result of rewriting one snippet
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenSnippet {
    pub snippet_id: String,
    /// The rewritten SQL (not yet annotated; see [`crate::annotate`])
    pub text: String,
    /// Every change applied or flagged, in resolution order
    pub records: Vec<ChangeRecord>,
}

/// Applies mapping rules to scanned SQL
pub struct RewriteEngine<'a> {
    index: &'a MappingIndex,
    scanner: Scanner,
}

impl<'a> RewriteEngine<'a> {
    /// Create an engine over an index, with the default scanner
    pub fn new(index: &'a MappingIndex) -> Self {
        Self::with_scanner(index, Scanner::default_config())
    }

    /// Create an engine with a custom scanner configuration
    pub fn with_scanner(index: &'a MappingIndex, scanner: Scanner) -> Self {
        Self { index, scanner }
    }

    /// Rewrite one snippet.
    ///
    /// Deterministic for a given input and mapping table snapshot. Fails only
    /// on scan boundary errors; every mapping miss or refusal is expressed as
    /// a record, not an error.
    pub fn rewrite(&self, snippet: &SqlSnippet) -> Result<RewrittenSnippet> {
        let mut records = Vec::new();
        let text = self.rewrite_text(&snippet.raw_text, 1, &snippet.id, &mut records)?;
        debug!(
            snippet = %snippet.id,
            changes = records.len(),
            "rewrote snippet"
        );
        Ok(RewrittenSnippet {
            snippet_id: snippet.id.clone(),
            text,
            records,
        })
    }

    fn rewrite_text(
        &self,
        sql: &str,
        base_line: usize,
        snippet_id: &str,
        records: &mut Vec<ChangeRecord>,
    ) -> Result<String> {
        let candidates = self.scanner.scan(sql)?;
        let mut out = String::with_capacity(sql.len());
        let mut cursor = 0usize;
        for candidate in &candidates {
            out.push_str(&sql[cursor..candidate.span.start]);
            let line = base_line + candidate.span.line - 1;
            let replacement = match candidate.kind {
                CandidateKind::TableRef => {
                    self.rewrite_table(candidate, line, snippet_id, records)
                }
                CandidateKind::FunctionCall => {
                    self.rewrite_call(sql, candidate, base_line, line, snippet_id, records)?
                }
                CandidateKind::UnsupportedConstruct => {
                    let keyword = candidate
                        .segments
                        .first()
                        .map(|s| s.as_str())
                        .unwrap_or(candidate.text.as_str());
                    let message = self
                        .scanner
                        .config()
                        .flag_reason(keyword)
                        .unwrap_or("construct requires manual review")
                        .to_string();
                    records.push(ChangeRecord::flagged(
                        snippet_id,
                        &candidate.text,
                        &candidate.text,
                        RuleKind::Unmapped,
                        FlagTag::UnsupportedConstruct,
                        message,
                        line,
                    ));
                    candidate.text.clone()
                }
                CandidateKind::ConnectionLiteral => candidate.text.clone(),
            };
            out.push_str(&replacement);
            cursor = candidate.span.end;
        }
        out.push_str(&sql[cursor..]);
        Ok(out)
    }

    /// Resolve a reference chain, longest leading sub-chain first, so the
    /// `schema.table` part of `schema.table.column` still rewrites.
    fn rewrite_table(
        &self,
        candidate: &Candidate,
        line: usize,
        snippet_id: &str,
        records: &mut Vec<ChangeRecord>,
    ) -> String {
        for take in (1..=candidate.segments.len()).rev() {
            let resolution = self.index.resolve_table(&candidate.segments[..take]);
            if resolution == TableResolution::Unmatched {
                continue;
            }

            // Text of the matched sub-chain and whatever trails it (`.column`).
            let prefix_len = candidate.segment_ends[take - 1] - candidate.span.start;
            let matched = &candidate.text[..prefix_len];
            let rest = &candidate.text[prefix_len..];

            return match resolution {
                TableResolution::Unmatched => unreachable!(),
                TableResolution::Mapped(mapping) => {
                    records.push(ChangeRecord::applied(
                        snippet_id,
                        matched,
                        &mapping.target,
                        RuleKind::TableMapping,
                        line,
                    ));
                    format!("{}{}", mapping.target, rest)
                }
                TableResolution::Unsupported(mapping) => {
                    records.push(ChangeRecord::flagged(
                        snippet_id,
                        matched,
                        matched,
                        RuleKind::TableMapping,
                        FlagTag::ComplexMapping,
                        format!("`{}` has no automatic rewrite; migrate manually", mapping.source),
                        line,
                    ));
                    candidate.text.clone()
                }
                TableResolution::Ambiguous(mappings) => {
                    let targets: Vec<&str> = mappings.iter().map(|m| m.target.as_str()).collect();
                    records.push(ChangeRecord::flagged(
                        snippet_id,
                        matched,
                        matched,
                        RuleKind::TableMapping,
                        FlagTag::AmbiguousMapping,
                        format!(
                            "`{}` matches {} equally specific rules ({}); qualify the reference or fix the mapping data",
                            matched,
                            mappings.len(),
                            targets.join(", ")
                        ),
                        line,
                    ));
                    candidate.text.clone()
                }
            };
        }
        // References no rule covers may not be warehouse objects at all;
        // they pass through without a record.
        candidate.text.clone()
    }

    fn rewrite_call(
        &self,
        sql: &str,
        candidate: &Candidate,
        base_line: usize,
        line: usize,
        snippet_id: &str,
        records: &mut Vec<ChangeRecord>,
    ) -> Result<String> {
        let name = match candidate.segments.last() {
            Some(name) => name,
            None => return Ok(candidate.text.clone()),
        };

        let mapping = match self.index.resolve_function(name) {
            Some(mapping) => mapping,
            // Unrecognized call: keep the name, still rewrite the argument
            // interiors, emit no record for the call itself.
            None => return self.splice_call(sql, candidate, None, base_line, snippet_id, records),
        };

        match &mapping.transform {
            ArgumentTransform::Identity => {
                let rebuilt = self.splice_call(
                    sql,
                    candidate,
                    Some(mapping.target.as_str()),
                    base_line,
                    snippet_id,
                    records,
                )?;
                records.push(ChangeRecord::applied(
                    snippet_id,
                    &candidate.text,
                    &rebuilt,
                    RuleKind::FunctionMapping,
                    line,
                ));
                Ok(rebuilt)
            }
            ArgumentTransform::Reorder(positions) => {
                let arity = mapping.transform.arity();
                if !arity.matches(candidate.args.len()) {
                    records.push(self.arity_mismatch(
                        snippet_id, candidate, name, &arity.describe(), line,
                    ));
                    return Ok(candidate.text.clone());
                }
                let args = self.rewrite_args(sql, candidate, base_line, snippet_id, records)?;
                let reordered: Vec<&str> =
                    positions.iter().map(|&p| args[p - 1].as_str()).collect();
                let rebuilt = format!("{}({})", mapping.target, reordered.join(", "));
                records.push(ChangeRecord::applied(
                    snippet_id,
                    &candidate.text,
                    &rebuilt,
                    RuleKind::FunctionMapping,
                    line,
                ));
                Ok(rebuilt)
            }
            ArgumentTransform::Restructure(template) => {
                let arity = mapping.transform.arity();
                if !arity.matches(candidate.args.len()) {
                    records.push(self.arity_mismatch(
                        snippet_id, candidate, name, &arity.describe(), line,
                    ));
                    return Ok(candidate.text.clone());
                }
                let args = self.rewrite_args(sql, candidate, base_line, snippet_id, records)?;
                let rebuilt = expand_template(template, &args);
                let mut message = format!("restructured `{}`; verify semantic equivalence", name);
                if !mapping.notes.is_empty() {
                    message.push_str(": ");
                    message.push_str(&mapping.notes);
                }
                records.push(ChangeRecord::flagged(
                    snippet_id,
                    &candidate.text,
                    &rebuilt,
                    RuleKind::FunctionMapping,
                    FlagTag::Restructured,
                    message,
                    line,
                ));
                Ok(rebuilt)
            }
        }
    }

    fn arity_mismatch(
        &self,
        snippet_id: &str,
        candidate: &Candidate,
        name: &str,
        expected: &str,
        line: usize,
    ) -> ChangeRecord {
        ChangeRecord::flagged(
            snippet_id,
            &candidate.text,
            &candidate.text,
            RuleKind::FunctionMapping,
            FlagTag::ArityMismatch,
            format!(
                "{} expects {} arguments, found {}",
                name,
                expected,
                candidate.args.len()
            ),
            line,
        )
    }

    /// Reassemble a call in place, optionally renaming it, preserving the
    /// original punctuation and whitespace around arguments.
    fn splice_call(
        &self,
        sql: &str,
        candidate: &Candidate,
        new_name: Option<&str>,
        base_line: usize,
        snippet_id: &str,
        records: &mut Vec<ChangeRecord>,
    ) -> Result<String> {
        let mut out = String::with_capacity(candidate.text.len());
        match new_name {
            Some(name) => out.push_str(name),
            None => out.push_str(&sql[candidate.span.start..candidate.name_end]),
        }
        let mut cursor = candidate.name_end;
        for span in &candidate.args {
            out.push_str(&sql[cursor..span.start]);
            let inner_line = base_line + span.line - 1;
            let rewritten =
                self.rewrite_text(&sql[span.start..span.end], inner_line, snippet_id, records)?;
            out.push_str(&rewritten);
            cursor = span.end;
        }
        out.push_str(&sql[cursor..candidate.span.end]);
        Ok(out)
    }

    /// Rewrite each argument's interior, trimmed, for reassembly in a new
    /// shape.
    fn rewrite_args(
        &self,
        sql: &str,
        candidate: &Candidate,
        base_line: usize,
        snippet_id: &str,
        records: &mut Vec<ChangeRecord>,
    ) -> Result<Vec<String>> {
        let mut args = Vec::with_capacity(candidate.args.len());
        for span in &candidate.args {
            let inner_line = base_line + span.line - 1;
            let text = sql[span.start..span.end].trim();
            args.push(self.rewrite_text(text, inner_line, snippet_id, records)?);
        }
        Ok(args)
    }
}

/// Expand a restructure template: `{n}` is the nth original argument
/// (1-based), `{*}` is all of them comma-separated. Unrecognized braces pass
/// through literally.
fn expand_template(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => {
                let inner = &rest[open + 1..open + close];
                if inner == "*" {
                    out.push_str(&args.join(", "));
                } else if let Ok(n) = inner.parse::<usize>() {
                    if n >= 1 && n <= args.len() {
                        out.push_str(&args[n - 1]);
                    }
                } else {
                    out.push_str(&rest[open..open + close + 1]);
                }
                rest = &rest[open + close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
