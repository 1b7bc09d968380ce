//! Inline review markers for flagged changes
//!
//! Every flagged change gets a marker comment inserted on its own line
//! immediately above the affected SQL. Markers are inert to execution (plain
//! `--` comments in the target dialect) and carry a stable tag plus a
//! one-line reason, e.g.:
//!
//! ```sql
//! -- REVIEW(arity-mismatch): DATEDIFF expects 3 arguments, found 2
//! SELECT DATEDIFF(a, b)
//! ```
//!
//! Annotation is idempotent: a marker is skipped when an identical one
//! already sits against the same line.

use crate::ledger::ChangeRecord;
use std::collections::BTreeMap;

/// Prefix every marker comment starts with (after indentation)
pub const MARKER_PREFIX: &str = "-- REVIEW(";

/// Insert review markers for every flagged record into `text`.
///
/// Records are grouped by line and inserted bottom-up so earlier insertions
/// never shift later targets. Lines outside the text are clamped to the last
/// line.
pub fn annotate(text: &str, records: &[ChangeRecord]) -> String {
    let mut by_line: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_flagged()) {
        let flag = match &record.flag {
            Some(flag) => flag,
            None => continue,
        };
        let marker = format!("{}{}): {}", MARKER_PREFIX, flag.tag.as_str(), flag.message);
        by_line
            .entry(record.line.saturating_sub(1))
            .or_default()
            .push(marker);
    }
    if by_line.is_empty() {
        return text.to_string();
    }

    let had_trailing_newline = text.ends_with('\n');
    let mut lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
    if lines.is_empty() {
        lines.push(String::new());
    }

    for (line_idx, markers) in by_line.into_iter().rev() {
        let line_idx = line_idx.min(lines.len() - 1);
        let indent: String = lines[line_idx]
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect();

        // Existing markers against this line: the run of marker lines
        // directly above it, plus any marker lines sitting at the insertion
        // point itself.
        let mut existing = Vec::new();
        let mut above = line_idx;
        while above > 0 && is_marker(&lines[above - 1]) {
            existing.push(lines[above - 1].trim_start().to_string());
            above -= 1;
        }
        let mut below = line_idx;
        while below < lines.len() && is_marker(&lines[below]) {
            existing.push(lines[below].trim_start().to_string());
            below += 1;
        }

        let mut inserted = 0usize;
        for marker in markers {
            if existing.contains(&marker) {
                continue;
            }
            existing.push(marker.clone());
            lines.insert(line_idx + inserted, format!("{}{}", indent, marker));
            inserted += 1;
        }
    }

    let mut out = lines.join("\n");
    if had_trailing_newline {
        out.push('\n');
    }
    out
}

fn is_marker(line: &str) -> bool {
    line.trim_start().starts_with(MARKER_PREFIX)
}
