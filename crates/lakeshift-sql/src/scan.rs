//! Reference scanning for SQL text
//!
//! This module locates rewrite candidates in raw SQL: dotted identifier
//! chains that look like table references, and identifiers followed by a
//! parenthesized argument list that look like function invocations. The
//! scanner never matches inside string literals or comments, and treats
//! quoted identifiers as opaque segments (interior punctuation does not
//! split them).
//!
//! Scanning is a single forward pass with no cross-call state; every call to
//! [`Scanner::scan`] starts fresh. Candidates at one scan level never
//! overlap: a function call swallows its whole argument list, and the rewrite
//! engine re-scans argument text recursively.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Represents a position in the source SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Starting byte offset
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, in characters)
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// What kind of construct a candidate looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// A dotted identifier chain in table-reference position
    TableRef,
    /// An identifier chain immediately followed by a parenthesized argument
    /// list
    FunctionCall,
    /// A connection-identifier field value (never produced by SQL scanning;
    /// see the connection rewrite in [`crate::document`])
    ConnectionLiteral,
    /// A keyword construct on the known-unsupported list (e.g. `QUALIFY`)
    UnsupportedConstruct,
}

/// A located span of text that may be a rewritable reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Position of the whole candidate in the scanned text
    pub span: Span,
    /// The raw text of the candidate
    pub text: String,
    /// The kind of construct
    pub kind: CandidateKind,
    /// Identifier segments with quoting stripped, in source order.
    /// For function calls this is the name chain.
    pub segments: Vec<String>,
    /// Top-level argument spans for function calls, empty otherwise.
    /// Spans include surrounding whitespace; nested calls inside an argument
    /// are found by re-scanning the argument text.
    pub args: Vec<Span>,
    /// Byte offset where the identifier chain ends. For table references this
    /// equals `span.end`; for function calls it precedes the argument list.
    pub name_end: usize,
    /// Byte offset just past each segment, parallel to `segments`. Lets the
    /// engine rewrite a leading sub-chain (e.g. the `schema.table` part of
    /// `schema.table.column`) without touching the rest.
    pub segment_ends: Vec<usize>,
}

/// Configuration for the scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Reserved words that are never candidates (uppercase)
    pub reserved_keywords: HashSet<String>,
    /// Keywords that are scanned and flagged for manual review rather than
    /// skipped, keyed by uppercase keyword, value is the human-readable
    /// reason
    pub flagged_constructs: HashMap<String, String>,
}

/// SQL reserved words skipped by the scanner.
///
/// Deliberately broad: a reserved word in reference position is never a
/// mapping target, and skipping it keeps column aliases like `end` or `left`
/// from becoming candidates.
const RESERVED_KEYWORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "COPY", "CREATE",
    "CROSS", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DELETE", "DESC", "DISTINCT",
    "DROP", "ELSE", "END", "EXCEPT", "EXISTS", "EXTRACT", "FALSE", "FIRST", "FROM", "FULL",
    "GROUP", "HAVING", "ILIKE", "IN", "INNER", "INSERT", "INTERSECT", "INTERVAL", "INTO", "IS",
    "JOIN", "LAST", "LEFT", "LIKE", "LIMIT", "MINUS", "NATURAL", "NOT", "NULL", "NULLS",
    "OFFSET", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PIVOT", "QUALIFY", "RANGE",
    "RIGHT", "ROWS", "SELECT", "SET", "TABLE", "THEN", "TRUE", "UNION", "UNPIVOT", "UPDATE",
    "USING", "VALUES", "VIEW", "WHEN", "WHERE", "WITH",
];

impl Default for ScannerConfig {
    fn default() -> Self {
        let reserved_keywords = RESERVED_KEYWORDS.iter().map(|k| k.to_string()).collect();

        // Constructs the engine refuses to translate automatically. Mirrors
        // the manual-review list for Redshift sources: each one has caused
        // silent breakage when translated blindly.
        let mut flagged_constructs = HashMap::new();
        flagged_constructs.insert(
            "QUALIFY".to_string(),
            "QUALIFY is not automatically convertible; rewrite as a WHERE over a window subquery"
                .to_string(),
        );
        flagged_constructs.insert(
            "PIVOT".to_string(),
            "PIVOT syntax differs between dialects; verify column names and aggregation"
                .to_string(),
        );
        flagged_constructs.insert(
            "UNPIVOT".to_string(),
            "UNPIVOT syntax differs between dialects; verify structure".to_string(),
        );
        flagged_constructs.insert(
            "COPY".to_string(),
            "COPY is load syntax; rewrite as COPY INTO for the target dialect".to_string(),
        );

        Self {
            reserved_keywords,
            flagged_constructs,
        }
    }
}

impl ScannerConfig {
    fn is_reserved(&self, word: &str) -> bool {
        self.reserved_keywords.contains(&word.to_uppercase())
    }

    /// The manual-review reason for a flagged keyword, if any
    pub fn flag_reason(&self, word: &str) -> Option<&str> {
        self.flagged_constructs
            .get(&word.to_uppercase())
            .map(|s| s.as_str())
    }
}

/// Scans SQL text for rewrite candidates
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Create a scanner with default configuration
    pub fn default_config() -> Self {
        Self::new(ScannerConfig::default())
    }

    /// The configuration this scanner runs with
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scan a SQL string for candidates, in ascending start-offset order.
    ///
    /// Fails with [`Error::ScanBoundary`] on an unterminated string literal,
    /// quoted identifier, block comment, or argument list.
    pub fn scan(&self, sql: &str) -> Result<Vec<Candidate>> {
        let mut state = ScanState::new(sql, &self.config);
        state.scan()
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::default_config()
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_part(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Internal state for one scan pass
struct ScanState<'a> {
    sql: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    candidates: Vec<Candidate>,
    config: &'a ScannerConfig,
}

impl<'a> ScanState<'a> {
    fn new(sql: &'a str, config: &'a ScannerConfig) -> Self {
        Self {
            sql,
            bytes: sql.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            candidates: Vec::new(),
            config,
        }
    }

    fn scan(&mut self) -> Result<Vec<Candidate>> {
        while !self.is_at_end() {
            match self.peek() {
                b'\'' => {
                    self.scan_string()?;
                }
                b'"' | b'`' => {
                    self.scan_reference()?;
                }
                b'-' if self.peek_at(1) == b'-' => {
                    self.skip_line_comment();
                }
                b'/' if self.peek_at(1) == b'*' => {
                    self.skip_block_comment()?;
                }
                b if is_ident_start(b) => {
                    self.scan_reference()?;
                }
                b if b.is_ascii_digit() => {
                    self.skip_number();
                }
                _ => {
                    self.advance();
                }
            }
        }
        Ok(std::mem::take(&mut self.candidates))
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.bytes[self.pos]
        }
    }

    fn peek_at(&self, offset: usize) -> u8 {
        if self.pos + offset >= self.bytes.len() {
            0
        } else {
            self.bytes[self.pos + offset]
        }
    }

    fn advance(&mut self) -> u8 {
        let b = self.peek();
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if b & 0xC0 != 0x80 {
            // don't count UTF-8 continuation bytes as columns
            self.column += 1;
        }
        b
    }

    /// Skip a `'...'` string literal, honoring the `''` escape.
    fn scan_string(&mut self) -> Result<()> {
        let line = self.line;
        let column = self.column;
        self.advance(); // opening quote
        loop {
            if self.is_at_end() {
                return Err(Error::scan_boundary("unterminated string literal", line, column));
            }
            if self.peek() == b'\'' {
                if self.peek_at(1) == b'\'' {
                    self.advance();
                    self.advance();
                    continue;
                }
                self.advance(); // closing quote
                return Ok(());
            }
            self.advance();
        }
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != b'\n' {
            self.advance();
        }
    }

    /// Skip a `/* ... */` block comment (non-nested, Redshift-style).
    fn skip_block_comment(&mut self) -> Result<()> {
        let line = self.line;
        let column = self.column;
        self.advance(); // '/'
        self.advance(); // '*'
        loop {
            if self.is_at_end() {
                return Err(Error::scan_boundary("unterminated block comment", line, column));
            }
            if self.peek() == b'*' && self.peek_at(1) == b'/' {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }
    }

    /// Skip a numeric literal so its digits never seed an identifier chain.
    fn skip_number(&mut self) {
        while !self.is_at_end() {
            let b = self.peek();
            if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'$' {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Scan an identifier chain and classify it as a table reference,
    /// function call, flagged construct, or nothing.
    fn scan_reference(&mut self) -> Result<()> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        let mut segments = Vec::new();
        let mut segment_ends = Vec::new();
        let mut quoted = false;

        loop {
            match self.peek() {
                b'"' => {
                    segments.push(self.scan_quoted_segment(b'"')?);
                    quoted = true;
                }
                b'`' => {
                    segments.push(self.scan_quoted_segment(b'`')?);
                    quoted = true;
                }
                b if is_ident_start(b) => {
                    segments.push(self.scan_bare_segment());
                }
                _ => break,
            }
            segment_ends.push(self.pos);
            // The chain continues only on a dot followed by another segment.
            if self.peek() == b'.' {
                let next = self.peek_at(1);
                if next == b'"' || next == b'`' || is_ident_start(next) {
                    self.advance();
                    continue;
                }
            }
            break;
        }

        let name_end = self.pos;
        let bare_keyword = segments.len() == 1 && !quoted && self.config.is_reserved(&segments[0]);

        // Lookahead for an argument list. Reserved words like CAST or EXISTS
        // take parentheses without being function candidates; their contents
        // fall back to the main loop.
        if !bare_keyword {
            let saved = (self.pos, self.line, self.column);
            while !self.is_at_end() && self.peek().is_ascii_whitespace() {
                self.advance();
            }
            if self.peek() == b'(' {
                let args = self.scan_call_arguments()?;
                let span = Span::new(start, self.pos, line, column);
                let text = self.sql[start..self.pos].to_string();
                self.candidates.push(Candidate {
                    span,
                    text,
                    kind: CandidateKind::FunctionCall,
                    segments,
                    args,
                    name_end,
                    segment_ends,
                });
                return Ok(());
            }
            (self.pos, self.line, self.column) = saved;
        }

        if bare_keyword {
            if self.config.flag_reason(&segments[0]).is_some() {
                let span = Span::new(start, name_end, line, column);
                let text = self.sql[start..name_end].to_string();
                self.candidates.push(Candidate {
                    span,
                    text,
                    kind: CandidateKind::UnsupportedConstruct,
                    segments,
                    args: Vec::new(),
                    name_end,
                    segment_ends,
                });
            }
            return Ok(());
        }

        let span = Span::new(start, name_end, line, column);
        let text = self.sql[start..name_end].to_string();
        self.candidates.push(Candidate {
            span,
            text,
            kind: CandidateKind::TableRef,
            segments,
            args: Vec::new(),
            name_end,
            segment_ends,
        });
        Ok(())
    }

    fn scan_bare_segment(&mut self) -> String {
        let start = self.pos;
        while !self.is_at_end() && is_ident_part(self.peek()) {
            self.advance();
        }
        self.sql[start..self.pos].to_string()
    }

    /// Scan a quoted identifier segment, returning its unquoted text.
    /// Interior punctuation (including dots) never splits the segment.
    fn scan_quoted_segment(&mut self, quote: u8) -> Result<String> {
        let line = self.line;
        let column = self.column;
        self.advance(); // opening quote
        let start = self.pos;
        loop {
            if self.is_at_end() {
                return Err(Error::scan_boundary("unterminated quoted identifier", line, column));
            }
            if self.peek() == quote {
                if self.peek_at(1) == quote {
                    self.advance();
                    self.advance();
                    continue;
                }
                break;
            }
            self.advance();
        }
        let text = self.sql[start..self.pos].to_string();
        self.advance(); // closing quote
        Ok(text)
    }

    /// Scan a parenthesized argument list, returning top-level argument
    /// spans. The cursor must sit on the opening parenthesis and ends just
    /// past the matching closing one.
    fn scan_call_arguments(&mut self) -> Result<Vec<Span>> {
        let open_line = self.line;
        let open_column = self.column;
        self.advance(); // '('
        let mut args = Vec::new();
        let mut depth = 1usize;
        let mut arg_start = self.pos;
        let mut arg_line = self.line;
        let mut arg_column = self.column;

        loop {
            if self.is_at_end() {
                return Err(Error::scan_boundary(
                    "unterminated function argument list",
                    open_line,
                    open_column,
                ));
            }
            match self.peek() {
                b'\'' => {
                    self.scan_string()?;
                }
                b'"' => {
                    self.scan_quoted_segment(b'"')?;
                }
                b'`' => {
                    self.scan_quoted_segment(b'`')?;
                }
                b'-' if self.peek_at(1) == b'-' => {
                    self.skip_line_comment();
                }
                b'/' if self.peek_at(1) == b'*' => {
                    self.skip_block_comment()?;
                }
                b'(' => {
                    depth += 1;
                    self.advance();
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let span = Span::new(arg_start, self.pos, arg_line, arg_column);
                        if !args.is_empty() || !self.sql[span.start..span.end].trim().is_empty() {
                            args.push(span);
                        }
                        self.advance();
                        return Ok(args);
                    }
                    self.advance();
                }
                b',' if depth == 1 => {
                    args.push(Span::new(arg_start, self.pos, arg_line, arg_column));
                    self.advance();
                    arg_start = self.pos;
                    arg_line = self.line;
                    arg_column = self.column;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(sql: &str) -> Vec<Candidate> {
        Scanner::default_config().scan(sql).unwrap()
    }

    #[test]
    fn test_table_ref_chain() {
        let candidates = scan("SELECT * FROM analytics.users");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, CandidateKind::TableRef);
        assert_eq!(candidates[0].segments, vec!["analytics", "users"]);
        assert_eq!(candidates[0].text, "analytics.users");
    }

    #[test]
    fn test_string_literal_not_scanned() {
        let candidates = scan("WHERE x = 'analytics.users'");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "x");
    }

    #[test]
    fn test_comments_not_scanned() {
        let candidates = scan("-- analytics.users\nSELECT 1 /* analytics.users */");
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_quoted_identifier_segments() {
        let candidates = scan("FROM \"analytics\".\"users\"");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].segments, vec!["analytics", "users"]);
    }

    #[test]
    fn test_quoted_identifier_with_interior_dot_is_one_segment() {
        let candidates = scan("FROM \"analytics.users\"");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].segments, vec!["analytics.users"]);
    }

    #[test]
    fn test_function_call_with_args() {
        let candidates = scan("SELECT DATEDIFF('day', a, b)");
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.kind, CandidateKind::FunctionCall);
        assert_eq!(c.segments, vec!["DATEDIFF"]);
        assert_eq!(c.args.len(), 3);
        assert_eq!(c.text, "DATEDIFF('day', a, b)");
    }

    #[test]
    fn test_nested_call_is_single_top_level_candidate() {
        let candidates = scan("SELECT OUTER_FN(INNER_FN(a), b)");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].segments, vec!["OUTER_FN"]);
        assert_eq!(candidates[0].args.len(), 2);
    }

    #[test]
    fn test_keyword_parens_fall_through() {
        let candidates = scan("WHERE EXISTS (SELECT 1 FROM analytics.users)");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, CandidateKind::TableRef);
        assert_eq!(candidates[0].segments, vec!["analytics", "users"]);
    }

    #[test]
    fn test_unterminated_string_is_boundary_error() {
        let err = Scanner::default_config()
            .scan("SELECT 'oops")
            .unwrap_err();
        assert!(matches!(err, Error::ScanBoundary { .. }));
    }

    #[test]
    fn test_unterminated_block_comment_is_boundary_error() {
        let err = Scanner::default_config()
            .scan("SELECT 1 /* oops")
            .unwrap_err();
        assert!(matches!(err, Error::ScanBoundary { .. }));
    }

    #[test]
    fn test_qualify_is_flagged_construct() {
        let candidates = scan("QUALIFY ROW_NUMBER() OVER (PARTITION BY id) = 1");
        assert_eq!(candidates[0].kind, CandidateKind::UnsupportedConstruct);
        assert_eq!(candidates[0].text, "QUALIFY");
    }

    #[test]
    fn test_empty_argument_list() {
        let candidates = scan("SELECT GETDATE()");
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].args.is_empty());
    }

    #[test]
    fn test_comma_inside_string_does_not_split_args() {
        let candidates = scan("SELECT SPLIT_PART(name, ',', 1)");
        assert_eq!(candidates[0].args.len(), 3);
    }

    #[test]
    fn test_candidates_are_ordered_and_disjoint() {
        let candidates = scan("SELECT NVL(a, b) FROM prod.users WHERE c > 1");
        let mut last_end = 0;
        for c in &candidates {
            assert!(c.span.start >= last_end);
            last_end = c.span.end;
        }
    }

    #[test]
    fn test_line_and_column_tracking() {
        let candidates = scan("SELECT 1\n  FROM analytics.users");
        let c = candidates.last().unwrap();
        assert_eq!(c.span.line, 2);
        assert_eq!(c.span.column, 8);
    }
}
