//! Error types for lakeshift-sql

use thiserror::Error;

/// The result type for lakeshift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading mapping data or scanning SQL.
///
/// Rule-data errors (`MalformedMapping`, `DuplicateKey`) are fatal to the
/// whole run: partial mapping tables produce silently-wrong results, so the
/// loader fails fast before any document is processed. `ScanBoundary` is
/// scoped to a single snippet; the caller keeps that snippet verbatim and
/// continues with the rest of the document.
#[derive(Debug, Error)]
pub enum Error {
    /// A mapping-table row is missing required fields or carries an
    /// unparseable transform expression
    #[error("Malformed mapping data in row {row}: {message}")]
    MalformedMapping { message: String, row: u64 },

    /// Two rows normalize to the same source key with different targets
    #[error("Duplicate mapping key `{key}`: `{existing}` conflicts with `{incoming}`")]
    DuplicateKey {
        key: String,
        existing: String,
        incoming: String,
    },

    /// Unterminated string literal, quoted identifier, or block comment
    #[error("Scan boundary error at line {line}, column {column}: {message}")]
    ScanBoundary {
        message: String,
        line: usize,
        column: usize,
    },

    /// Failed to read a mapping CSV source
    #[error("Failed to read mapping data: {0}")]
    Csv(#[from] csv::Error),

    /// Internal error (should not happen in normal usage)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a malformed-mapping error
    pub fn malformed_mapping(message: impl Into<String>, row: u64) -> Self {
        Error::MalformedMapping {
            message: message.into(),
            row,
        }
    }

    /// Create a duplicate-key error
    pub fn duplicate_key(
        key: impl Into<String>,
        existing: impl Into<String>,
        incoming: impl Into<String>,
    ) -> Self {
        Error::DuplicateKey {
            key: key.into(),
            existing: existing.into(),
            incoming: incoming.into(),
        }
    }

    /// Create a scan-boundary error
    pub fn scan_boundary(message: impl Into<String>, line: usize, column: usize) -> Self {
        Error::ScanBoundary {
            message: message.into(),
            line,
            column,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}
