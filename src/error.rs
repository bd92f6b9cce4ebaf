//! Error taxonomy for the ingestion pipeline.
//!
//! Severity tiers:
//! - Fatal: storage unavailable — aborts the operation, transaction rolled back
//! - Per-file: unknown file type — that file aborts, the batch continues
//! - Per-row: parse failures and rejected names accumulate as warnings in the
//!   import summary; they are never raised as errors

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

/// Errors that abort processing of a file (or the whole operation).
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unrecognized file type: {0}")]
    UnknownFileType(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Storage unavailable: {0}")]
    Storage(#[from] DbError),
}

impl ImportError {
    /// Fatal errors abort the whole batch; the rest abort one file only.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImportError::Storage(_))
    }
}

/// Why a per-row problem was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Missing or unparseable required field; the row was skipped.
    RowParse,
    /// Name field resolved to nothing after the validity screen; depending on
    /// file type the row was skipped or stored unresolved.
    NameRejected,
    /// Company field could not be resolved; the row kept a NULL company.
    CompanyUnresolved,
}

/// One accumulated per-row problem, surfaced in the import summary. The
/// caller renders these; a single bad row must never crash an import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportWarning {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub kind: WarningKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_value: Option<String>,
}

impl ImportWarning {
    pub fn new(row: usize, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            row,
            kind,
            message: message.into(),
            original_value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.original_value = Some(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_is_fatal() {
        let unknown = ImportError::UnknownFileType(PathBuf::from("x.csv"));
        assert!(!unknown.is_fatal());

        let storage = ImportError::Storage(DbError::Migration("down".into()));
        assert!(storage.is_fatal());
    }

    #[test]
    fn test_warning_serialization_shape() {
        let w = ImportWarning::new(3, WarningKind::RowParse, "bad duration").with_value("abc");
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["row"], 3);
        assert_eq!(json["kind"], "row_parse");
        assert_eq!(json["originalValue"], "abc");
    }
}
