//! Typed failures for the import pipeline and its unit-of-work capability.
//!
//! Every variant of [`ImportError`] carries the underlying cause as its
//! `source`, so callers printing the chain (`{err:#}` with anyhow) see the
//! database or CSV error that triggered the rollback.

use std::error::Error as StdError;

use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure reported by a [`crate::store::Store`] or one of its units of work.
#[derive(Debug, Error)]
#[error("{operation} failed")]
pub struct StoreError {
    operation: String,
    #[source]
    source: BoxError,
}

impl StoreError {
    pub fn new(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// A cell that is not valid in the configured input encoding.
#[derive(Debug, Error)]
#[error("cell is not valid {encoding}")]
pub struct DecodeError {
    pub encoding: &'static str,
}

#[derive(Debug, Error)]
pub enum ImportError {
    /// The upload could not be read as CSV. Raised before any mutation.
    #[error("malformed CSV: {reason}")]
    MalformedCsv {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("naming sequence '{sequence}' is unavailable")]
    SequenceUnavailable {
        sequence: String,
        #[source]
        source: StoreError,
    },
    #[error("creating table {table} failed")]
    SchemaCreationFailed {
        table: String,
        #[source]
        source: StoreError,
    },
    #[error("import into {table} aborted{}", row_suffix(.row))]
    ImportAborted {
        table: String,
        row: Option<usize>,
        #[source]
        source: BoxError,
    },
    /// Begin, commit, metadata and duplicate lookups.
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl ImportError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedCsv {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn malformed_with(reason: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::MalformedCsv {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub fn aborted(table: &str, row: Option<usize>, source: impl Into<BoxError>) -> Self {
        Self::ImportAborted {
            table: table.to_string(),
            row,
            source: source.into(),
        }
    }
}

fn row_suffix(row: &Option<usize>) -> String {
    match row {
        Some(row) => format!(" at data row {row}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_message_names_the_failing_row() {
        let err = ImportError::aborted("raw_table_7", Some(3), "value too long");
        assert_eq!(err.to_string(), "import into raw_table_7 aborted at data row 3");
        assert_eq!(
            err.source().map(|source| source.to_string()).as_deref(),
            Some("value too long")
        );
    }

    #[test]
    fn aborted_message_without_row_for_flush_failures() {
        let err = ImportError::aborted("raw_table_7", None, "connection reset");
        assert_eq!(err.to_string(), "import into raw_table_7 aborted");
    }

    #[test]
    fn store_errors_pass_through_persistence_transparently() {
        let err = ImportError::from(StoreError::new("committing upload", "disk full"));
        assert_eq!(err.to_string(), "committing upload failed");
    }
}
