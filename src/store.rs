//! The persistence capability the import pipeline runs against.
//!
//! A [`Store`] hands out units of work. Everything one import mutates (the
//! metadata row, the generated table and its rows) goes through a single
//! [`UnitOfWork`], which is either committed or rolled back as a whole.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::StoreError, hashing::ContentHashes};

pub trait Store {
    type Unit<'a>: UnitOfWork
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Unit<'_>, StoreError>;
}

pub trait UnitOfWork {
    /// Last value a named monotonic counter handed out, 0 before its first use.
    /// Reads, never advances.
    fn sequence_value(&mut self, sequence: &str) -> Result<i64, StoreError>;

    /// Runs a DDL or DML statement, returning the affected row count.
    fn execute(&mut self, statement: &str) -> Result<u64, StoreError>;

    fn insert_upload(&mut self, upload: &NewUpload<'_>) -> Result<i32, StoreError>;

    /// Existing uploads sharing at least one content hash with `hashes`.
    fn uploads_with_hashes(
        &mut self,
        hashes: &ContentHashes,
    ) -> Result<Vec<UploadFingerprint>, StoreError>;

    /// Prepares a bulk copy into `table`, positional over `columns`.
    fn begin_copy(
        &mut self,
        table: &str,
        columns: &[String],
    ) -> Result<Box<dyn RowSink + '_>, StoreError>;

    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;

    fn rollback(self) -> Result<(), StoreError>
    where
        Self: Sized;
}

/// Receiving end of a bulk copy. Dropping a sink without `finish` abandons the copy.
pub trait RowSink {
    /// `None` cells are absent from a ragged row and load as NULL.
    fn send(&mut self, row: &[Option<String>]) -> Result<(), StoreError>;

    /// Flushes buffered rows and returns how many the table received.
    fn finish(self: Box<Self>) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone)]
pub struct NewUpload<'a> {
    pub source_filename: &'a str,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub table_name: &'a str,
    pub hashes: &'a ContentHashes,
    pub format_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFingerprint {
    pub id: i32,
    pub source_filename: String,
    pub name: String,
    pub hashes: ContentHashes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub id: i32,
    pub source_filename: String,
    pub file_size: i64,
    pub datetime_uploaded: DateTime<Utc>,
    /// Empty when no import format has been assigned.
    pub format_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFormat {
    pub id: i32,
    pub name: String,
}

/// A generated table rendered as text: column names, then rows in `_id` order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableContents {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}
