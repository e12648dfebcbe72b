#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv_ingest::error::StoreError;
use csv_ingest::hashing::ContentHashes;
use csv_ingest::import::ImportOptions;
use csv_ingest::store::{NewUpload, RowSink, Store, UnitOfWork, UploadFingerprint};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_ref())
            .expect("write temp file contents");
        path
    }
}

pub fn options() -> ImportOptions {
    ImportOptions::default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTable {
    /// Declared user columns with their VARCHAR widths, `_id` excluded.
    pub columns: Vec<(String, usize)>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl MemoryTable {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub id: i32,
    pub source_filename: String,
    pub file_size: u64,
    pub table_name: String,
    pub hashes: ContentHashes,
    pub format_id: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    pub tables: BTreeMap<String, MemoryTable>,
    pub uploads: Vec<StoredUpload>,
}

/// In-memory store with PostgreSQL-like semantics: units of work see a private
/// copy that replaces the shared state on commit, the id sequence advances
/// outside transactions, and VARCHAR widths are enforced during copy.
///
/// The sequence mirrors a PostgreSQL one: it starts at `last_value = 1` with
/// `is_called = false`, and the first `nextval` returns 1 without moving it.
pub struct MemoryStore {
    pub state: MemoryState,
    pub sequence_name: String,
    pub last_value: i64,
    pub is_called: bool,
    pub fail_sequence: bool,
    pub fail_ddl: bool,
    /// 1-based data row at which the copy sink rejects a row.
    pub fail_copy_at_row: Option<usize>,
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: MemoryState::default(),
            sequence_name: ImportOptions::default().sequence,
            last_value: 1,
            is_called: false,
            fail_sequence: false,
            fail_ddl: false,
            fail_copy_at_row: None,
            begun: 0,
            committed: 0,
            rolled_back: 0,
        }
    }

    /// `nextval`: advances regardless of how the unit of work ends.
    fn next_value(&mut self) -> i64 {
        if self.is_called {
            self.last_value += 1;
        } else {
            self.is_called = true;
        }
        self.last_value
    }

    pub fn table(&self, name: &str) -> &MemoryTable {
        self.state
            .tables
            .get(name)
            .unwrap_or_else(|| panic!("table {name} missing"))
    }
}

impl Store for MemoryStore {
    type Unit<'a> = MemoryUnit<'a>;

    fn begin(&mut self) -> Result<MemoryUnit<'_>, StoreError> {
        self.begun += 1;
        let working = self.state.clone();
        Ok(MemoryUnit {
            store: self,
            working,
        })
    }
}

pub struct MemoryUnit<'a> {
    store: &'a mut MemoryStore,
    working: MemoryState,
}

impl UnitOfWork for MemoryUnit<'_> {
    fn sequence_value(&mut self, sequence: &str) -> Result<i64, StoreError> {
        if self.store.fail_sequence || sequence != self.store.sequence_name {
            return Err(StoreError::new(
                format!("reading sequence {sequence}"),
                format!("relation \"{sequence}\" does not exist"),
            ));
        }
        if self.store.is_called {
            Ok(self.store.last_value)
        } else {
            Ok(self.store.last_value - 1)
        }
    }

    fn execute(&mut self, statement: &str) -> Result<u64, StoreError> {
        if self.store.fail_ddl {
            return Err(StoreError::new("executing statement", "permission denied"));
        }
        let (name, table) = parse_create_table(statement)
            .ok_or_else(|| StoreError::new("executing statement", "unsupported statement"))?;
        if self.working.tables.contains_key(&name) {
            return Err(StoreError::new(
                "executing statement",
                format!("relation \"{name}\" already exists"),
            ));
        }
        self.working.tables.insert(name, table);
        Ok(0)
    }

    fn insert_upload(&mut self, upload: &NewUpload<'_>) -> Result<i32, StoreError> {
        let id = i32::try_from(self.store.next_value())
            .map_err(|err| StoreError::new("inserting upload record", err))?;
        self.working.uploads.push(StoredUpload {
            id,
            source_filename: upload.source_filename.to_string(),
            file_size: upload.file_size,
            table_name: upload.table_name.to_string(),
            hashes: upload.hashes.clone(),
            format_id: upload.format_id,
        });
        Ok(id)
    }

    fn uploads_with_hashes(
        &mut self,
        hashes: &ContentHashes,
    ) -> Result<Vec<UploadFingerprint>, StoreError> {
        Ok(self
            .working
            .uploads
            .iter()
            .filter(|upload| {
                upload.hashes.raw == hashes.raw
                    || upload.hashes.without_bom == hashes.without_bom
                    || upload.hashes.trimmed_without_bom == hashes.trimmed_without_bom
            })
            .map(|upload| UploadFingerprint {
                id: upload.id,
                source_filename: upload.source_filename.clone(),
                name: upload.table_name.clone(),
                hashes: upload.hashes.clone(),
            })
            .collect())
    }

    fn begin_copy(
        &mut self,
        table: &str,
        columns: &[String],
    ) -> Result<Box<dyn RowSink + '_>, StoreError> {
        let target = self.working.tables.get_mut(table).ok_or_else(|| {
            StoreError::new(
                format!("starting copy into {table}"),
                "relation does not exist",
            )
        })?;
        let widths = columns
            .iter()
            .map(|column| {
                target
                    .columns
                    .iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, width)| *width)
                    .ok_or_else(|| {
                        StoreError::new(
                            format!("starting copy into {table}"),
                            format!("column \"{column}\" does not exist"),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(MemoryRowSink {
            target,
            widths,
            fail_at: self.store.fail_copy_at_row,
            pending: Vec::new(),
        }))
    }

    fn commit(self) -> Result<(), StoreError> {
        self.store.committed += 1;
        self.store.state = self.working;
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        self.store.rolled_back += 1;
        Ok(())
    }
}

struct MemoryRowSink<'a> {
    target: &'a mut MemoryTable,
    widths: Vec<usize>,
    fail_at: Option<usize>,
    pending: Vec<Vec<Option<String>>>,
}

impl RowSink for MemoryRowSink<'_> {
    fn send(&mut self, row: &[Option<String>]) -> Result<(), StoreError> {
        if self.fail_at == Some(self.pending.len() + 1) {
            return Err(StoreError::new("copying row", "connection reset by peer"));
        }
        for (value, width) in row.iter().zip(&self.widths) {
            if let Some(value) = value {
                if value.chars().count() > *width {
                    return Err(StoreError::new(
                        "copying row",
                        format!("value too long for type character varying({width})"),
                    ));
                }
            }
        }
        self.pending.push(row.to_vec());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64, StoreError> {
        let MemoryRowSink {
            target, pending, ..
        } = *self;
        let count = pending.len() as u64;
        target.rows.extend(pending);
        Ok(count)
    }
}

/// Reads back `CREATE TABLE "t" ("_id" SERIAL PRIMARY KEY, "c" VARCHAR(n), ...)`.
fn parse_create_table(statement: &str) -> Option<(String, MemoryTable)> {
    let rest = statement.strip_prefix("CREATE TABLE \"")?;
    let (name, rest) = rest.split_once('"')?;
    let body = rest.trim().strip_prefix('(')?.strip_suffix(')')?;
    let mut columns = Vec::new();
    for definition in body.split(", ") {
        let definition = definition.strip_prefix('"')?;
        let (column, kind) = definition.split_once('"')?;
        let kind = kind.trim();
        if kind == "SERIAL PRIMARY KEY" {
            continue;
        }
        let width = kind
            .strip_prefix("VARCHAR(")?
            .strip_suffix(')')?
            .parse()
            .ok()?;
        columns.push((column.to_string(), width));
    }
    Some((
        name.to_string(),
        MemoryTable {
            columns,
            rows: Vec::new(),
        },
    ))
}
