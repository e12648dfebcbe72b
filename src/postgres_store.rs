//! PostgreSQL implementation of the [`Store`] capability plus the catalogue
//! queries behind `list`, `show`, `delete`, `formats` and `set-format`.

use itertools::Itertools;
use log::{debug, info};
use postgres::{
    Client, NoTls, Transaction,
    binary_copy::BinaryCopyInWriter,
    types::{ToSql, Type},
};

use crate::{
    config::DatabaseConfig,
    error::StoreError,
    hashing::ContentHashes,
    identifier,
    provision::SYSTEM_KEY_COLUMN,
    store::{
        ImportFormat, NewUpload, RowSink, Store, TableContents, UnitOfWork, UploadFingerprint,
        UploadSummary,
    },
};

const BOOTSTRAP_SQL: &str = include_str!("../sql/bootstrap.sql");

pub struct PgStore {
    client: Client,
    schema: Option<String>,
}

impl PgStore {
    /// Connects and applies the session statement timeout, so every query and
    /// copy issued through this store aborts once the deadline passes. With a
    /// configured schema, unqualified names (metadata tables, the naming
    /// sequence, generated tables) resolve there.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let mut pg_config = config
            .url
            .parse::<postgres::Config>()
            .map_err(|err| StoreError::new("parsing database URL", err))?;
        pg_config.connect_timeout(config.connect_timeout);
        let mut client = pg_config
            .connect(NoTls)
            .map_err(|err| StoreError::new("connecting to PostgreSQL", err))?;
        client
            .batch_execute(&format!(
                "SET statement_timeout = {}",
                config.statement_timeout.as_millis()
            ))
            .map_err(|err| StoreError::new("setting statement timeout", err))?;
        if let Some(schema) = &config.schema {
            client
                .batch_execute(&format!("SET search_path TO {}", identifier::quote(schema)))
                .map_err(|err| StoreError::new(format!("selecting schema {schema}"), err))?;
        }
        debug!(
            "Connected with statement timeout {:?}",
            config.statement_timeout
        );
        Ok(Self {
            client,
            schema: config.schema.clone(),
        })
    }

    /// Creates the configured schema, if any, then the metadata tables in it.
    pub fn ensure_schema(&mut self) -> Result<(), StoreError> {
        if let Some(schema) = &self.schema {
            self.client
                .batch_execute(&format!(
                    "CREATE SCHEMA IF NOT EXISTS {}",
                    identifier::quote(schema)
                ))
                .map_err(|err| StoreError::new(format!("creating schema {schema}"), err))?;
        }
        self.client
            .batch_execute(BOOTSTRAP_SQL)
            .map_err(|err| StoreError::new("creating metadata tables", err))
    }

    pub fn list_uploads(&mut self) -> Result<Vec<UploadSummary>, StoreError> {
        let query = concat!(
            "SELECT u.id, u.source_filename, u.file_size, u.datetime_uploaded, ",
            "  COALESCE(f.name, '') AS format_name ",
            "FROM core_raw_tables u ",
            "LEFT JOIN core_import_formats f ON u.format_id = f.id ",
            "ORDER BY u.datetime_uploaded DESC"
        );
        let rows = self
            .client
            .query(query, &[])
            .map_err(|err| StoreError::new("listing uploads", err))?;
        rows.iter()
            .map(|row| {
                Ok(UploadSummary {
                    id: row.try_get("id")?,
                    source_filename: row.try_get("source_filename")?,
                    file_size: row.try_get("file_size")?,
                    datetime_uploaded: row.try_get("datetime_uploaded")?,
                    format_name: row.try_get("format_name")?,
                })
            })
            .collect::<Result<Vec<_>, postgres::Error>>()
            .map_err(|err| StoreError::new("reading upload rows", err))
    }

    pub fn import_formats(&mut self) -> Result<Vec<ImportFormat>, StoreError> {
        let rows = self
            .client
            .query("SELECT id, name FROM core_import_formats ORDER BY id", &[])
            .map_err(|err| StoreError::new("listing import formats", err))?;
        rows.iter()
            .map(|row| {
                Ok(ImportFormat {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect::<Result<Vec<_>, postgres::Error>>()
            .map_err(|err| StoreError::new("reading import format rows", err))
    }

    /// Returns false when no upload has `upload_id`.
    pub fn set_upload_format(&mut self, upload_id: i32, format_id: i32) -> Result<bool, StoreError> {
        let updated = self
            .client
            .execute(
                "UPDATE core_raw_tables SET format_id = $1 WHERE id = $2",
                &[&format_id, &upload_id],
            )
            .map_err(|err| StoreError::new(format!("assigning format to upload {upload_id}"), err))?;
        Ok(updated > 0)
    }

    /// Columns and rows of the table generated for `upload_id`, every value as text.
    pub fn table_contents(
        &mut self,
        upload_id: i32,
        limit: Option<i64>,
    ) -> Result<Option<TableContents>, StoreError> {
        let context = format!("reading upload {upload_id}");
        let Some(row) = self
            .client
            .query_opt("SELECT name FROM core_raw_tables WHERE id = $1", &[&upload_id])
            .map_err(|err| StoreError::new(context.clone(), err))?
        else {
            return Ok(None);
        };
        let table: String = row
            .try_get("name")
            .map_err(|err| StoreError::new(context.clone(), err))?;

        let columns = self
            .client
            .query(
                concat!(
                    "SELECT column_name::text FROM information_schema.columns ",
                    "WHERE table_schema = current_schema() AND table_name = $1 ",
                    "ORDER BY ordinal_position"
                ),
                &[&table],
            )
            .map_err(|err| StoreError::new(format!("reading columns of {table}"), err))?
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| StoreError::new(format!("reading columns of {table}"), err))?;
        if columns.is_empty() {
            return Err(StoreError::new(
                format!("reading {table}"),
                "generated table no longer exists",
            ));
        }

        let select_list = columns
            .iter()
            .map(|column| format!("{}::text", identifier::quote(column)))
            .join(", ");
        let query = format!(
            "SELECT {select_list} FROM {} ORDER BY {} LIMIT $1",
            identifier::quote(&table),
            identifier::quote(SYSTEM_KEY_COLUMN)
        );
        let rows = self
            .client
            .query(query.as_str(), &[&limit])
            .map_err(|err| StoreError::new(format!("reading rows of {table}"), err))?
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|idx| row.try_get::<_, Option<String>>(idx))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| StoreError::new(format!("decoding rows of {table}"), err))?;

        Ok(Some(TableContents {
            table,
            columns,
            rows,
        }))
    }

    /// Deletes the upload record and, unless `keep_table`, its generated table,
    /// in one transaction. Returns the table name, or `None` for an unknown id.
    pub fn delete_upload(
        &mut self,
        upload_id: i32,
        keep_table: bool,
    ) -> Result<Option<String>, StoreError> {
        let context = format!("deleting upload {upload_id}");
        let mut tx = self
            .client
            .transaction()
            .map_err(|err| StoreError::new(context.clone(), err))?;
        let Some(row) = tx
            .query_opt(
                "DELETE FROM core_raw_tables WHERE id = $1 RETURNING name",
                &[&upload_id],
            )
            .map_err(|err| StoreError::new(context.clone(), err))?
        else {
            return Ok(None);
        };
        let table: String = row
            .try_get("name")
            .map_err(|err| StoreError::new(context.clone(), err))?;
        if !keep_table {
            tx.batch_execute(&format!(
                "DROP TABLE IF EXISTS {}",
                identifier::quote(&table)
            ))
            .map_err(|err| StoreError::new(format!("dropping {table}"), err))?;
        }
        tx.commit()
            .map_err(|err| StoreError::new(context.clone(), err))?;
        info!("Deleted upload {upload_id} ({table})");
        Ok(Some(table))
    }
}

impl Store for PgStore {
    type Unit<'a> = PgUnit<'a>;

    fn begin(&mut self) -> Result<PgUnit<'_>, StoreError> {
        let tx = self
            .client
            .transaction()
            .map_err(|err| StoreError::new("beginning transaction", err))?;
        Ok(PgUnit { tx })
    }
}

pub struct PgUnit<'a> {
    tx: Transaction<'a>,
}

impl UnitOfWork for PgUnit<'_> {
    /// The value the last `nextval` handed out, zero before the first call.
    /// A fresh sequence reports its start value with `is_called = false`.
    fn sequence_value(&mut self, sequence: &str) -> Result<i64, StoreError> {
        let query = format!(
            "SELECT CASE WHEN is_called THEN last_value ELSE last_value - 1 END FROM {}",
            identifier::quote_qualified(sequence)
        );
        let context = format!("reading sequence {sequence}");
        let row = self
            .tx
            .query_one(query.as_str(), &[])
            .map_err(|err| StoreError::new(context.clone(), err))?;
        row.try_get(0).map_err(|err| StoreError::new(context, err))
    }

    fn execute(&mut self, statement: &str) -> Result<u64, StoreError> {
        self.tx
            .execute(statement, &[])
            .map_err(|err| StoreError::new("executing statement", err))
    }

    fn insert_upload(&mut self, upload: &NewUpload<'_>) -> Result<i32, StoreError> {
        let file_size = i64::try_from(upload.file_size)
            .map_err(|err| StoreError::new("recording upload size", err))?;
        let row = self
            .tx
            .query_one(
                concat!(
                    "INSERT INTO core_raw_tables (source_filename, file_size, datetime_uploaded, ",
                    "  name, file_hash, file_hash_no_bom, file_hash_trimmed_no_bom, format_id) ",
                    "VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id"
                ),
                &[
                    &upload.source_filename,
                    &file_size,
                    &upload.uploaded_at,
                    &upload.table_name,
                    &upload.hashes.raw,
                    &upload.hashes.without_bom,
                    &upload.hashes.trimmed_without_bom,
                    &upload.format_id,
                ],
            )
            .map_err(|err| StoreError::new("inserting upload record", err))?;
        row.try_get("id")
            .map_err(|err| StoreError::new("inserting upload record", err))
    }

    fn uploads_with_hashes(
        &mut self,
        hashes: &ContentHashes,
    ) -> Result<Vec<UploadFingerprint>, StoreError> {
        let rows = self
            .tx
            .query(
                concat!(
                    "SELECT id, source_filename, name, file_hash, file_hash_no_bom, ",
                    "  file_hash_trimmed_no_bom ",
                    "FROM core_raw_tables ",
                    "WHERE file_hash = $1 OR file_hash_no_bom = $2 ",
                    "  OR file_hash_trimmed_no_bom = $3 ",
                    "ORDER BY id"
                ),
                &[
                    &hashes.raw,
                    &hashes.without_bom,
                    &hashes.trimmed_without_bom,
                ],
            )
            .map_err(|err| StoreError::new("looking up uploads by hash", err))?;
        rows.iter()
            .map(|row| {
                Ok(UploadFingerprint {
                    id: row.try_get("id")?,
                    source_filename: row.try_get("source_filename")?,
                    name: row.try_get("name")?,
                    hashes: ContentHashes {
                        raw: row.try_get("file_hash")?,
                        without_bom: row.try_get("file_hash_no_bom")?,
                        trimmed_without_bom: row.try_get("file_hash_trimmed_no_bom")?,
                    },
                })
            })
            .collect::<Result<Vec<_>, postgres::Error>>()
            .map_err(|err| StoreError::new("reading uploads by hash", err))
    }

    fn begin_copy(
        &mut self,
        table: &str,
        columns: &[String],
    ) -> Result<Box<dyn RowSink + '_>, StoreError> {
        let statement = format!(
            "COPY {} ({}) FROM STDIN (FORMAT binary)",
            identifier::quote(table),
            columns.iter().map(|column| identifier::quote(column)).join(", ")
        );
        let writer = self
            .tx
            .copy_in(statement.as_str())
            .map_err(|err| StoreError::new(format!("starting copy into {table}"), err))?;
        let types = vec![Type::VARCHAR; columns.len()];
        Ok(Box::new(PgRowSink {
            writer: BinaryCopyInWriter::new(writer, &types),
        }))
    }

    fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .map_err(|err| StoreError::new("committing transaction", err))
    }

    fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .map_err(|err| StoreError::new("rolling back transaction", err))
    }
}

struct PgRowSink<'a> {
    writer: BinaryCopyInWriter<'a>,
}

impl RowSink for PgRowSink<'_> {
    fn send(&mut self, row: &[Option<String>]) -> Result<(), StoreError> {
        let values = row
            .iter()
            .map(|value| value as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        self.writer
            .write(&values)
            .map_err(|err| StoreError::new("copying row", err))
    }

    fn finish(self: Box<Self>) -> Result<u64, StoreError> {
        self.writer
            .finish()
            .map_err(|err| StoreError::new("finishing copy", err))
    }
}
