//! The end-to-end import: fingerprint, scan, provision and load one upload.
//!
//! Everything that can reject an upload without touching the store (content
//! sniffing, hashing, scanning, column planning) runs first. The mutations
//! (metadata row, `CREATE TABLE`, bulk copy) then share one unit of work and
//! either all land or none do.

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    config::DEFAULT_SEQUENCE,
    error::ImportError,
    hashing::{ContentHashes, HashMatch},
    load::{self, LoadReport},
    provision::{self, ColumnSpec},
    scan::{self, CsvShape},
    store::{NewUpload, Store, UnitOfWork, UploadFingerprint},
    upload::Upload,
};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Counter whose current value names the generated table.
    pub sequence: String,
    pub encoding: &'static encoding_rs::Encoding,
    pub skip_duplicates: bool,
    pub format_id: Option<i32>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            sequence: DEFAULT_SEQUENCE.to_string(),
            encoding: encoding_rs::UTF_8,
            skip_duplicates: false,
            format_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateUpload {
    pub id: i32,
    pub source_filename: String,
    pub name: String,
    pub kind: HashMatch,
}

impl DuplicateUpload {
    fn from_fingerprint(existing: UploadFingerprint, hashes: &ContentHashes) -> Option<Self> {
        let kind = hashes.matches(&existing.hashes)?;
        Some(Self {
            id: existing.id,
            source_filename: existing.source_filename,
            name: existing.name,
            kind,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub upload_id: i32,
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
    pub rows_loaded: u64,
    pub rows_with_extra_cells: usize,
    pub hashes: ContentHashes,
    /// Earlier uploads with matching content, strongest match first.
    pub duplicates: Vec<DuplicateUpload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    Imported(ImportSummary),
    /// `skip_duplicates` was set and an equivalent upload already exists.
    SkippedDuplicate(DuplicateUpload),
}

/// Imports `upload` into a freshly provisioned table in `store`.
pub fn import_upload<S: Store>(
    store: &mut S,
    upload: &Upload,
    options: &ImportOptions,
) -> Result<ImportOutcome, ImportError> {
    info!(
        "Importing '{}' ({} byte(s))",
        upload.source_filename(),
        upload.size()
    );
    if !upload.looks_like_text() {
        return Err(ImportError::malformed(
            "content looks binary (NUL bytes near the start of the upload)",
        ));
    }
    let hashes = ContentHashes::compute(upload)?;
    debug!(
        "Hashes raw={} without_bom={} trimmed_without_bom={}",
        hashes.raw, hashes.without_bom, hashes.trimmed_without_bom
    );
    let shape = scan::scan(upload.without_bom(), options.encoding)?;
    if provision::plan_columns(&shape).is_empty() {
        return Err(ImportError::malformed(
            "no column has a header or any data",
        ));
    }

    let mut unit = store.begin()?;
    match import_within(&mut unit, upload, &hashes, &shape, options) {
        Ok(Staged::Commit(summary)) => {
            unit.commit()?;
            info!(
                "Imported '{}' as upload {} into {} ({} row(s))",
                upload.source_filename(),
                summary.upload_id,
                summary.table_name,
                summary.rows_loaded
            );
            Ok(ImportOutcome::Imported(summary))
        }
        Ok(Staged::Skip(duplicate)) => {
            roll_back(unit);
            info!(
                "Skipped '{}': {} to upload {} ({})",
                upload.source_filename(),
                duplicate.kind.describe(),
                duplicate.id,
                duplicate.name
            );
            Ok(ImportOutcome::SkippedDuplicate(duplicate))
        }
        Err(err) => {
            roll_back(unit);
            Err(err)
        }
    }
}

enum Staged {
    Commit(ImportSummary),
    Skip(DuplicateUpload),
}

fn import_within<U: UnitOfWork>(
    unit: &mut U,
    upload: &Upload,
    hashes: &ContentHashes,
    shape: &CsvShape,
    options: &ImportOptions,
) -> Result<Staged, ImportError> {
    let mut duplicates = unit
        .uploads_with_hashes(hashes)?
        .into_iter()
        .filter_map(|existing| DuplicateUpload::from_fingerprint(existing, hashes))
        .collect::<Vec<_>>();
    duplicates.sort_by(|a, b| b.kind.cmp(&a.kind).then(a.id.cmp(&b.id)));
    for duplicate in &duplicates {
        warn!(
            "'{}' is {} to upload {} ('{}', table {})",
            upload.source_filename(),
            duplicate.kind.describe(),
            duplicate.id,
            duplicate.source_filename,
            duplicate.name
        );
    }
    if options.skip_duplicates
        && let Some(strongest) = duplicates.first()
    {
        return Ok(Staged::Skip(strongest.clone()));
    }

    let table = provision::provision(unit, &options.sequence, shape)?;
    let upload_id = unit.insert_upload(&NewUpload {
        source_filename: upload.source_filename(),
        file_size: upload.size(),
        uploaded_at: Utc::now(),
        table_name: &table.name,
        hashes,
        format_id: options.format_id,
    })?;
    debug!("Recorded upload {upload_id} for {}", table.name);

    let LoadReport {
        rows_loaded,
        rows_with_extra_cells,
    } = load::load(
        unit,
        upload.without_bom(),
        options.encoding,
        &table,
        shape.headers.len(),
    )?;
    if rows_loaded != shape.data_rows as u64 {
        debug!(
            "Scanned {} data row(s) but the copy reported {rows_loaded}",
            shape.data_rows
        );
    }

    Ok(Staged::Commit(ImportSummary {
        upload_id,
        table_name: table.name,
        columns: table.columns,
        rows_loaded,
        rows_with_extra_cells,
        hashes: hashes.clone(),
        duplicates,
    }))
}

fn roll_back<U: UnitOfWork>(unit: U) {
    if let Err(err) = unit.rollback() {
        warn!("Rolling back the import failed: {err}");
    }
}
