//! Turns a scanned CSV shape into a generated table.
//!
//! Column planning is pure ([`plan_columns`]); [`provision`] adds the parts
//! that touch the unit of work: reading the naming sequence and running the
//! `CREATE TABLE`.

use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

use crate::{
    error::{ImportError, StoreError},
    identifier::{self, ColumnNamer},
    scan::CsvShape,
    store::UnitOfWork,
};

pub const TABLE_PREFIX: &str = "raw_table_";
pub const SYSTEM_KEY_COLUMN: &str = "_id";

/// One retained CSV column: where it came from, what it is called, how wide it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub source_index: usize,
    pub name: String,
    pub width: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedTable {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl ProvisionedTable {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }
}

/// Retained columns in source order. A column is dropped only when its header
/// and every observed cell are empty.
pub fn plan_columns(shape: &CsvShape) -> Vec<ColumnSpec> {
    let mut namer = ColumnNamer::new();
    shape
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| shape.header_length(*idx) > 0 || shape.max_data_length(*idx) > 0)
        .map(|(idx, header)| ColumnSpec {
            source_index: idx,
            name: namer.assign(header, idx + 1),
            width: shape.max_data_length(idx).max(1),
        })
        .collect()
}

/// `None` when the sequence is exhausted.
pub fn table_name_for(sequence_value: i64) -> Option<String> {
    let next = sequence_value.checked_add(1)?;
    Some(format!("{TABLE_PREFIX}{next}"))
}

pub fn create_table_statement(table: &str, columns: &[ColumnSpec]) -> String {
    let definitions = std::iter::once(format!(
        "{} SERIAL PRIMARY KEY",
        identifier::quote(SYSTEM_KEY_COLUMN)
    ))
    .chain(
        columns
            .iter()
            .map(|column| format!("{} VARCHAR({})", identifier::quote(&column.name), column.width)),
    )
    .join(", ");
    format!("CREATE TABLE {} ({definitions})", identifier::quote(table))
}

/// Names the table from `sequence` and creates it inside `unit`.
///
/// The sequence is read, not advanced; the metadata insert that follows in
/// the same unit of work is what moves it forward.
pub fn provision<U>(
    unit: &mut U,
    sequence: &str,
    shape: &CsvShape,
) -> Result<ProvisionedTable, ImportError>
where
    U: UnitOfWork + ?Sized,
{
    let last_value =
        unit.sequence_value(sequence)
            .map_err(|source| ImportError::SequenceUnavailable {
                sequence: sequence.to_string(),
                source,
            })?;
    let name = table_name_for(last_value).ok_or_else(|| ImportError::SequenceUnavailable {
        sequence: sequence.to_string(),
        source: StoreError::new(
            format!("naming a table from sequence {sequence}"),
            format!("value {last_value} has no successor"),
        ),
    })?;
    let columns = plan_columns(shape);
    let statement = create_table_statement(&name, &columns);
    debug!("Provisioning {name}: {statement}");
    unit.execute(&statement)
        .map_err(|source| ImportError::SchemaCreationFailed {
            table: name.clone(),
            source,
        })?;
    info!(
        "Created table {name} with {} column(s); dropped {} empty column(s)",
        columns.len(),
        shape.headers.len() - columns.len()
    );
    Ok(ProvisionedTable { name, columns })
}
