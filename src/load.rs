//! Streams data rows into a provisioned table through the bulk-copy sink.

use std::io::Read;

use encoding_rs::Encoding;
use log::{info, warn};

use crate::{error::ImportError, io_utils, provision::ProvisionedTable, store::UnitOfWork};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_loaded: u64,
    /// Rows carrying cells past the last header; those cells are not loaded.
    pub rows_with_extra_cells: usize,
}

/// Reads `input` from its first byte, skips the header row and copies every
/// data row into `table`, projecting each row onto the retained columns.
pub fn load<U, R>(
    unit: &mut U,
    input: R,
    encoding: &'static Encoding,
    table: &ProvisionedTable,
    header_width: usize,
) -> Result<LoadReport, ImportError>
where
    U: UnitOfWork + ?Sized,
    R: Read,
{
    let column_names = table.column_names();
    let mut sink = unit
        .begin_copy(&table.name, &column_names)
        .map_err(|err| ImportError::aborted(&table.name, None, err))?;

    let mut reader = io_utils::open_csv_reader(input);
    let mut record = csv::ByteRecord::new();
    let has_header = reader
        .read_byte_record(&mut record)
        .map_err(|err| ImportError::aborted(&table.name, None, err))?;
    if !has_header {
        return Err(ImportError::aborted(&table.name, None, "missing header row"));
    }

    let mut values: Vec<Option<String>> = Vec::with_capacity(table.columns.len());
    let mut rows_sent = 0usize;
    let mut rows_with_extra_cells = 0usize;
    loop {
        let row_number = rows_sent + 1;
        let more = reader
            .read_byte_record(&mut record)
            .map_err(|err| ImportError::aborted(&table.name, Some(row_number), err))?;
        if !more {
            break;
        }
        if record.len() > header_width {
            rows_with_extra_cells += 1;
        }
        values.clear();
        for column in &table.columns {
            let value = match record.get(column.source_index) {
                Some(field) => Some(
                    io_utils::decode_field(field, encoding)
                        .map_err(|err| ImportError::aborted(&table.name, Some(row_number), err))?
                        .into_owned(),
                ),
                None => None,
            };
            values.push(value);
        }
        sink.send(&values)
            .map_err(|err| ImportError::aborted(&table.name, Some(row_number), err))?;
        rows_sent = row_number;
    }

    let rows_loaded = sink
        .finish()
        .map_err(|err| ImportError::aborted(&table.name, None, err))?;
    if rows_with_extra_cells > 0 {
        warn!(
            "{rows_with_extra_cells} row(s) in {} had cells past the {header_width} header column(s); those cells were not loaded",
            table.name
        );
    }
    info!("Loaded {rows_loaded} row(s) into {}", table.name);
    Ok(LoadReport {
        rows_loaded,
        rows_with_extra_cells,
    })
}
