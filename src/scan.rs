//! Two-pass shape discovery: header cell lengths, then the widest cell seen at
//! every column index across all data rows.

use std::io::Read;

use encoding_rs::Encoding;
use log::debug;
use serde::Serialize;

use crate::{error::ImportError, io_utils};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsvShape {
    pub headers: Vec<String>,
    pub header_lengths: Vec<usize>,
    /// Indexed by column; may be shorter or longer than `headers` for ragged files.
    pub max_data_lengths: Vec<usize>,
    pub data_rows: usize,
}

impl CsvShape {
    /// Widest cell observed at `index`, zero when no row reached that column.
    pub fn max_data_length(&self, index: usize) -> usize {
        self.max_data_lengths.get(index).copied().unwrap_or(0)
    }

    pub fn header_length(&self, index: usize) -> usize {
        self.header_lengths.get(index).copied().unwrap_or(0)
    }
}

pub fn scan<R: Read>(input: R, encoding: &'static Encoding) -> Result<CsvShape, ImportError> {
    let mut reader = io_utils::open_csv_reader(input);
    let mut record = csv::ByteRecord::new();

    let has_header = reader
        .read_byte_record(&mut record)
        .map_err(|err| ImportError::malformed_with("reading header row", err))?;
    if !has_header {
        return Err(ImportError::malformed("missing header row"));
    }
    let headers = io_utils::decode_record(&record, encoding)
        .map_err(|err| ImportError::malformed_with("decoding header row", err))?;
    let header_lengths = headers
        .iter()
        .map(|header| io_utils::char_length(header))
        .collect::<Vec<_>>();

    let mut max_data_lengths: Vec<usize> = Vec::new();
    let mut data_rows = 0usize;
    loop {
        let row_number = data_rows + 1;
        let more = reader.read_byte_record(&mut record).map_err(|err| {
            ImportError::malformed_with(format!("reading data row {row_number}"), err)
        })?;
        if !more {
            break;
        }
        data_rows = row_number;
        for (idx, field) in record.iter().enumerate() {
            let cell = io_utils::decode_field(field, encoding).map_err(|err| {
                ImportError::malformed_with(
                    format!("decoding data row {row_number} column {}", idx + 1),
                    err,
                )
            })?;
            let length = io_utils::char_length(&cell);
            match max_data_lengths.get_mut(idx) {
                Some(widest) => *widest = (*widest).max(length),
                None => max_data_lengths.push(length),
            }
        }
    }

    debug!(
        "Scanned {} header(s) and {} data row(s); widest row has {} cell(s)",
        headers.len(),
        data_rows,
        max_data_lengths.len()
    );
    Ok(CsvShape {
        headers,
        header_lengths,
        max_data_lengths,
        data_rows,
    })
}
