//! CSV reader/writer construction and cell decoding.
//!
//! Every CSV pass in csv-ingest goes through this module:
//!
//! - **Dialect**: comma-delimited, double-quote-escaped, and flexible, so
//!   ragged rows reach the scanner and loader instead of failing in the parser.
//! - **Encoding**: cells are decoded with an `encoding_rs` encoding (UTF-8 by
//!   default). Byte-order-marks are handled upstream, never per cell.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    borrow::Cow,
    io::{Read, Write},
    path::Path,
};

use anyhow::{Result, anyhow};
use csv::{QuoteStyle, Terminator};
use encoding_rs::{Encoding, UTF_8};

use crate::error::DecodeError;

pub const CSV_DELIMITER: u8 = b',';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Opens a headerless, flexible reader; callers read the header row themselves.
pub fn open_csv_reader<R>(reader: R) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(CSV_DELIMITER)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

/// Writer for re-serialized CSV: minimal quoting, `\n` terminators, ragged rows allowed.
pub fn open_csv_writer<W>(writer: W) -> csv::Writer<W>
where
    W: Write,
{
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(CSV_DELIMITER)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .double_quote(true)
        .flexible(true);
    builder.from_writer(writer)
}

pub fn decode_field<'a>(
    bytes: &'a [u8],
    encoding: &'static Encoding,
) -> Result<Cow<'a, str>, DecodeError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or(DecodeError {
            encoding: encoding.name(),
        })
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> Result<Vec<String>, DecodeError> {
    record
        .iter()
        .map(|field| decode_field(field, encoding).map(Cow::into_owned))
        .collect()
}

/// Cell length as a database column width sees it: Unicode scalar values.
pub fn char_length(value: &str) -> usize {
    value.chars().count()
}
