//! Content fingerprints used to audit duplicate uploads.
//!
//! Three SHA-256 digests are kept per upload: the bytes as received, the bytes
//! after dropping a leading byte-order-mark, and a trimmed re-serialization
//! where blank cells and blank rows are gone. Equal digests at each level mean
//! byte-identical, encoding-variant-identical, or content-identical files.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{error::ImportError, io_utils, upload::Upload};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashes {
    pub raw: String,
    pub without_bom: String,
    pub trimmed_without_bom: String,
}

/// Strongest level at which two uploads agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HashMatch {
    Content,
    EncodingVariant,
    Identical,
}

impl HashMatch {
    pub fn describe(self) -> &'static str {
        match self {
            HashMatch::Identical => "byte-identical",
            HashMatch::EncodingVariant => "identical apart from a byte-order-mark",
            HashMatch::Content => "identical after trimming blank cells and rows",
        }
    }
}

impl ContentHashes {
    pub fn compute(upload: &Upload) -> Result<Self, ImportError> {
        let without_bom = upload.without_bom();
        let trimmed = trim_blank_cells(without_bom)?;
        Ok(Self {
            raw: digest(upload.raw()),
            without_bom: digest(without_bom),
            trimmed_without_bom: digest(&trimmed),
        })
    }

    pub fn matches(&self, other: &ContentHashes) -> Option<HashMatch> {
        if self.raw == other.raw {
            Some(HashMatch::Identical)
        } else if self.without_bom == other.without_bom {
            Some(HashMatch::EncodingVariant)
        } else if self.trimmed_without_bom == other.trimmed_without_bom {
            Some(HashMatch::Content)
        } else {
            None
        }
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Re-serializes CSV content with every cell trimmed, empty cells removed and
/// rows that end up empty dropped.
pub fn trim_blank_cells(content: &[u8]) -> Result<Vec<u8>, ImportError> {
    let mut reader = io_utils::open_csv_reader(content);
    let mut writer = io_utils::open_csv_writer(Vec::with_capacity(content.len()));
    let mut record = csv::ByteRecord::new();
    let mut kept = csv::ByteRecord::new();
    let mut row_number = 0usize;
    loop {
        row_number += 1;
        let more = reader.read_byte_record(&mut record).map_err(|err| {
            ImportError::malformed_with(format!("reading row {row_number} for trimming"), err)
        })?;
        if !more {
            break;
        }
        kept.clear();
        for field in record.iter().map(trim_cell).filter(|field| !field.is_empty()) {
            kept.push_field(field);
        }
        if kept.is_empty() {
            continue;
        }
        writer
            .write_byte_record(&kept)
            .map_err(|err| ImportError::malformed_with("re-serializing trimmed CSV", err))?;
    }
    writer
        .into_inner()
        .map_err(|err| ImportError::malformed_with("flushing trimmed CSV", err.into_error()))
}

fn trim_cell(field: &[u8]) -> &[u8] {
    match std::str::from_utf8(field) {
        Ok(text) => text.trim().as_bytes(),
        Err(_) => field.trim_ascii(),
    }
}
