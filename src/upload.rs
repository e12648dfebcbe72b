//! Buffered upload content.
//!
//! An upload is read into memory exactly once. Hashing, scanning and loading
//! each take their own cursor over the buffer (`&[u8]` implements `Read`), so
//! no phase depends on where a previous phase left a shared stream.

use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow};

use crate::io_utils;

/// UTF-8 encoding of U+FEFF.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Bytes inspected when deciding whether an upload is text at all.
const SNIFF_LEN: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    source_filename: String,
    content: Vec<u8>,
}

impl Upload {
    pub fn new(source_filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            source_filename: source_filename.into(),
            content: content.into(),
        }
    }

    /// Reads an upload from `path`, or from stdin when `path` is `-`.
    ///
    /// `name` overrides the recorded source filename and is required for stdin.
    pub fn from_path(path: &Path, name: Option<&str>) -> Result<Self> {
        if io_utils::is_dash(path) {
            let name = name.ok_or_else(|| anyhow!("--name is required when reading from stdin"))?;
            let mut content = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut content)
                .context("Reading upload from stdin")?;
            return Ok(Self::new(name, content));
        }
        let content = fs::read(path).with_context(|| format!("Reading upload {path:?}"))?;
        let source_filename = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|file_name| file_name.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("Upload path {path:?} has no file name"))?,
        };
        Ok(Self::new(source_filename, content))
    }

    pub fn source_filename(&self) -> &str {
        &self.source_filename
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn raw(&self) -> &[u8] {
        &self.content
    }

    pub fn without_bom(&self) -> &[u8] {
        strip_bom(&self.content)
    }

    /// Rejects binary payloads: text never carries NUL bytes in its first block.
    pub fn looks_like_text(&self) -> bool {
        let probe = &self.content[..self.content.len().min(SNIFF_LEN)];
        !probe.contains(&0)
    }
}

/// Drops one leading byte-order-mark, keeping every other byte.
pub fn strip_bom(content: &[u8]) -> &[u8] {
    content.strip_prefix(UTF8_BOM).unwrap_or(content)
}
