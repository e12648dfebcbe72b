//! Offline commands: `probe` shows the table an import would create and
//! `hash` prints the content fingerprints. Neither needs a database.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::{
    cli::{HashArgs, OutputFormat, ProbeArgs},
    config::Settings,
    error::ImportError,
    hashing::ContentHashes,
    io_utils,
    provision::{self, ColumnSpec},
    scan::{self, CsvShape},
    table,
    upload::Upload,
};

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub source_filename: String,
    pub data_rows: usize,
    pub columns: Vec<ProbedColumn>,
}

#[derive(Debug, Serialize)]
pub struct ProbedColumn {
    /// 1-based position in the file.
    pub position: usize,
    pub header: String,
    /// `None` when the column is dropped for being entirely empty.
    pub name: Option<String>,
    pub width: Option<usize>,
}

impl ProbeReport {
    pub fn build(upload: &Upload, shape: &CsvShape) -> Self {
        let planned = provision::plan_columns(shape);
        let columns = shape
            .headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let spec: Option<&ColumnSpec> =
                    planned.iter().find(|column| column.source_index == idx);
                ProbedColumn {
                    position: idx + 1,
                    header: header.clone(),
                    name: spec.map(|column| column.name.clone()),
                    width: spec.map(|column| column.width),
                }
            })
            .collect();
        Self {
            source_filename: upload.source_filename().to_string(),
            data_rows: shape.data_rows,
            columns,
        }
    }
}

pub fn execute_probe(args: &ProbeArgs, settings: &Settings) -> Result<()> {
    let upload = read_upload(&args.input)?;
    let encoding = settings.encoding(args.input_encoding.as_deref())?;
    if !upload.looks_like_text() {
        return Err(ImportError::malformed("content looks binary"))
            .with_context(|| format!("Probing {:?}", args.input));
    }
    let shape = scan::scan(upload.without_bom(), encoding)
        .with_context(|| format!("Scanning {:?}", args.input))?;
    let report = ProbeReport::build(&upload, &shape);
    info!(
        "Probed '{}': {} column(s), {} data row(s)",
        report.source_filename,
        report.columns.len(),
        report.data_rows
    );

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table | OutputFormat::Csv => {
            let rows = report
                .columns
                .iter()
                .map(|column| {
                    vec![
                        column.position.to_string(),
                        column.header.clone(),
                        column.name.clone().unwrap_or_else(|| "(dropped)".to_string()),
                        column.width.map(|width| width.to_string()).unwrap_or_default(),
                    ]
                })
                .collect::<Vec<_>>();
            table::print_table(&["position", "header", "column", "width"], &rows);
        }
    }
    Ok(())
}

pub fn execute_hash(args: &HashArgs) -> Result<()> {
    let upload = read_upload(&args.input)?;
    let hashes = ContentHashes::compute(&upload)
        .with_context(|| format!("Hashing {:?}", args.input))?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&hashes)?),
        OutputFormat::Table | OutputFormat::Csv => {
            let rows = vec![
                vec!["file_hash", hashes.raw.as_str()],
                vec!["file_hash_no_bom", hashes.without_bom.as_str()],
                vec!["file_hash_trimmed_no_bom", hashes.trimmed_without_bom.as_str()],
            ];
            table::print_table(&["hash", "sha256"], &rows);
        }
    }
    Ok(())
}

// Nothing is recorded offline, so stdin needs no --name.
fn read_upload(input: &Path) -> Result<Upload> {
    Upload::from_path(input, io_utils::is_dash(input).then_some("stdin"))
}
