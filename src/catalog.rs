//! Commands that read or edit the upload catalogue: `list`, `show`, `delete`,
//! `formats` and `set-format`.

use std::io::{self, Write};

use anyhow::{Context, Result, anyhow, bail};
use log::info;

use crate::{
    cli::{DeleteArgs, ListArgs, OutputFormat, SetFormatArgs, ShowArgs},
    io_utils,
    postgres_store::PgStore,
    store::TableContents,
    table,
};

pub fn execute_list(store: &mut PgStore, args: &ListArgs) -> Result<()> {
    let uploads = store.list_uploads().context("Listing uploads")?;
    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&uploads)?);
        return Ok(());
    }
    let rows = uploads
        .iter()
        .map(|upload| {
            vec![
                upload.id.to_string(),
                upload.source_filename.clone(),
                upload.file_size.to_string(),
                upload.datetime_uploaded.to_rfc3339(),
                upload.format_name.clone(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(
        &["id", "source_filename", "file_size", "datetime_uploaded", "format"],
        &rows,
    );
    Ok(())
}

pub fn execute_show(store: &mut PgStore, args: &ShowArgs) -> Result<()> {
    let limit = args
        .limit
        .map(i64::try_from)
        .transpose()
        .context("--limit is too large")?;
    let contents = store
        .table_contents(args.id, limit)
        .with_context(|| format!("Reading upload {}", args.id))?
        .ok_or_else(|| anyhow!("Upload {} not found", args.id))?;
    info!(
        "Upload {} is stored in {} ({} row(s) shown)",
        args.id,
        contents.table,
        contents.rows.len()
    );
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&contents)?),
        OutputFormat::Csv => write_csv(&contents, io::stdout().lock())?,
        OutputFormat::Table => {
            let rows = contents
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| table::nullable(cell.as_deref()))
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();
            table::print_table(&contents.columns, &rows);
        }
    }
    Ok(())
}

/// NULL cells become empty fields.
fn write_csv<W: Write>(contents: &TableContents, output: W) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(output);
    writer
        .write_record(&contents.columns)
        .context("Writing CSV header")?;
    for row in &contents.rows {
        writer
            .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
            .context("Writing CSV row")?;
    }
    writer.flush().context("Flushing CSV output")?;
    Ok(())
}

pub fn execute_delete(store: &mut PgStore, args: &DeleteArgs) -> Result<()> {
    let Some(table_name) = store
        .delete_upload(args.id, args.keep_table)
        .with_context(|| format!("Deleting upload {}", args.id))?
    else {
        bail!("Upload {} not found", args.id);
    };
    if args.keep_table {
        println!("Deleted upload {} (kept table {table_name})", args.id);
    } else {
        println!("Deleted upload {} and table {table_name}", args.id);
    }
    Ok(())
}

pub fn execute_formats(store: &mut PgStore, args: &ListArgs) -> Result<()> {
    let formats = store.import_formats().context("Listing import formats")?;
    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&formats)?);
        return Ok(());
    }
    let rows = formats
        .iter()
        .map(|format| vec![format.id.to_string(), format.name.clone()])
        .collect::<Vec<_>>();
    table::print_table(&["id", "name"], &rows);
    Ok(())
}

pub fn execute_set_format(store: &mut PgStore, args: &SetFormatArgs) -> Result<()> {
    let updated = store
        .set_upload_format(args.upload_id, args.format_id)
        .with_context(|| {
            format!(
                "Assigning import format {} to upload {}",
                args.format_id, args.upload_id
            )
        })?;
    if !updated {
        bail!("Upload {} not found", args.upload_id);
    }
    info!(
        "Upload {} now uses import format {}",
        args.upload_id, args.format_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_output_writes_nulls_as_empty_fields() {
        let contents = TableContents {
            table: "raw_table_1".to_string(),
            columns: vec!["_id".to_string(), "name".to_string(), "note".to_string()],
            rows: vec![
                vec![Some("1".to_string()), Some("Ann".to_string()), None],
                vec![
                    Some("2".to_string()),
                    Some("Bo, Jr".to_string()),
                    Some("x".to_string()),
                ],
            ],
        };
        let mut buffer = Vec::new();
        write_csv(&contents, &mut buffer).expect("write csv");
        assert_eq!(
            String::from_utf8(buffer).expect("utf8"),
            "_id,name,note\n1,Ann,\n2,\"Bo, Jr\",x\n"
        );
    }
}
