pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod hashing;
pub mod identifier;
pub mod import;
pub mod io_utils;
pub mod load;
pub mod postgres_store;
pub mod probe;
pub mod provision;
pub mod scan;
pub mod store;
pub mod table;
pub mod upload;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, ImportArgs, OutputFormat},
    config::Settings,
    import::{ImportOptions, ImportOutcome},
    postgres_store::PgStore,
    upload::Upload,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::resolve(&cli.connection)?;
    debug!(
        "Sequence '{}', connect timeout {:?}, statement timeout {:?}",
        settings.sequence, settings.connect_timeout, settings.statement_timeout
    );
    match cli.command {
        Commands::Probe(args) => probe::execute_probe(&args, &settings),
        Commands::Hash(args) => probe::execute_hash(&args),
        Commands::Init => handle_init(&settings),
        Commands::Import(args) => handle_import(&args, &settings),
        Commands::List(args) => catalog::execute_list(&mut connect(&settings)?, &args),
        Commands::Show(args) => catalog::execute_show(&mut connect(&settings)?, &args),
        Commands::Delete(args) => catalog::execute_delete(&mut connect(&settings)?, &args),
        Commands::Formats(args) => catalog::execute_formats(&mut connect(&settings)?, &args),
        Commands::SetFormat(args) => {
            catalog::execute_set_format(&mut connect(&settings)?, &args)
        }
    }
}

fn connect(settings: &Settings) -> Result<PgStore> {
    let database = settings.database()?;
    PgStore::connect(&database).context("Connecting to the database")
}

fn handle_init(settings: &Settings) -> Result<()> {
    let mut store = connect(settings)?;
    store
        .ensure_schema()
        .context("Creating metadata tables")?;
    info!("Metadata tables are ready");
    Ok(())
}

fn handle_import(args: &ImportArgs, settings: &Settings) -> Result<()> {
    let upload = Upload::from_path(&args.input, args.name.as_deref())?;
    let options = ImportOptions {
        sequence: settings.sequence.clone(),
        encoding: settings.encoding(args.input_encoding.as_deref())?,
        skip_duplicates: args.skip_duplicates,
        format_id: args.import_format,
    };
    let mut store = connect(settings)?;
    let outcome = import::import_upload(&mut store, &upload, &options)
        .with_context(|| format!("Importing {:?}", args.input))?;

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    match outcome {
        ImportOutcome::Imported(summary) => {
            println!(
                "Imported '{}' as upload {} into {} ({} row(s), {} column(s))",
                upload.source_filename(),
                summary.upload_id,
                summary.table_name,
                summary.rows_loaded,
                summary.columns.len()
            );
        }
        ImportOutcome::SkippedDuplicate(duplicate) => {
            println!(
                "Skipped '{}': {} to upload {} ({})",
                upload.source_filename(),
                duplicate.kind.describe(),
                duplicate.id,
                duplicate.name
            );
        }
    }
    Ok(())
}
